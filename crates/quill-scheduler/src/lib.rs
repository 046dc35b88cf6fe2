//! Debounce scheduling for Quill.
//!
//! The engine is single-threaded and cooperative: the host event loop owns
//! time and pumps due work explicitly. [`KeyedDebouncer`] therefore keeps a
//! virtual monotonic clock instead of spawning timers; the host advances it
//! with the real elapsed time (or, in tests, with whatever it likes).

mod debouncer;

pub use debouncer::{DebounceHandle, KeyedDebouncer};
