//! File system collaborator layer for Quill.
//!
//! The project engine never touches the OS directly: every read, existence
//! check and size query goes through the [`FileSystem`] trait so tests can
//! substitute a deterministic in-memory backend ([`MemoryFs`]) for the local
//! one ([`LocalFs`]).

mod fs;
mod memory_fs;
mod path;

pub use fs::{FileSystem, LocalFs};
pub use memory_fs::MemoryFs;
pub use path::normalize_path;
