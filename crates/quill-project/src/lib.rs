//! Project lifecycle and notification engine for Quill.
//!
//! This crate maintains the set of active projects (configured / external /
//! inferred), reacts to file-system and configuration changes, decides
//! whether full language analysis is affordable for a project, and emits
//! ordered lifecycle notifications to subscribers.
//!
//! The engine is single-threaded and cooperative: every public operation on
//! [`ProjectService`] runs to completion synchronously, and the only
//! asynchrony is the debounce timer, which the host event loop drives through
//! [`ProjectService::run_pending_timers`].

mod events;
pub mod logging;
mod project;
mod service;
pub mod size_gate;

pub use events::{EventBus, ProjectEvent, ProjectEventKind, Subscription};
pub use project::{LoadOutcome, Project, ProjectKind, ProjectName, ProjectState};
pub use service::{
    ExternalProjectDescriptor, HostPreferences, ProjectError, ProjectService, ServiceOptions,
};
pub use size_gate::{SizeGateDecision, MAX_PROGRAM_SIZE};
