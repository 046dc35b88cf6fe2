//! Configuration loading for Quill.
//!
//! This crate turns a configuration file path into a [`ResolvedConfig`]:
//! - the ordered root file set
//! - merged settings (nearest file wins, key by key)
//! - the `extends` chain that was traversed to produce them
//!
//! All reads go through the file-system collaborator; the adapter performs no
//! I/O before it is invoked, so callers control when the first config read
//! happens relative to their own notifications.

mod loader;
mod model;

pub use loader::{resolve, ConfigError};
pub use model::{ConfigSettings, ResolvedConfig};
