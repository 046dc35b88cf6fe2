use std::path::PathBuf;

use serde_json::{Map, Value};

/// Merged settings for one project, produced by walking the `extends` chain.
///
/// The structured fields are the ones the project engine acts on; everything
/// else under `compilerOptions` is carried opaquely for downstream layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSettings {
    /// Explicit root file list (as written, relative to the declaring
    /// config's directory). `None` means roots are enumerated from disk.
    pub files: Option<Vec<String>>,
    /// Paths excluded from root enumeration, relative to the config dir.
    pub exclude: Vec<String>,
    /// Disables routing queries on declaration-file locations to the source
    /// project that produced them.
    pub disable_source_of_project_reference_redirect: bool,
    /// Referenced project config paths (absolute, normalized).
    pub references: Vec<PathBuf>,
    /// Remaining `compilerOptions` keys, passed through untouched.
    pub compiler_options: Map<String, Value>,
}

/// The outcome of resolving one configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Normalized path of the project's own config file.
    pub config_path: PathBuf,
    /// Ordered root file set (explicit `files`, or enumerated sources).
    pub root_files: Vec<PathBuf>,
    pub settings: ConfigSettings,
    /// Configs read beyond the project's own file, nearest first.
    ///
    /// A change to any of these must trigger a reload of the project even
    /// though they are not its own config file.
    pub extends_chain: Vec<PathBuf>,
}
