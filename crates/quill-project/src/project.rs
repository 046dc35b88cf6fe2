use std::fmt;
use std::path::{Path, PathBuf};

use quill_config::{ConfigSettings, ResolvedConfig};

use crate::size_gate::SizeGateDecision;

/// Stable, human-readable project identity.
///
/// Configured projects are named by their configuration file path, external
/// projects by their descriptor path, inferred projects by a synthetic name.
/// Events carry this name so subscribers that cannot hold a live project
/// reference can still correlate notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn from_config_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    pub fn from_external_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    pub fn inferred(index: usize) -> Self {
        Self(format!("/dev/null/inferredProject{index}*"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of project kinds. Kind-specific resolution logic is selected by
/// pattern match; there is no open-ended subclassing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    /// Membership and settings come from an explicit configuration file.
    Configured { config_path: PathBuf },
    /// Declared by an external build system descriptor.
    External { project_file: PathBuf },
    /// Synthesized from loosely related open files with no configuration.
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    Uninitialized,
    Loading,
    Ready,
    Disposed,
}

/// How one reconciliation pass ended.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded {
        resolved: ResolvedConfig,
        gate: SizeGateDecision,
    },
    /// Configuration resolution failed; the project is still "finished" from
    /// the notification contract's perspective, just disabled.
    Failed { reason: String },
}

/// One compilation unit tracked by the service.
///
/// All mutation goes through the state-machine transitions below; external
/// actors never poke fields directly.
#[derive(Debug)]
pub struct Project {
    name: ProjectName,
    kind: ProjectKind,
    state: ProjectState,
    root_files: Vec<PathBuf>,
    settings: ConfigSettings,
    extends_chain: Vec<PathBuf>,
    language_service_enabled: bool,
    last_file_exceeded_program_size: Option<PathBuf>,
    load_failure: Option<String>,
    version: u64,
}

impl Project {
    pub fn new_configured(name: ProjectName, config_path: PathBuf) -> Self {
        Self::new(name, ProjectKind::Configured { config_path })
    }

    pub fn new_external(name: ProjectName, project_file: PathBuf) -> Self {
        Self::new(name, ProjectKind::External { project_file })
    }

    pub fn new_inferred(name: ProjectName) -> Self {
        Self::new(name, ProjectKind::Inferred)
    }

    fn new(name: ProjectName, kind: ProjectKind) -> Self {
        Self {
            name,
            kind,
            state: ProjectState::Uninitialized,
            root_files: Vec::new(),
            settings: ConfigSettings::default(),
            extends_chain: Vec::new(),
            language_service_enabled: true,
            last_file_exceeded_program_size: None,
            load_failure: None,
            version: 0,
        }
    }

    pub fn name(&self) -> &ProjectName {
        &self.name
    }

    pub fn kind(&self) -> &ProjectKind {
        &self.kind
    }

    pub fn state(&self) -> ProjectState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == ProjectState::Disposed
    }

    pub fn config_path(&self) -> Option<&Path> {
        match &self.kind {
            ProjectKind::Configured { config_path } => Some(config_path),
            _ => None,
        }
    }

    pub fn root_files(&self) -> &[PathBuf] {
        &self.root_files
    }

    pub fn settings(&self) -> &ConfigSettings {
        &self.settings
    }

    /// Extended configs this project's own file inherits from, nearest first.
    pub fn extends_chain(&self) -> &[PathBuf] {
        &self.extends_chain
    }

    pub fn language_service_enabled(&self) -> bool {
        self.language_service_enabled
    }

    /// The file that tripped the size gate on the last reconciliation, if any.
    pub fn last_file_exceeded_program_size(&self) -> Option<&Path> {
        self.last_file_exceeded_program_size.as_deref()
    }

    /// Why the last reconciliation failed to resolve configuration, if it did.
    pub fn load_failure(&self) -> Option<&str> {
        self.load_failure.as_deref()
    }

    /// Monotonically increasing reconciliation counter; in-flight work
    /// compares against it to detect staleness.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `open/create` and `reconcile` trigger: Uninitialized | Ready -> Loading.
    ///
    /// Disposed is terminal: transitions on a disposed project are silent
    /// no-ops (a timer firing after disposal must not resurrect it).
    pub fn begin_loading(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.state = ProjectState::Loading;
    }

    /// `reconcile` completion: Loading -> Ready(enabled|disabled).
    pub fn finish_loading(&mut self, outcome: LoadOutcome) {
        if self.is_disposed() {
            return;
        }
        match outcome {
            LoadOutcome::Loaded { resolved, gate } => {
                self.root_files = resolved.root_files;
                self.settings = resolved.settings;
                self.extends_chain = resolved.extends_chain;
                self.language_service_enabled = gate.enabled;
                self.last_file_exceeded_program_size = gate.exceeded_by;
                self.load_failure = None;
            }
            LoadOutcome::Failed { reason } => {
                self.root_files.clear();
                self.language_service_enabled = false;
                self.last_file_exceeded_program_size = None;
                self.load_failure = Some(reason);
            }
        }
        self.state = ProjectState::Ready;
        self.version += 1;
    }

    /// Reconciliation for projects without a configuration file (external and
    /// inferred): replaces roots and applies the gate verdict directly.
    pub fn reconcile_roots(&mut self, root_files: Vec<PathBuf>, gate: SizeGateDecision) {
        if self.is_disposed() {
            return;
        }
        self.root_files = root_files;
        self.language_service_enabled = gate.enabled;
        self.last_file_exceeded_program_size = gate.exceeded_by;
        self.state = ProjectState::Ready;
        self.version += 1;
    }

    /// Terminal transition. Pending timers are cancelled by the owning
    /// service; disposal itself emits no event.
    pub fn dispose(&mut self) {
        self.state = ProjectState::Disposed;
    }
}
