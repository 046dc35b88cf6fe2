use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_scheduler::KeyedDebouncer;
use quill_vfs::{normalize_path, FileSystem};

use crate::events::{EventBus, ProjectEvent, ProjectEventKind, Subscription};
use crate::project::{LoadOutcome, Project, ProjectName, ProjectState};
use crate::size_gate::{self, MAX_PROGRAM_SIZE};

/// Configuration file names recognized when searching for a project, in
/// preference order.
const CONFIG_FILE_NAMES: [&str; 2] = ["tsconfig.json", "jsconfig.json"];

/// Debounce window for config-change reloads. A burst of edits to the same
/// configuration file collapses to one reconciliation pass.
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Host-configurable preferences recognized by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostPreferences {
    /// Defers configured-project materialization triggered by external
    /// project declarations until a constituent file is actually opened.
    pub lazy_configured_projects_from_external_project: bool,
}

/// Environment constants supplied at service construction.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub reload_debounce: Duration,
    pub max_program_size: u64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
            max_program_size: MAX_PROGRAM_SIZE,
        }
    }
}

/// A project declared by an external build system.
#[derive(Debug, Clone)]
pub struct ExternalProjectDescriptor {
    pub project_file_name: PathBuf,
    /// Declared roots. Entries naming a recognized configuration file become
    /// configured projects; the rest are the external project's own sources.
    pub root_files: Vec<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("unknown project {0}")]
    UnknownProject(ProjectName),

    #[error("no configuration file found for {}", .path.display())]
    NoConfigurationFile { path: PathBuf },
}

#[derive(Debug, Clone)]
struct PendingReload {
    reason: String,
}

#[derive(Debug)]
struct ExternalProjectRecord {
    declared_roots: Vec<PathBuf>,
    /// Present when the declaration carried non-config roots of its own.
    project: Option<Project>,
}

/// Process-wide project registry and orchestrator.
///
/// All public operations execute to completion synchronously: every event
/// generated by an operation has been delivered to every subscriber by the
/// time the operation returns. The only asynchrony is the debounce timer,
/// pumped by the host through [`ProjectService::run_pending_timers`].
pub struct ProjectService {
    fs: Arc<dyn FileSystem>,
    options: ServiceOptions,
    preferences: HostPreferences,
    bus: EventBus,
    configured_projects: BTreeMap<PathBuf, Project>,
    external_projects: BTreeMap<PathBuf, ExternalProjectRecord>,
    inferred_projects: BTreeMap<ProjectName, Project>,
    open_files: BTreeMap<PathBuf, BTreeSet<ProjectName>>,
    /// Configured projects pinned by an external declaration but not yet
    /// materialized (lazy preference), keyed by config path.
    deferred_configs: BTreeMap<PathBuf, PathBuf>,
    reload_timers: KeyedDebouncer<PathBuf, PendingReload>,
    next_inferred_project: usize,
}

impl ProjectService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_options(fs, ServiceOptions::default())
    }

    pub fn with_options(fs: Arc<dyn FileSystem>, options: ServiceOptions) -> Self {
        Self {
            fs,
            reload_timers: KeyedDebouncer::new(options.reload_debounce),
            options,
            preferences: HostPreferences::default(),
            bus: EventBus::new(),
            configured_projects: BTreeMap::new(),
            external_projects: BTreeMap::new(),
            inferred_projects: BTreeMap::new(),
            open_files: BTreeMap::new(),
            deferred_configs: BTreeMap::new(),
            next_inferred_project: 0,
        }
    }

    // --- subscriptions -----------------------------------------------------

    pub fn subscribe(
        &mut self,
        kinds: &[ProjectEventKind],
        handler: impl Fn(&ProjectEvent) + 'static,
    ) -> Subscription {
        self.bus.subscribe(kinds, handler)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.bus.unsubscribe(subscription);
    }

    // --- queries -----------------------------------------------------------

    pub fn configured_project(&self, config_path: &Path) -> Option<&Project> {
        self.configured_projects.get(&normalize_path(config_path))
    }

    pub fn configured_project_count(&self) -> usize {
        self.configured_projects.len()
    }

    pub fn inferred_project_count(&self) -> usize {
        self.inferred_projects.len()
    }

    pub fn external_project_count(&self) -> usize {
        self.external_projects.len()
    }

    pub fn project(&self, name: &ProjectName) -> Result<&Project, ProjectError> {
        self.configured_projects
            .values()
            .chain(
                self.external_projects
                    .values()
                    .filter_map(|record| record.project.as_ref()),
            )
            .chain(self.inferred_projects.values())
            .find(|project| project.name() == name)
            .ok_or_else(|| ProjectError::UnknownProject(name.clone()))
    }

    pub fn has_pending_reload(&self, config_path: &Path) -> bool {
        self.reload_timers.is_pending(&normalize_path(config_path))
    }

    pub fn preferences(&self) -> &HostPreferences {
        &self.preferences
    }

    // --- client file operations --------------------------------------------

    /// Finds or creates the project serving `path` and attaches the file to
    /// it. Creation of a configured project reconciles it synchronously, so
    /// its loading events have been delivered by the time this returns.
    pub fn open_client_file(&mut self, path: &Path) -> ProjectName {
        let path = normalize_path(path);
        let name = match self.find_config_file(&path) {
            Some(config_path) => {
                // A project deferred by the lazy-configured-projects
                // preference materializes now, with the external-project
                // reason it was declared under.
                match self.deferred_configs.remove(&config_path) {
                    Some(project_file) => {
                        self.create_configured_project(
                            config_path.clone(),
                            external_project_reason(&project_file),
                        );
                    }
                    None => {
                        if !self.configured_projects.contains_key(&config_path) {
                            let reason = format!(
                                "Creating possible configured project for {} to open",
                                path.display()
                            );
                            self.create_configured_project(config_path.clone(), reason);
                        }
                    }
                }
                ProjectName::from_config_path(&config_path)
            }
            None => self.attach_to_inferred_project(&path),
        };
        self.open_files.entry(path).or_default().insert(name.clone());
        name
    }

    /// Detaches `path`; projects left with no open file and no external pin
    /// are disposed (pending timers cancelled, no event).
    pub fn close_client_file(&mut self, path: &Path) {
        let path = normalize_path(path);
        let Some(serving) = self.open_files.remove(&path) else {
            return;
        };

        for name in serving {
            let still_referenced = self
                .open_files
                .values()
                .any(|projects| projects.contains(&name));

            if self.inferred_projects.contains_key(&name) {
                self.detach_from_inferred_project(&name, &path, still_referenced);
                continue;
            }
            if still_referenced {
                continue;
            }

            let config_path = self
                .configured_projects
                .iter()
                .find(|(_, project)| project.name() == &name)
                .map(|(config_path, _)| config_path.clone());
            if let Some(config_path) = config_path {
                if self.is_pinned_by_external_project(&config_path) {
                    continue;
                }
                if let Some(mut project) = self.configured_projects.remove(&config_path) {
                    project.dispose();
                }
                self.reload_timers.cancel(&config_path);
                tracing::info!(project = %name, "disposed configured project");
            }
            // External projects stay pinned by their declaration.
        }
    }

    // --- external projects -------------------------------------------------

    /// Registers an external project declaration. Configuration-file roots
    /// become configured projects, eagerly or deferred depending on the
    /// lazy-configured-projects preference.
    pub fn open_external_project(&mut self, descriptor: ExternalProjectDescriptor) {
        let project_file = normalize_path(&descriptor.project_file_name);
        let declared_roots: Vec<PathBuf> = descriptor
            .root_files
            .iter()
            .map(|root| normalize_path(root))
            .collect();
        let (config_roots, source_roots): (Vec<PathBuf>, Vec<PathBuf>) = declared_roots
            .iter()
            .cloned()
            .partition(|root| is_config_file_name(root));

        tracing::info!(
            project = %project_file.display(),
            configs = config_roots.len(),
            sources = source_roots.len(),
            "opening external project",
        );

        let project = if source_roots.is_empty() {
            None
        } else {
            Some(self.build_external_project(&project_file, source_roots))
        };
        self.external_projects.insert(
            project_file.clone(),
            ExternalProjectRecord {
                declared_roots,
                project,
            },
        );

        for config_path in config_roots {
            if self.configured_projects.contains_key(&config_path) {
                continue;
            }
            if self.preferences.lazy_configured_projects_from_external_project {
                // The project is created (and counted) at declaration time;
                // only its load is deferred until a constituent file opens.
                tracing::debug!(
                    config = %config_path.display(),
                    "deferring configured project load from external project",
                );
                self.ensure_configured_project(&config_path);
                self.deferred_configs.insert(config_path, project_file.clone());
            } else {
                let reason = external_project_reason(&project_file);
                self.create_configured_project(config_path, reason);
            }
        }
    }

    /// Applies host preferences. Turning the lazy-configured-projects
    /// preference off proactively materializes every deferred project.
    pub fn set_host_configuration(&mut self, preferences: HostPreferences) {
        let was_lazy = self.preferences.lazy_configured_projects_from_external_project;
        self.preferences = preferences;

        if was_lazy && !preferences.lazy_configured_projects_from_external_project {
            let deferred: Vec<(PathBuf, PathBuf)> =
                std::mem::take(&mut self.deferred_configs).into_iter().collect();
            for (config_path, project_file) in deferred {
                let already_loaded = self
                    .configured_projects
                    .get(&config_path)
                    .is_some_and(|project| project.state() != ProjectState::Uninitialized);
                if already_loaded {
                    continue;
                }
                let reason = external_project_reason(&project_file);
                self.create_configured_project(config_path, reason);
            }
        }
    }

    // --- file-system notifications -----------------------------------------

    /// Schedules a debounced reload for every project whose configuration is
    /// `path` or whose `extends` chain includes `path`.
    pub fn on_config_file_changed(&mut self, path: &Path) {
        let path = normalize_path(path);
        let mut scheduled = 0usize;
        for (config_path, project) in &self.configured_projects {
            // Deferred projects haven't read their config yet; nothing to
            // reload. Disposed ones are gone.
            if project.is_disposed() || project.state() == ProjectState::Uninitialized {
                continue;
            }
            let reason = if *config_path == path {
                "Change in config file detected".to_string()
            } else if project.extends_chain().iter().any(|link| link == &path) {
                format!("Change in extended config file {} detected", path.display())
            } else {
                continue;
            };
            self.reload_timers
                .schedule(config_path.clone(), PendingReload { reason });
            scheduled += 1;
        }
        if scheduled > 0 {
            tracing::debug!(
                path = %path.display(),
                scheduled,
                "scheduled debounced project reloads",
            );
        }
    }

    pub fn on_file_changed(&mut self, path: &Path) {
        let path = normalize_path(path);
        if self.is_watched_config(&path) {
            self.on_config_file_changed(&path);
        }
    }

    pub fn on_file_deleted(&mut self, path: &Path) {
        // A deleted config still reloads; resolution fails and the project
        // lands in Ready(disabled) with the failure retained.
        self.on_file_changed(path);
    }

    // --- timer pump --------------------------------------------------------

    /// Advances the debounce clock by `elapsed` and runs every reload whose
    /// window has closed. Reloads for projects disposed in the meantime are
    /// silent no-ops.
    pub fn run_pending_timers(&mut self, elapsed: Duration) {
        let due = self.reload_timers.advance(elapsed);
        self.run_reloads(due);
    }

    /// Runs every pending reload regardless of its deadline.
    pub fn flush_pending_timers(&mut self) {
        let due = self.reload_timers.run_all();
        self.run_reloads(due);
    }

    // --- project-reference redirection -------------------------------------

    /// Routes a query on a declaration-file `location` to the project that
    /// owns `original_file`, creating it if needed. The `LoadingStart` reason
    /// depends on whether the requesting project has source-of-reference
    /// redirection disabled.
    pub fn resolve_project_reference_redirect(
        &mut self,
        requesting_project: &ProjectName,
        original_file: &Path,
        location: &Path,
    ) -> Result<ProjectName, ProjectError> {
        let disable_redirect = self
            .project(requesting_project)?
            .settings()
            .disable_source_of_project_reference_redirect;

        let original_file = normalize_path(original_file);
        let config_path = self.find_config_file(&original_file).ok_or_else(|| {
            ProjectError::NoConfigurationFile {
                path: original_file.clone(),
            }
        })?;

        if !self.configured_projects.contains_key(&config_path) {
            let reason = if disable_redirect {
                format!(
                    "Creating project for original file: {} for location: {}",
                    original_file.display(),
                    location.display()
                )
            } else {
                format!(
                    "Creating project for original file: {}",
                    original_file.display()
                )
            };
            self.create_configured_project(config_path.clone(), reason);
        }

        let name = ProjectName::from_config_path(&config_path);
        self.open_files
            .entry(original_file)
            .or_default()
            .insert(name.clone());
        Ok(name)
    }

    // --- internals ---------------------------------------------------------

    /// Walks ancestor directories of `path` looking for a configuration file.
    fn find_config_file(&self, path: &Path) -> Option<PathBuf> {
        let mut dir = path.parent();
        while let Some(current) = dir {
            for file_name in CONFIG_FILE_NAMES {
                let candidate = current.join(file_name);
                if self.fs.exists(&candidate) && !self.fs.is_dir(&candidate) {
                    return Some(normalize_path(&candidate));
                }
            }
            dir = current.parent();
        }
        None
    }

    /// Creates the registry entry without loading it (deferred projects are
    /// created at declaration time but read their config later).
    fn ensure_configured_project(&mut self, config_path: &Path) -> ProjectName {
        let name = ProjectName::from_config_path(config_path);
        if !self.configured_projects.contains_key(config_path) {
            tracing::info!(project = %name, "creating configured project");
            self.configured_projects.insert(
                config_path.to_path_buf(),
                Project::new_configured(name.clone(), config_path.to_path_buf()),
            );
        }
        name
    }

    fn create_configured_project(&mut self, config_path: PathBuf, reason: String) -> ProjectName {
        let name = self.ensure_configured_project(&config_path);
        self.load_configured_project(&config_path, reason);
        name
    }

    /// One reconciliation pass: LoadingStart, then the configuration read,
    /// then LoadingFinish (and a state-change event if the enabled flag
    /// flipped), all before returning.
    fn load_configured_project(&mut self, config_path: &Path, reason: String) {
        let (name, previous_enabled) = match self.configured_projects.get_mut(config_path) {
            Some(project) if !project.is_disposed() => {
                project.begin_loading();
                (project.name().clone(), project.language_service_enabled())
            }
            _ => return,
        };

        tracing::info!(project = %name, %reason, "project load started");
        self.bus.publish(&ProjectEvent::LoadingStart {
            project: name.clone(),
            reason,
        });

        // First read of the config file happens here, strictly after
        // LoadingStart was delivered to every subscriber.
        let fs = Arc::clone(&self.fs);
        let outcome = match quill_config::resolve(fs.as_ref(), config_path) {
            Ok(resolved) => {
                let gate = size_gate::evaluate(
                    &resolved.root_files,
                    |file| fs.file_size(file).unwrap_or(0),
                    self.options.max_program_size,
                );
                if let Some(offender) = &gate.exceeded_by {
                    tracing::warn!(
                        project = %name,
                        file = %offender.display(),
                        "program size limit exceeded, disabling language service",
                    );
                }
                LoadOutcome::Loaded { resolved, gate }
            }
            Err(error) => {
                tracing::warn!(project = %name, %error, "configuration resolution failed");
                LoadOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        };

        let enabled = match self.configured_projects.get_mut(config_path) {
            Some(project) => {
                project.finish_loading(outcome);
                project.language_service_enabled()
            }
            None => return,
        };

        self.bus.publish(&ProjectEvent::LoadingFinish {
            project: name.clone(),
        });
        if enabled != previous_enabled {
            self.bus.publish(&ProjectEvent::LanguageServiceStateChanged {
                project: name,
                language_service_enabled: enabled,
            });
        }
    }

    fn attach_to_inferred_project(&mut self, path: &Path) -> ProjectName {
        if self.inferred_projects.is_empty() {
            self.next_inferred_project += 1;
            let name = ProjectName::inferred(self.next_inferred_project);
            tracing::info!(project = %name, "creating inferred project");
            self.inferred_projects
                .insert(name.clone(), Project::new_inferred(name.clone()));
        }

        let fs = Arc::clone(&self.fs);
        let limit = self.options.max_program_size;
        let mut attached = None;
        let mut state_change = None;
        if let Some((name, project)) = self.inferred_projects.iter_mut().next() {
            let mut roots = project.root_files().to_vec();
            if !roots.iter().any(|root| root == path) {
                roots.push(path.to_path_buf());
            }
            let gate = size_gate::evaluate(&roots, |file| fs.file_size(file).unwrap_or(0), limit);
            let previous = project.language_service_enabled();
            let enabled = gate.enabled;
            project.reconcile_roots(roots, gate);
            if enabled != previous {
                state_change = Some((name.clone(), enabled));
            }
            attached = Some(name.clone());
        }

        if let Some((name, enabled)) = state_change {
            self.bus.publish(&ProjectEvent::LanguageServiceStateChanged {
                project: name,
                language_service_enabled: enabled,
            });
        }
        // The branch above always runs: an inferred project exists by now.
        attached.unwrap_or_else(|| ProjectName::inferred(self.next_inferred_project))
    }

    fn detach_from_inferred_project(
        &mut self,
        name: &ProjectName,
        path: &Path,
        still_referenced: bool,
    ) {
        let fs = Arc::clone(&self.fs);
        let limit = self.options.max_program_size;
        let mut state_change = None;
        let mut dispose = false;
        if let Some(project) = self.inferred_projects.get_mut(name) {
            let roots: Vec<PathBuf> = project
                .root_files()
                .iter()
                .filter(|root| root.as_path() != path)
                .cloned()
                .collect();
            if roots.is_empty() && !still_referenced {
                dispose = true;
            } else {
                let gate =
                    size_gate::evaluate(&roots, |file| fs.file_size(file).unwrap_or(0), limit);
                let previous = project.language_service_enabled();
                let enabled = gate.enabled;
                project.reconcile_roots(roots, gate);
                if enabled != previous {
                    state_change = Some(enabled);
                }
            }
        }

        if dispose {
            if let Some(mut project) = self.inferred_projects.remove(name) {
                project.dispose();
            }
            tracing::info!(project = %name, "disposed inferred project");
        }
        if let Some(enabled) = state_change {
            self.bus.publish(&ProjectEvent::LanguageServiceStateChanged {
                project: name.clone(),
                language_service_enabled: enabled,
            });
        }
    }

    fn build_external_project(
        &mut self,
        project_file: &Path,
        source_roots: Vec<PathBuf>,
    ) -> Project {
        let name = ProjectName::from_external_path(project_file);
        let mut project = Project::new_external(name.clone(), project_file.to_path_buf());
        let fs = Arc::clone(&self.fs);
        let gate = size_gate::evaluate(
            &source_roots,
            |file| fs.file_size(file).unwrap_or(0),
            self.options.max_program_size,
        );
        let previous = project.language_service_enabled();
        let enabled = gate.enabled;
        project.reconcile_roots(source_roots, gate);
        if enabled != previous {
            self.bus.publish(&ProjectEvent::LanguageServiceStateChanged {
                project: name,
                language_service_enabled: enabled,
            });
        }
        project
    }

    fn run_reloads(&mut self, due: Vec<(PathBuf, PendingReload)>) {
        for (config_path, pending) in due {
            let live = self
                .configured_projects
                .get(&config_path)
                .is_some_and(|project| !project.is_disposed());
            if !live {
                tracing::trace!(
                    config = %config_path.display(),
                    "dropping reload for removed project",
                );
                continue;
            }
            self.load_configured_project(&config_path, pending.reason);
        }
    }

    fn is_pinned_by_external_project(&self, config_path: &Path) -> bool {
        self.deferred_configs.contains_key(config_path)
            || self.external_projects.values().any(|record| {
                record
                    .declared_roots
                    .iter()
                    .any(|root| root.as_path() == config_path)
            })
    }

    fn is_watched_config(&self, path: &Path) -> bool {
        self.configured_projects.contains_key(path)
            || self
                .configured_projects
                .values()
                .any(|project| project.extends_chain().iter().any(|link| link == path))
    }
}

fn external_project_reason(project_file: &Path) -> String {
    format!(
        "Creating configured project in external project: {}",
        project_file.display()
    )
}

fn is_config_file_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|file_name| file_name.to_str())
        .is_some_and(|file_name| CONFIG_FILE_NAMES.contains(&file_name))
}
