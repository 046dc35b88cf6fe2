use std::rc::Rc;

use serde_json::json;

use crate::project::ProjectName;

/// The lifecycle event kinds subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectEventKind {
    LoadingStart,
    LoadingFinish,
    LanguageServiceStateChanged,
}

/// An immutable lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    /// Fired before the project's configuration file is read.
    LoadingStart {
        project: ProjectName,
        reason: String,
    },
    /// Fired after project construction completes (including failed
    /// resolution: a project that fails to load is still "finished").
    LoadingFinish { project: ProjectName },
    /// Fired when `languageServiceEnabled` flips; carries the new value.
    LanguageServiceStateChanged {
        project: ProjectName,
        language_service_enabled: bool,
    },
}

impl ProjectEvent {
    pub fn kind(&self) -> ProjectEventKind {
        match self {
            ProjectEvent::LoadingStart { .. } => ProjectEventKind::LoadingStart,
            ProjectEvent::LoadingFinish { .. } => ProjectEventKind::LoadingFinish,
            ProjectEvent::LanguageServiceStateChanged { .. } => {
                ProjectEventKind::LanguageServiceStateChanged
            }
        }
    }

    pub fn project_name(&self) -> &ProjectName {
        match self {
            ProjectEvent::LoadingStart { project, .. }
            | ProjectEvent::LoadingFinish { project }
            | ProjectEvent::LanguageServiceStateChanged { project, .. } => project,
        }
    }

    /// Wire-facing event name, for consumers that forward events over a
    /// protocol connection.
    pub fn event_name(&self) -> &'static str {
        match self {
            ProjectEvent::LoadingStart { .. } => "projectLoadingStart",
            ProjectEvent::LoadingFinish { .. } => "projectLoadingFinish",
            ProjectEvent::LanguageServiceStateChanged { .. } => "projectLanguageServiceState",
        }
    }

    /// Protocol rendition: `{ "event": ..., "body": { "projectName": ... } }`.
    ///
    /// Consumers that cannot hold a live project reference correlate events
    /// through the stable project name carried here.
    pub fn to_protocol(&self) -> serde_json::Value {
        let body = match self {
            ProjectEvent::LoadingStart { project, reason } => json!({
                "projectName": project.as_str(),
                "reason": reason,
            }),
            ProjectEvent::LoadingFinish { project } => json!({
                "projectName": project.as_str(),
            }),
            ProjectEvent::LanguageServiceStateChanged {
                project,
                language_service_enabled,
            } => json!({
                "projectName": project.as_str(),
                "languageServiceEnabled": language_service_enabled,
            }),
        };
        json!({ "event": self.event_name(), "body": body })
    }
}

/// Identifies one subscriber registration; pass back to
/// [`EventBus::unsubscribe`] to drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

struct Subscriber {
    id: u64,
    kinds: Vec<ProjectEventKind>,
    handler: Rc<dyn Fn(&ProjectEvent)>,
}

/// Ordered, synchronous notification dispatcher.
///
/// Handlers registered for a kind run in registration order, and `publish`
/// does not return until all of them have completed. There is no implicit
/// process-wide registry: each [`crate::ProjectService`] owns its bus, so
/// isolated service instances can coexist in one process.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        kinds: &[ProjectEventKind],
        handler: impl Fn(&ProjectEvent) + 'static,
    ) -> Subscription {
        self.next_id += 1;
        let id = self.next_id;
        self.subscribers.push(Subscriber {
            id,
            kinds: kinds.to_vec(),
            handler: Rc::new(handler),
        });
        Subscription { id }
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.subscribers
            .retain(|subscriber| subscriber.id != subscription.id);
    }

    pub fn publish(&self, event: &ProjectEvent) {
        let kind = event.kind();
        for subscriber in &self.subscribers {
            if subscriber.kinds.contains(&kind) {
                (subscriber.handler)(event);
            }
        }
    }
}
