//! Alert type definitions.
//!
//! An alert type says when a notification is warranted (`is_applicable`), who
//! gets it (`recipients_for`) and what it says (`render`). Static metadata lives
//! in [`AlertTypeInfo`]; behavior is either a hand-written [`AlertType`] impl or
//! an [`AlertTypeDefinition`] assembled from closures.

use serde::Serialize;

use relay_common::types::{Recipient, RenderedContent, TriggerEvent};

/// Static description of an alert type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertTypeInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Event type this alert subscribes to.
    pub trigger_event: String,
    /// Backends to deliver through. `None` means every registered backend.
    pub target_backends: Option<Vec<String>>,
    /// Whether recipients without an explicit preference receive this alert.
    pub default_enabled: bool,
}

impl AlertTypeInfo {
    pub fn new(id: impl Into<String>, trigger_event: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            description: String::new(),
            id,
            trigger_event: trigger_event.into(),
            target_backends: None,
            default_enabled: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_backends = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }
}

pub trait AlertType: Send + Sync {
    fn info(&self) -> &AlertTypeInfo;

    fn is_applicable(&self, _event: &TriggerEvent) -> bool {
        true
    }

    fn recipients_for(&self, event: &TriggerEvent) -> Vec<Recipient>;

    /// Content for one recipient on one backend. Defaults to the type's title
    /// and description.
    fn render(
        &self,
        _recipient: &Recipient,
        _event: &TriggerEvent,
        _backend_id: &str,
    ) -> RenderedContent {
        let info = self.info();
        RenderedContent::new(&info.title, &info.description)
    }
}

type ApplicableFn = dyn Fn(&TriggerEvent) -> bool + Send + Sync;
type RecipientsFn = dyn Fn(&TriggerEvent) -> Vec<Recipient> + Send + Sync;
type RenderFn = dyn Fn(&Recipient, &TriggerEvent, &str) -> RenderedContent + Send + Sync;

/// An alert type built from plain values and closures.
///
/// Unset hooks fall back to the [`AlertType`] defaults.
pub struct AlertTypeDefinition {
    info: AlertTypeInfo,
    applicable: Option<Box<ApplicableFn>>,
    recipients: Box<RecipientsFn>,
    render: Option<Box<RenderFn>>,
}

impl AlertTypeDefinition {
    pub fn new<F>(info: AlertTypeInfo, recipients: F) -> Self
    where
        F: Fn(&TriggerEvent) -> Vec<Recipient> + Send + Sync + 'static,
    {
        Self {
            info,
            applicable: None,
            recipients: Box::new(recipients),
            render: None,
        }
    }

    pub fn when<F>(mut self, applicable: F) -> Self
    where
        F: Fn(&TriggerEvent) -> bool + Send + Sync + 'static,
    {
        self.applicable = Some(Box::new(applicable));
        self
    }

    pub fn render_with<F>(mut self, render: F) -> Self
    where
        F: Fn(&Recipient, &TriggerEvent, &str) -> RenderedContent + Send + Sync + 'static,
    {
        self.render = Some(Box::new(render));
        self
    }
}

impl std::fmt::Debug for AlertTypeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertTypeDefinition")
            .field("info", &self.info)
            .field("has_applicable", &self.applicable.is_some())
            .field("has_render", &self.render.is_some())
            .finish()
    }
}

impl AlertType for AlertTypeDefinition {
    fn info(&self) -> &AlertTypeInfo {
        &self.info
    }

    fn is_applicable(&self, event: &TriggerEvent) -> bool {
        self.applicable.as_ref().is_none_or(|f| f(event))
    }

    fn recipients_for(&self, event: &TriggerEvent) -> Vec<Recipient> {
        (self.recipients)(event)
    }

    fn render(&self, recipient: &Recipient, event: &TriggerEvent, backend_id: &str) -> RenderedContent {
        match &self.render {
            Some(render) => render(recipient, event, backend_id),
            None => RenderedContent::new(&self.info.title, &self.info.description),
        }
    }
}
