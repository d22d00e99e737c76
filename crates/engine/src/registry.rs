//! Backend and alert-type registries.
//!
//! Registries are filled once at startup and then shared behind an `Arc`.
//! Registration needs `&mut self`, so a shared registry is read-only: there is
//! no runtime unregister and no way to register after dispatch has begun.

use std::collections::HashMap;
use std::sync::Arc;

use relay_common::error::RegistryError;

use crate::alert_type::AlertType;
use crate::backend::Backend;

/// Append-only, insertion-ordered table keyed by string id.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: Vec<(String, Arc<T>)>,
    index: HashMap<String, usize>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert under `id`. A taken id is rejected and leaves the registry unchanged.
    pub fn insert(&mut self, id: String, entry: Arc<T>) -> Result<(), RegistryError> {
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateId {
                kind: self.kind,
                id,
            });
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push((id, entry));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<T>, RegistryError> {
        self.index
            .get(id)
            .map(|&i| Arc::clone(&self.entries[i].1))
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                id: id.to_string(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entries in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Delivery backends by id.
pub struct BackendRegistry {
    inner: Registry<dyn Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("backend"),
        }
    }

    pub fn register<B: Backend + 'static>(&mut self, backend: B) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(backend))
    }

    pub fn register_arc(&mut self, backend: Arc<dyn Backend>) -> Result<(), RegistryError> {
        let id = backend.id();
        self.inner.insert(id.clone(), backend)?;
        tracing::info!(backend_id = %id, "Registered delivery backend");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Backend>, RegistryError> {
        self.inner.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.inner.all()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.inner.ids()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Alert types by id.
pub struct AlertTypeRegistry {
    inner: Registry<dyn AlertType>,
}

impl AlertTypeRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("alert type"),
        }
    }

    pub fn register<A: AlertType + 'static>(&mut self, alert_type: A) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(alert_type))
    }

    pub fn register_arc(&mut self, alert_type: Arc<dyn AlertType>) -> Result<(), RegistryError> {
        let info = alert_type.info();
        let (id, trigger) = (info.id.clone(), info.trigger_event.clone());
        self.inner.insert(id.clone(), alert_type)?;
        tracing::info!(alert_type_id = %id, trigger_event = %trigger, "Registered alert type");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn AlertType>, RegistryError> {
        self.inner.get(id)
    }

    /// Alert types listening for `event_type`, in registration order.
    pub fn subscribed_to<'a>(
        &'a self,
        event_type: &'a str,
    ) -> impl Iterator<Item = &'a Arc<dyn AlertType>> + 'a {
        self.inner
            .all()
            .filter(move |alert_type| alert_type.info().trigger_event == event_type)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn AlertType>> {
        self.inner.all()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.inner.ids()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for AlertTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
