//! Module lifetime accounting and class object lookup.
//!
//! A hosting module may only be unloaded when no service it created is
//! alive and nobody holds a server lock. The count is an explicit object the
//! module owns and hands to its factories, not process-global state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::service::ServiceFactory;

/// Shared count of outstanding references to a module.
#[derive(Debug, Clone, Default)]
pub struct ModuleLifetime {
    count: Arc<AtomicUsize>,
}

impl ModuleLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Release one reference. Unbalanced unlocks are logged and ignored.
    pub fn unlock(&self) -> usize {
        match self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                tracing::warn!("module unlocked more often than locked");
                0
            }
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn can_unload(&self) -> bool {
        self.count() == 0
    }

    /// Lock held until the guard is dropped.
    pub fn guard(&self) -> ModuleLock {
        self.lock();
        ModuleLock {
            lifetime: self.clone(),
        }
    }
}

/// RAII reference on a [`ModuleLifetime`].
#[derive(Debug)]
pub struct ModuleLock {
    lifetime: ModuleLifetime,
}

impl Drop for ModuleLock {
    fn drop(&mut self) {
        self.lifetime.unlock();
    }
}

/// The loadable unit that exposes service factories to the host.
pub struct Module {
    lifetime: ModuleLifetime,
    factories: Vec<Arc<ServiceFactory>>,
}

impl Module {
    pub fn new(lifetime: ModuleLifetime) -> Self {
        Self {
            lifetime,
            factories: Vec::new(),
        }
    }

    pub fn with_factory(mut self, factory: Arc<ServiceFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn lifetime(&self) -> &ModuleLifetime {
        &self.lifetime
    }

    /// Factory for `service_id`.
    pub fn class_object(&self, service_id: Uuid) -> Result<Arc<ServiceFactory>> {
        tracing::debug!(%service_id, "class object requested");
        self.factories
            .iter()
            .find(|factory| factory.service_id() == service_id)
            .cloned()
            .ok_or(ServiceError::ClassNotAvailable(service_id))
    }

    pub fn can_unload_now(&self) -> bool {
        self.lifetime.can_unload()
    }
}
