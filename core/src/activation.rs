//! Activation lifecycle: sink registration against the host's thread manager.
//!
//! The controller owns the per-activation session state. Registration is
//! all-or-nothing: if the key sink cannot be advised, the lifecycle sink that
//! was already advised is withdrawn before the failure is reported, and every
//! handle is back at its sentinel.

use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::host::{
    ClientId, HostModeFlags, KeyEventSink, SinkCookie, ThreadEventSink, ThreadManager,
};

/// Lifecycle of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// Snapshot of the session consulted on the key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionView {
    pub active: bool,
    pub enabled: bool,
    pub client_id: ClientId,
}

/// Per-service activation state machine.
pub struct ActivationController {
    state: LifecycleState,
    host: Option<Arc<dyn ThreadManager>>,
    client_id: ClientId,
    thread_sink_cookie: SinkCookie,
    key_sink_advised: bool,
    enabled: bool,
    activation_flags: HostModeFlags,
}

impl ActivationController {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: LifecycleState::Inactive,
            host: None,
            client_id: ClientId::NULL,
            thread_sink_cookie: SinkCookie::INVALID,
            key_sink_advised: false,
            enabled,
            activation_flags: HostModeFlags::empty(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Lifecycle sink cookie, [`SinkCookie::INVALID`] while not subscribed.
    pub fn thread_sink_cookie(&self) -> SinkCookie {
        self.thread_sink_cookie
    }

    pub fn key_sink_advised(&self) -> bool {
        self.key_sink_advised
    }

    pub fn host(&self) -> Option<&Arc<dyn ThreadManager>> {
        self.host.as_ref()
    }

    pub fn activation_flags(&self) -> HostModeFlags {
        self.activation_flags
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::debug!(enabled, "keyboard enablement changed");
        }
        self.enabled = enabled;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            active: self.is_active(),
            enabled: self.enabled,
            client_id: self.client_id,
        }
    }

    /// Activate against `host`, advising both sinks.
    pub fn activate(
        &mut self,
        host: Arc<dyn ThreadManager>,
        client_id: ClientId,
        thread_sink: Arc<dyn ThreadEventSink>,
        key_sink: Arc<dyn KeyEventSink>,
    ) -> Result<()> {
        if self.state != LifecycleState::Inactive {
            return Err(ServiceError::InvalidState {
                expected: LifecycleState::Inactive,
                actual: self.state,
            });
        }
        if client_id.is_null() {
            tracing::warn!("activation with a null client id refused");
            return Err(ServiceError::InvalidArgument("client id"));
        }
        tracing::debug!(?client_id, "activating");

        self.state = LifecycleState::Activating;
        self.host = Some(Arc::clone(&host));
        self.client_id = client_id;

        match host.advise_thread_event_sink(thread_sink) {
            Ok(cookie) => self.thread_sink_cookie = cookie,
            Err(err) => {
                tracing::warn!(?client_id, error = %err, "thread event sink registration failed");
                self.rollback();
                return Err(err);
            }
        }

        if let Err(err) = host.advise_key_event_sink(client_id, key_sink, true) {
            tracing::warn!(?client_id, error = %err, "key event sink registration failed");
            self.rollback();
            return Err(err);
        }
        self.key_sink_advised = true;

        log_host_mode(host.as_ref());

        self.state = LifecycleState::Active;
        tracing::debug!(?client_id, cookie = ?self.thread_sink_cookie, "activated");
        Ok(())
    }

    /// Extended activation; `flags` are recorded for diagnostics only.
    pub fn activate_ex(
        &mut self,
        host: Arc<dyn ThreadManager>,
        client_id: ClientId,
        flags: HostModeFlags,
        thread_sink: Arc<dyn ThreadEventSink>,
        key_sink: Arc<dyn KeyEventSink>,
    ) -> Result<()> {
        tracing::debug!(?flags, "extended activation");
        self.activate(host, client_id, thread_sink, key_sink)?;
        self.activation_flags = flags;
        Ok(())
    }

    /// Withdraw both sinks and release the host. No-op when inactive.
    pub fn deactivate(&mut self) {
        if self.state == LifecycleState::Inactive {
            tracing::trace!("deactivate on inactive session ignored");
            return;
        }
        tracing::debug!(client_id = ?self.client_id, "deactivating");
        self.state = LifecycleState::Deactivating;
        self.rollback();
        tracing::debug!("deactivated");
    }

    /// Withdraw whatever is registered and reset every handle.
    fn rollback(&mut self) {
        if let Some(host) = self.host.take() {
            if self.key_sink_advised {
                if let Err(err) = host.unadvise_key_event_sink(self.client_id) {
                    tracing::warn!(error = %err, "key event sink unregistration failed");
                }
            }
            if self.thread_sink_cookie.is_valid() {
                if let Err(err) = host.unadvise_sink(self.thread_sink_cookie) {
                    tracing::warn!(
                        cookie = ?self.thread_sink_cookie,
                        error = %err,
                        "thread event sink unregistration failed"
                    );
                }
            }
        }
        self.key_sink_advised = false;
        self.thread_sink_cookie = SinkCookie::INVALID;
        self.client_id = ClientId::NULL;
        self.activation_flags = HostModeFlags::empty();
        self.state = LifecycleState::Inactive;
    }
}

impl Drop for ActivationController {
    fn drop(&mut self) {
        if self.state != LifecycleState::Inactive {
            tracing::debug!("controller dropped while active");
            self.rollback();
        }
    }
}

fn log_host_mode(host: &dyn ThreadManager) {
    match host.active_flags() {
        Some(flags) if flags.contains(HostModeFlags::IMMERSIVE) => {
            tracing::debug!(?flags, "host running in immersive mode");
        }
        Some(flags) => tracing::debug!(?flags, "host running in desktop mode"),
        None => tracing::trace!("host does not report mode flags"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HostFault, MemoryThreadManager};
    use crate::service::TextService;
    use crate::{KeyCode, KeyTable, ModuleLifetime, ServiceConfig};

    static EMPTY: KeyTable = KeyTable::new("empty", &[(KeyCode(0x41), 'a')]);

    fn sinks() -> (Arc<dyn ThreadEventSink>, Arc<dyn KeyEventSink>) {
        let service = TextService::new(
            Arc::new(EMPTY),
            &ServiceConfig::default(),
            &ModuleLifetime::new(),
        );
        (service.clone(), service)
    }

    #[test]
    fn test_activate_and_deactivate() {
        let host = MemoryThreadManager::new();
        let (thread_sink, key_sink) = sinks();
        let mut controller = ActivationController::new(true);

        controller
            .activate(host.clone(), ClientId(9), thread_sink, key_sink)
            .unwrap();
        assert_eq!(controller.state(), LifecycleState::Active);
        assert!(controller.thread_sink_cookie().is_valid());
        assert_eq!(host.thread_sink_count(), 1);
        assert_eq!(host.key_sink_client(), Some(ClientId(9)));

        controller.deactivate();
        assert_eq!(controller.state(), LifecycleState::Inactive);
        assert_eq!(controller.thread_sink_cookie(), SinkCookie::INVALID);
        assert_eq!(controller.client_id(), ClientId::NULL);
        assert!(controller.host().is_none());
        assert_eq!(host.thread_sink_count(), 0);
        assert!(!host.has_key_sink());
    }

    #[test]
    fn test_key_sink_failure_rolls_back_thread_sink() {
        let host = MemoryThreadManager::new();
        host.inject_fault(HostFault::AdviseKeySink);
        let (thread_sink, key_sink) = sinks();
        let mut controller = ActivationController::new(true);

        let err = controller
            .activate(host.clone(), ClientId(3), thread_sink, key_sink)
            .unwrap_err();
        assert!(matches!(err, ServiceError::ResourceUnavailable(_)));
        assert_eq!(controller.state(), LifecycleState::Inactive);
        assert_eq!(controller.thread_sink_cookie(), SinkCookie::INVALID);
        assert_eq!(host.thread_sink_count(), 0);
        assert_eq!(host.unadvised_cookies(), vec![SinkCookie(1)]);
    }

    #[test]
    fn test_thread_sink_failure_registers_nothing() {
        let host = MemoryThreadManager::new();
        host.inject_fault(HostFault::AdviseThreadSink);
        let (thread_sink, key_sink) = sinks();
        let mut controller = ActivationController::new(true);

        assert!(controller
            .activate(host.clone(), ClientId(3), thread_sink, key_sink)
            .is_err());
        assert!(!host.has_key_sink());
        assert!(host.unadvised_cookies().is_empty());
        assert!(controller.host().is_none());
    }

    #[test]
    fn test_double_activation_rejected() {
        let host = MemoryThreadManager::new();
        let (thread_sink, key_sink) = sinks();
        let mut controller = ActivationController::new(true);
        controller
            .activate(host.clone(), ClientId(1), thread_sink.clone(), key_sink.clone())
            .unwrap();

        let err = controller
            .activate(host.clone(), ClientId(2), thread_sink, key_sink)
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidState {
                expected: LifecycleState::Inactive,
                actual: LifecycleState::Active,
            }
        );
        assert_eq!(controller.client_id(), ClientId(1));
        controller.deactivate();
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut controller = ActivationController::new(true);
        controller.deactivate();
        controller.deactivate();
        assert_eq!(controller.state(), LifecycleState::Inactive);
    }

    #[test]
    fn test_deactivate_survives_unregistration_failures() {
        let host = MemoryThreadManager::new();
        let (thread_sink, key_sink) = sinks();
        let mut controller = ActivationController::new(true);
        controller
            .activate(host.clone(), ClientId(4), thread_sink, key_sink)
            .unwrap();

        host.inject_fault(HostFault::UnadviseKeySink);
        host.inject_fault(HostFault::UnadviseThreadSink);
        controller.deactivate();
        assert_eq!(controller.state(), LifecycleState::Inactive);
        assert_eq!(controller.thread_sink_cookie(), SinkCookie::INVALID);
    }

    #[test]
    fn test_activate_ex_records_flags_and_mode_does_not_matter() {
        for flags in [Some(HostModeFlags::IMMERSIVE), None] {
            let host = match flags {
                Some(flags) => MemoryThreadManager::with_flags(flags),
                None => MemoryThreadManager::new(),
            };
            let (thread_sink, key_sink) = sinks();
            let mut controller = ActivationController::new(true);
            controller
                .activate_ex(
                    host.clone(),
                    ClientId(5),
                    HostModeFlags::SECURE_MODE,
                    thread_sink,
                    key_sink,
                )
                .unwrap();
            assert!(controller.is_active());
            assert_eq!(controller.activation_flags(), HostModeFlags::SECURE_MODE);
            controller.deactivate();
            assert_eq!(controller.activation_flags(), HostModeFlags::empty());
        }
    }
}
