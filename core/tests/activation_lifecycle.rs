// core/tests/activation_lifecycle.rs
//
// Integration tests for activating a service against the in-memory host.
//
// Tests cover:
// - Sink registration on activate and withdrawal on deactivate
// - All-or-nothing activation when the host refuses a sink
// - A null client id is refused before anything is registered
// - Idempotent deactivation and reactivation with a new client id
// - Lifecycle notifications delivered while active

use std::sync::Arc;

use tip_core::memory::{HostFault, MemoryThreadManager};
use tip_core::{
    Capability, ClientId, DocumentContext, DocumentMgrId, HostModeFlags, KeyCode, KeyMetadata,
    KeyTable, LifecycleState, ModuleLifetime, ServiceConfig, ServiceError, SinkCookie,
    TextInputProcessor, TextInputProcessorEx, TextService,
};

static LAYOUT: KeyTable = KeyTable::new("layout", &[(KeyCode(0x41), '\u{0B85}')]);

fn service() -> Arc<TextService> {
    TextService::new(Arc::new(LAYOUT), &ServiceConfig::default(), &ModuleLifetime::new())
}

#[test]
fn test_full_session() {
    let host = MemoryThreadManager::new();
    let service = service();

    service.activate(host.clone(), ClientId(1)).unwrap();
    assert_eq!(service.state(), LifecycleState::Active);
    assert_eq!(host.thread_sink_count(), 1);
    assert_eq!(host.key_sink_client(), Some(ClientId(1)));

    let doc = host.create_document("", 0);
    let context: Arc<dyn DocumentContext> = doc.clone();
    host.init_document(doc.id()).unwrap();
    host.push_context(&context).unwrap();
    host.set_focus(Some(doc.id()), None).unwrap();

    assert!(host
        .press_key(Some(&context), KeyCode(0x41), KeyMetadata::press(0x1E))
        .unwrap());
    host.edit_queue().run_pending();
    assert_eq!(doc.text(), "\u{0B85}");

    host.pop_context(&context).unwrap();
    host.uninit_document(doc.id()).unwrap();
    service.deactivate().unwrap();

    assert_eq!(service.state(), LifecycleState::Inactive);
    assert_eq!(host.thread_sink_count(), 0);
    assert!(!host.has_key_sink());
    assert_eq!(host.unadvised_cookies(), vec![SinkCookie(1)]);
}

#[test]
fn test_key_sink_refusal_withdraws_lifecycle_sink() {
    let host = MemoryThreadManager::new();
    host.inject_fault(HostFault::AdviseKeySink);
    let service = service();

    let err = service.activate(host.clone(), ClientId(1)).unwrap_err();
    assert!(matches!(err, ServiceError::ResourceUnavailable(_)));
    assert_eq!(service.state(), LifecycleState::Inactive);
    assert_eq!(service.thread_sink_cookie(), SinkCookie::INVALID);
    assert_eq!(service.client_id(), ClientId::NULL);
    assert_eq!(host.thread_sink_count(), 0);
    assert_eq!(host.unadvised_cookies(), vec![SinkCookie(1)]);

    // The host holds nothing, so only our handle is left.
    assert_eq!(Arc::strong_count(&service), 1);
}

#[test]
fn test_null_client_id_is_refused_up_front() {
    let host = MemoryThreadManager::new();
    let service = service();

    let err = service.activate(host.clone(), ClientId::NULL).unwrap_err();
    assert_eq!(err, ServiceError::InvalidArgument("client id"));
    assert_eq!(service.state(), LifecycleState::Inactive);
    assert_eq!(host.thread_sink_count(), 0);
    assert!(!host.has_key_sink());
    assert!(host.unadvised_cookies().is_empty());
    assert_eq!(Arc::strong_count(&service), 1);

    // Keys are neither tested nor eaten without an active session.
    let doc = host.create_document("", 0);
    let context: Arc<dyn DocumentContext> = doc.clone();
    assert!(!host
        .press_key(Some(&context), KeyCode(0x41), KeyMetadata::press(0x1E))
        .unwrap());

    service.activate(host.clone(), ClientId(1)).unwrap();
    assert_eq!(service.state(), LifecycleState::Active);
    service.deactivate().unwrap();
}

#[test]
fn test_second_key_sink_is_refused_by_host() {
    let host = MemoryThreadManager::new();
    let first = service();
    let second = service();

    first.activate(host.clone(), ClientId(1)).unwrap();
    assert!(matches!(
        second.activate(host.clone(), ClientId(2)),
        Err(ServiceError::Host(_))
    ));
    assert_eq!(second.state(), LifecycleState::Inactive);
    assert_eq!(host.thread_sink_count(), 1);
    assert_eq!(host.key_sink_client(), Some(ClientId(1)));
    first.deactivate().unwrap();
}

#[test]
fn test_deactivate_without_activate_is_noop() {
    let service = service();
    service.deactivate().unwrap();
    service.deactivate().unwrap();
    assert_eq!(service.state(), LifecycleState::Inactive);
}

#[test]
fn test_reactivate_with_new_client() {
    let host = MemoryThreadManager::new();
    let service = service();

    service.activate(host.clone(), ClientId(1)).unwrap();
    service.deactivate().unwrap();
    service.activate(host.clone(), ClientId(2)).unwrap();
    assert_eq!(service.client_id(), ClientId(2));
    assert_eq!(host.key_sink_client(), Some(ClientId(2)));
    assert_eq!(service.thread_sink_cookie(), SinkCookie(2));
    service.deactivate().unwrap();
}

#[test]
fn test_double_activate_rejected() {
    let host = MemoryThreadManager::new();
    let service = service();
    service.activate(host.clone(), ClientId(1)).unwrap();
    assert!(matches!(
        service.activate(host.clone(), ClientId(1)),
        Err(ServiceError::InvalidState {
            expected: LifecycleState::Inactive,
            actual: LifecycleState::Active,
        })
    ));
    service.deactivate().unwrap();
}

#[test]
fn test_unregistration_failure_still_resets() {
    let host = MemoryThreadManager::new();
    let service = service();
    service.activate(host.clone(), ClientId(1)).unwrap();

    host.inject_fault(HostFault::UnadviseThreadSink);
    service.deactivate().unwrap();
    assert_eq!(service.state(), LifecycleState::Inactive);
    assert_eq!(service.thread_sink_cookie(), SinkCookie::INVALID);
    assert!(!host.has_key_sink());
}

#[test]
fn test_extended_activation_in_immersive_host() {
    let host =
        MemoryThreadManager::with_flags(HostModeFlags::IMMERSIVE | HostModeFlags::SECURE_MODE);
    let service = service();
    let processor = service
        .query(Capability::InputProcessorEx)
        .unwrap()
        .into_input_processor_ex()
        .unwrap();

    processor
        .activate_ex(host.clone(), ClientId(3), HostModeFlags::COMLESS)
        .unwrap();
    assert_eq!(service.activation_flags(), HostModeFlags::COMLESS);

    // Deactivation goes through the base entry point.
    processor.deactivate().unwrap();
    assert_eq!(service.activation_flags(), HostModeFlags::empty());
}

#[test]
fn test_keys_before_activation_are_not_eaten() {
    let host = MemoryThreadManager::new();
    let service = service();
    let doc = host.create_document("", 0);
    let context: Arc<dyn DocumentContext> = doc;

    // No key sink registered yet: the host handles the key itself.
    assert!(!host
        .press_key(Some(&context), KeyCode(0x41), KeyMetadata::default())
        .unwrap());
    assert_eq!(service.state(), LifecycleState::Inactive);
    assert_eq!(host.edit_queue().accepted(), 0);
}

#[test]
fn test_focus_notifications_without_documents() {
    let host = MemoryThreadManager::new();
    let service = service();
    service.activate(host.clone(), ClientId(1)).unwrap();
    host.set_focus(None, Some(DocumentMgrId(9))).unwrap();
    service.deactivate().unwrap();
}
