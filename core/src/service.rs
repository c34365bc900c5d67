//! The service object and its capability facets.
//!
//! A [`TextService`] is handed to the host as a set of facets. Each facet is
//! an `Arc` to the same object, so the service lives exactly as long as the
//! host (or anybody else) holds one of them. While active, the host's sink
//! registries hold facets too; `deactivate` breaks that cycle.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::activation::{ActivationController, LifecycleState, SessionView};
use crate::error::{Result, ServiceError};
use crate::host::{
    ClientId, DocumentContext, DocumentMgrId, HostModeFlags, KeyEventSink, SinkCookie,
    ThreadEventSink, ThreadManager,
};
use crate::interceptor::KeyInterceptor;
use crate::key_event::{KeyMetadata, PreservedKeyId};
use crate::keymap::{KeyCode, KeyMapper};
use crate::module::{ModuleLifetime, ModuleLock};
use crate::search::SearchCandidateProvider;
use crate::ServiceConfig;

// ============================================================================
// Capabilities - interface identifiers the host can query for
// ============================================================================

/// Capabilities a host may ask a service object for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Base identity; every object answers it.
    Unknown,
    InputProcessor,
    InputProcessorEx,
    ThreadEventSink,
    KeyEventSink,
    DisplayAttributeProvider,
    SearchCandidateProvider,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Unknown,
        Capability::InputProcessor,
        Capability::InputProcessorEx,
        Capability::ThreadEventSink,
        Capability::KeyEventSink,
        Capability::DisplayAttributeProvider,
        Capability::SearchCandidateProvider,
    ];

    /// Host interface identifier.
    pub const fn iid(self) -> Uuid {
        match self {
            Capability::Unknown => Uuid::from_u128(0x00000000_0000_0000_c000_000000000046),
            Capability::InputProcessor => Uuid::from_u128(0xaa80e7f7_2021_11d2_93e0_0060b067b86e),
            Capability::InputProcessorEx => {
                Uuid::from_u128(0x6e4e2102_f9cd_433d_b496_303ce03a6507)
            }
            Capability::ThreadEventSink => Uuid::from_u128(0xaa80e80e_2021_11d2_93e0_0060b067b86e),
            Capability::KeyEventSink => Uuid::from_u128(0xaa80e7f5_2021_11d2_93e0_0060b067b86e),
            Capability::DisplayAttributeProvider => {
                Uuid::from_u128(0xfee47777_163c_4769_996a_6e9c50ad8f54)
            }
            Capability::SearchCandidateProvider => {
                Uuid::from_u128(0x87a2ad8f_f27b_4920_8501_67602280175d)
            }
        }
    }

    pub fn from_iid(iid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.iid() == iid)
    }
}

/// Primary entry point the host activates and deactivates.
pub trait TextInputProcessor: Send + Sync {
    fn activate(&self, host: Arc<dyn ThreadManager>, client_id: ClientId) -> Result<()>;
    fn deactivate(&self) -> Result<()>;
}

/// Extended activation carrying the host's activation flags.
pub trait TextInputProcessorEx: TextInputProcessor {
    fn activate_ex(
        &self,
        host: Arc<dyn ThreadManager>,
        client_id: ClientId,
        flags: HostModeFlags,
    ) -> Result<()>;
}

/// Handle returned by a capability query.
#[derive(Clone)]
pub enum Facet {
    Unknown(Arc<TextService>),
    InputProcessor(Arc<dyn TextInputProcessor>),
    InputProcessorEx(Arc<dyn TextInputProcessorEx>),
    ThreadEventSink(Arc<dyn ThreadEventSink>),
    KeyEventSink(Arc<dyn KeyEventSink>),
    /// Separate object; does not keep the service alive.
    SearchCandidateProvider(Arc<SearchCandidateProvider>),
}

impl Facet {
    pub fn capability(&self) -> Capability {
        match self {
            Facet::Unknown(_) => Capability::Unknown,
            Facet::InputProcessor(_) => Capability::InputProcessor,
            Facet::InputProcessorEx(_) => Capability::InputProcessorEx,
            Facet::ThreadEventSink(_) => Capability::ThreadEventSink,
            Facet::KeyEventSink(_) => Capability::KeyEventSink,
            Facet::SearchCandidateProvider(_) => Capability::SearchCandidateProvider,
        }
    }

    pub fn into_service(self) -> Option<Arc<TextService>> {
        match self {
            Facet::Unknown(service) => Some(service),
            _ => None,
        }
    }

    pub fn into_input_processor(self) -> Option<Arc<dyn TextInputProcessor>> {
        match self {
            Facet::InputProcessor(processor) => Some(processor),
            _ => None,
        }
    }

    pub fn into_input_processor_ex(self) -> Option<Arc<dyn TextInputProcessorEx>> {
        match self {
            Facet::InputProcessorEx(processor) => Some(processor),
            _ => None,
        }
    }

    pub fn into_key_event_sink(self) -> Option<Arc<dyn KeyEventSink>> {
        match self {
            Facet::KeyEventSink(sink) => Some(sink),
            _ => None,
        }
    }

    pub fn into_thread_event_sink(self) -> Option<Arc<dyn ThreadEventSink>> {
        match self {
            Facet::ThreadEventSink(sink) => Some(sink),
            _ => None,
        }
    }

    pub fn into_search_provider(self) -> Option<Arc<SearchCandidateProvider>> {
        match self {
            Facet::SearchCandidateProvider(provider) => Some(provider),
            _ => None,
        }
    }
}

impl fmt::Debug for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Facet").field(&self.capability()).finish()
    }
}

// ============================================================================
// TextService - the object behind every facet
// ============================================================================

pub struct TextService {
    me: Weak<TextService>,
    controller: Mutex<ActivationController>,
    interceptor: KeyInterceptor,
    search: Arc<SearchCandidateProvider>,
    _module_lock: ModuleLock,
}

impl TextService {
    /// Create a service that maps keys with `mapper`.
    ///
    /// The service holds a lock on `lifetime` until it is dropped.
    pub fn new(
        mapper: Arc<dyn KeyMapper>,
        config: &ServiceConfig,
        lifetime: &ModuleLifetime,
    ) -> Arc<Self> {
        let display_name = mapper.name().to_string();
        let service = Arc::new_cyclic(|me| TextService {
            me: me.clone(),
            controller: Mutex::new(ActivationController::new(config.enabled_on_start)),
            interceptor: KeyInterceptor::new(mapper, config),
            search: Arc::new(SearchCandidateProvider::new(display_name)),
            _module_lock: lifetime.guard(),
        });
        tracing::debug!(
            layout = service.interceptor.mapper().name(),
            module_refs = lifetime.count(),
            "service created"
        );
        service
    }

    fn strong(&self) -> Result<Arc<TextService>> {
        self.me
            .upgrade()
            .ok_or_else(|| ServiceError::unavailable("service is being released"))
    }

    /// Capability query. Every successful answer holds a new reference.
    pub fn query(&self, capability: Capability) -> Result<Facet> {
        let me = self.strong()?;
        let facet = match capability {
            Capability::Unknown => Facet::Unknown(me),
            Capability::InputProcessor => Facet::InputProcessor(me),
            Capability::InputProcessorEx => Facet::InputProcessorEx(me),
            Capability::ThreadEventSink => Facet::ThreadEventSink(me),
            Capability::KeyEventSink => Facet::KeyEventSink(me),
            Capability::SearchCandidateProvider => {
                Facet::SearchCandidateProvider(Arc::clone(&self.search))
            }
            Capability::DisplayAttributeProvider => {
                tracing::trace!(?capability, "capability not supported");
                return Err(ServiceError::NoInterface(capability));
            }
        };
        Ok(facet)
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.lock().state()
    }

    pub fn is_enabled(&self) -> bool {
        self.controller.lock().is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.controller.lock().set_enabled(enabled);
    }

    pub fn client_id(&self) -> ClientId {
        self.controller.lock().client_id()
    }

    pub fn thread_sink_cookie(&self) -> SinkCookie {
        self.controller.lock().thread_sink_cookie()
    }

    pub fn activation_flags(&self) -> HostModeFlags {
        self.controller.lock().activation_flags()
    }

    pub fn interceptor(&self) -> &KeyInterceptor {
        &self.interceptor
    }

    pub fn search_provider(&self) -> &Arc<SearchCandidateProvider> {
        &self.search
    }

    fn session(&self) -> SessionView {
        self.controller.lock().view()
    }

    fn sinks(&self) -> Result<(Arc<dyn ThreadEventSink>, Arc<dyn KeyEventSink>)> {
        let me = self.strong()?;
        let thread_sink: Arc<dyn ThreadEventSink> = me.clone();
        let key_sink: Arc<dyn KeyEventSink> = me;
        Ok((thread_sink, key_sink))
    }
}

impl fmt::Debug for TextService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextService")
            .field("layout", &self.interceptor.mapper().name())
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl Drop for TextService {
    fn drop(&mut self) {
        tracing::debug!(layout = self.interceptor.mapper().name(), "service released");
    }
}

impl TextInputProcessor for TextService {
    fn activate(&self, host: Arc<dyn ThreadManager>, client_id: ClientId) -> Result<()> {
        let (thread_sink, key_sink) = self.sinks()?;
        self.controller
            .lock()
            .activate(host, client_id, thread_sink, key_sink)
    }

    fn deactivate(&self) -> Result<()> {
        self.controller.lock().deactivate();
        Ok(())
    }
}

impl TextInputProcessorEx for TextService {
    fn activate_ex(
        &self,
        host: Arc<dyn ThreadManager>,
        client_id: ClientId,
        flags: HostModeFlags,
    ) -> Result<()> {
        let (thread_sink, key_sink) = self.sinks()?;
        self.controller
            .lock()
            .activate_ex(host, client_id, flags, thread_sink, key_sink)
    }
}

impl ThreadEventSink for TextService {
    fn on_init_document_mgr(&self, doc: DocumentMgrId) -> Result<()> {
        tracing::trace!(?doc, "document manager initialized");
        Ok(())
    }

    fn on_uninit_document_mgr(&self, doc: DocumentMgrId) -> Result<()> {
        tracing::trace!(?doc, "document manager uninitialized");
        Ok(())
    }

    fn on_set_focus(
        &self,
        focus: Option<DocumentMgrId>,
        previous: Option<DocumentMgrId>,
    ) -> Result<()> {
        tracing::trace!(?focus, ?previous, "document focus changed");
        Ok(())
    }

    fn on_push_context(&self, _context: &Arc<dyn DocumentContext>) -> Result<()> {
        Ok(())
    }

    fn on_pop_context(&self, _context: &Arc<dyn DocumentContext>) -> Result<()> {
        Ok(())
    }
}

impl KeyEventSink for TextService {
    fn on_set_focus(&self, foreground: bool) -> Result<()> {
        tracing::trace!(foreground, "keyboard focus changed");
        Ok(())
    }

    fn on_test_key_down(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        Ok(self
            .interceptor
            .test_key_down(self.session(), context, key, meta))
    }

    fn on_key_down(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        Ok(self.interceptor.key_down(self.session(), context, key, meta))
    }

    fn on_test_key_up(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        Ok(self.interceptor.test_key_up(context, key, meta))
    }

    fn on_key_up(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        Ok(self.interceptor.key_up(context, key, meta))
    }

    fn on_preserved_key(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: PreservedKeyId,
    ) -> Result<bool> {
        Ok(self.interceptor.preserved_key(context, key))
    }
}

// ============================================================================
// ServiceFactory - creates services for one service id
// ============================================================================

pub struct ServiceFactory {
    service_id: Uuid,
    mapper: Arc<dyn KeyMapper>,
    config: ServiceConfig,
    lifetime: ModuleLifetime,
}

impl ServiceFactory {
    pub fn new(
        service_id: Uuid,
        mapper: Arc<dyn KeyMapper>,
        config: ServiceConfig,
        lifetime: ModuleLifetime,
    ) -> Self {
        Self {
            service_id,
            mapper,
            config,
            lifetime,
        }
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create a new service and return its `capability` facet.
    ///
    /// Aggregation into an outer object is refused.
    pub fn create_instance(
        &self,
        outer: Option<&dyn Any>,
        capability: Capability,
    ) -> Result<Facet> {
        if outer.is_some() {
            tracing::debug!("aggregation refused");
            return Err(ServiceError::NoAggregation);
        }
        let service = TextService::new(Arc::clone(&self.mapper), &self.config, &self.lifetime);
        service.query(capability)
    }

    /// Pin (or release) the module independently of live services.
    pub fn lock_server(&self, lock: bool) {
        let count = if lock {
            self.lifetime.lock()
        } else {
            self.lifetime.unlock()
        };
        tracing::debug!(lock, count, "server lock changed");
    }
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("service_id", &self.service_id)
            .field("layout", &self.mapper.name())
            .field("config", &self.config)
            .finish()
    }
}
