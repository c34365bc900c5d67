//! Boundary with the host text-editing framework.
//!
//! These traits describe what the service needs from the host: sink
//! registration on the thread manager, access to a document's selection,
//! and a scheduler that runs edit sessions. The host owns all of it; the
//! service only holds shared handles for as long as it needs them.
//!
//! [`crate::memory`] provides an in-process implementation used by the tests
//! and the demo binaries.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::key_event::{KeyMetadata, PreservedKeyId};
use crate::keymap::KeyCode;

/// Opaque token the host assigns to this service for one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Value held while no activation is in progress.
    pub const NULL: ClientId = ClientId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Handle for a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkCookie(pub u32);

impl SinkCookie {
    /// Sentinel for "not subscribed".
    pub const INVALID: SinkCookie = SinkCookie(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Token granting document access for the duration of one edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditCookie(pub u32);

/// Host-side identity of a document manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentMgrId(pub u32);

bitflags! {
    /// Mode flags the host reports for the current thread.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HostModeFlags: u32 {
        const NO_ACTIVATE_TIP = 0x0000_0001;
        const SECURE_MODE = 0x0000_0002;
        const UI_ELEMENT_ENABLED_ONLY = 0x0000_0004;
        const COMLESS = 0x0000_0008;
        const CONSOLE = 0x0000_0020;
        /// Sandboxed, managed-app context.
        const IMMERSIVE = 0x4000_0000;
    }
}

/// How the host should schedule an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Run before the request returns, or refuse.
    Sync,
    /// Queue and run later; completion is observed through the unit.
    #[default]
    Async,
    /// Run now if possible, otherwise queue; caller does not track completion.
    AsyncDontCare,
}

/// Range anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Start,
    End,
}

/// A span of document text the service can edit inside an edit session.
///
/// Positions are character offsets. Writing text leaves both anchors at the
/// start of the written text.
pub trait TextRange: Send {
    fn collapse(&mut self, ec: EditCookie, anchor: Anchor) -> Result<()>;

    /// Replace the range's text.
    fn set_text(&mut self, ec: EditCookie, text: &str) -> Result<()>;

    /// Move the end anchor by `count` characters; returns how far it moved.
    fn shift_end(&mut self, ec: EditCookie, count: isize) -> Result<isize>;

    /// Current `(start, end)` offsets.
    fn span(&self) -> (usize, usize);
}

/// Selection handed back to the host.
pub struct Selection<'a> {
    pub range: &'a dyn TextRange,
    pub active_end: Anchor,
}

impl<'a> Selection<'a> {
    /// Plain caret-style selection with the active end at `active_end`.
    pub fn new(range: &'a dyn TextRange, active_end: Anchor) -> Self {
        Self { range, active_end }
    }
}

/// Insertion-at-selection capability of a document.
pub trait InsertAtSelection {
    /// Return the current selection without modifying the document.
    fn query_selection(&self, ec: EditCookie) -> Result<Box<dyn TextRange>>;
}

/// Unit of work the host runs with document access.
pub trait EditSession: Send {
    /// Called once the host has accepted the session into its queue.
    fn on_queued(&mut self) {}

    /// Run the session. Consumes it; the host drops it afterwards.
    fn do_edit_session(self: Box<Self>, ec: EditCookie) -> Result<()>;
}

/// Host handle to one editable document or field.
pub trait DocumentContext: Send + Sync {
    /// Insertion capability, if this context supports it.
    fn insert_at_selection(&self) -> Option<&dyn InsertAtSelection>;

    fn set_selection(&self, ec: EditCookie, selection: &Selection<'_>) -> Result<()>;

    /// Submit an edit session. Returns once the host has accepted (or, in
    /// sync mode, run) it; never reports the session's own result.
    fn request_edit_session(
        &self,
        client_id: ClientId,
        session: Box<dyn EditSession>,
        mode: EditMode,
    ) -> Result<()>;
}

/// Lifecycle notifications from the thread manager.
pub trait ThreadEventSink: Send + Sync {
    fn on_init_document_mgr(&self, doc: DocumentMgrId) -> Result<()>;
    fn on_uninit_document_mgr(&self, doc: DocumentMgrId) -> Result<()>;
    fn on_set_focus(
        &self,
        focus: Option<DocumentMgrId>,
        previous: Option<DocumentMgrId>,
    ) -> Result<()>;
    fn on_push_context(&self, context: &Arc<dyn DocumentContext>) -> Result<()>;
    fn on_pop_context(&self, context: &Arc<dyn DocumentContext>) -> Result<()>;
}

/// Keyboard notifications. Each call answers whether the key was eaten.
pub trait KeyEventSink: Send + Sync {
    fn on_set_focus(&self, foreground: bool) -> Result<()>;

    fn on_test_key_down(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool>;

    fn on_key_down(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool>;

    fn on_test_key_up(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool>;

    fn on_key_up(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool>;

    fn on_preserved_key(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: PreservedKeyId,
    ) -> Result<bool>;
}

/// The host's per-thread manager the service is activated against.
pub trait ThreadManager: Send + Sync {
    fn advise_thread_event_sink(&self, sink: Arc<dyn ThreadEventSink>) -> Result<SinkCookie>;

    fn unadvise_sink(&self, cookie: SinkCookie) -> Result<()>;

    fn advise_key_event_sink(
        &self,
        client_id: ClientId,
        sink: Arc<dyn KeyEventSink>,
        foreground: bool,
    ) -> Result<()>;

    fn unadvise_key_event_sink(&self, client_id: ClientId) -> Result<()>;

    /// Mode flags, or `None` when the host does not expose them.
    fn active_flags(&self) -> Option<HostModeFlags> {
        None
    }
}
