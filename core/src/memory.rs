//! In-process host: a thread manager, documents and an edit scheduler that
//! live entirely in memory.
//!
//! This is what the tests and demo binaries activate the service against.
//! Every host operation can be made to fail through fault injection so the
//! rollback and abort paths can be exercised deterministically.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::host::{
    Anchor, ClientId, DocumentContext, DocumentMgrId, EditCookie, EditMode, EditSession,
    HostModeFlags, InsertAtSelection, KeyEventSink, Selection, SinkCookie, TextRange,
    ThreadEventSink, ThreadManager,
};
use crate::key_event::KeyMetadata;
use crate::keymap::KeyCode;

// ============================================================================
// EditQueue - single-threaded cooperative edit scheduler
// ============================================================================

type EditJob = Box<dyn FnOnce(EditCookie) + Send>;

/// FIFO scheduler for edit sessions.
///
/// Jobs run one at a time on the caller's thread when the host drains the
/// queue. Jobs submitted while another is running are appended, so units
/// from one document always run in submission order.
pub struct EditQueue {
    jobs: Mutex<VecDeque<EditJob>>,
    next_cookie: AtomicU32,
    running: AtomicBool,
    accepted: AtomicUsize,
    reject_next: AtomicUsize,
}

impl EditQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(VecDeque::new()),
            next_cookie: AtomicU32::new(1),
            running: AtomicBool::new(false),
            accepted: AtomicUsize::new(0),
            reject_next: AtomicUsize::new(0),
        })
    }

    /// Refuse the next `count` submissions with [`ServiceError::OutOfMemory`].
    pub fn reject_next(&self, count: usize) {
        self.reject_next.store(count, Ordering::SeqCst);
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Total submissions accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the oldest pending job. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                self.run(job);
                true
            }
            None => false,
        }
    }

    /// Run jobs until the queue is empty, including jobs queued meanwhile.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drop every pending job without running it.
    pub fn discard_pending(&self) -> usize {
        let jobs: Vec<EditJob> = self.jobs.lock().drain(..).collect();
        let count = jobs.len();
        drop(jobs);
        if count > 0 {
            tracing::debug!(count, "discarded pending edit sessions");
        }
        count
    }

    fn admit(&self) -> Result<()> {
        let rejected = self
            .reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(ServiceError::OutOfMemory);
        }
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit(&self, mode: EditMode, job: EditJob) -> Result<()> {
        match mode {
            EditMode::Sync if self.is_running() => Err(ServiceError::Host(
                "synchronous edit session refused while another session runs".into(),
            )),
            EditMode::Sync => {
                self.admit()?;
                self.run(job);
                Ok(())
            }
            EditMode::AsyncDontCare if !self.is_running() && self.pending() == 0 => {
                self.admit()?;
                self.run(job);
                Ok(())
            }
            EditMode::Async | EditMode::AsyncDontCare => {
                self.admit()?;
                self.jobs.lock().push_back(job);
                Ok(())
            }
        }
    }

    fn run(&self, job: EditJob) {
        let cookie = EditCookie(self.next_cookie.fetch_add(1, Ordering::SeqCst));
        let nested = self.running.swap(true, Ordering::SeqCst);
        job(cookie);
        if !nested {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// MemoryDocument - editable text with a selection
// ============================================================================

/// Operations of [`MemoryDocument`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFault {
    /// Context does not offer insertion at selection.
    NoInsertAtSelection,
    QuerySelection,
    CollapseStart,
    CollapseEnd,
    SetText,
    ShiftEnd,
    SetSelection,
}

struct DocState {
    text: Vec<char>,
    selection: (usize, usize),
    active_end: Anchor,
    granted: Option<EditCookie>,
    detached: bool,
    faults: HashSet<DocumentFault>,
}

impl DocState {
    fn check(&self, ec: EditCookie) -> Result<()> {
        if self.detached {
            return Err(ServiceError::unavailable("document detached"));
        }
        if self.granted != Some(ec) {
            return Err(ServiceError::InvalidArgument("edit cookie not granted"));
        }
        Ok(())
    }

    fn fault(&self, fault: DocumentFault) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(ServiceError::Host(format!("injected fault: {:?}", fault)));
        }
        Ok(())
    }

    /// Replace `start..end` with `text`, moving the stored selection the way
    /// anchors with backward gravity would.
    fn replace(&mut self, start: usize, end: usize, text: &str) {
        let inserted: Vec<char> = text.chars().collect();
        let removed = end - start;
        let added = inserted.len();
        self.text.splice(start..end, inserted);

        let adjust = |pos: usize| {
            if pos <= start {
                pos
            } else if pos >= end {
                pos - removed + added
            } else {
                start
            }
        };
        self.selection = (adjust(self.selection.0), adjust(self.selection.1));
    }
}

struct DocShared {
    state: Mutex<DocState>,
}

/// Text document living in memory.
pub struct MemoryDocument {
    id: DocumentMgrId,
    shared: Arc<DocShared>,
    queue: Arc<EditQueue>,
}

impl MemoryDocument {
    /// Empty document scheduling its edits on `queue`.
    pub fn new(id: DocumentMgrId, queue: Arc<EditQueue>) -> Arc<Self> {
        Self::with_text(id, queue, "", 0)
    }

    /// Document holding `text` with the caret at character offset `caret`
    /// (clamped to the text length).
    pub fn with_text(
        id: DocumentMgrId,
        queue: Arc<EditQueue>,
        text: &str,
        caret: usize,
    ) -> Arc<Self> {
        let chars: Vec<char> = text.chars().collect();
        let caret = caret.min(chars.len());
        Arc::new(Self {
            id,
            shared: Arc::new(DocShared {
                state: Mutex::new(DocState {
                    text: chars,
                    selection: (caret, caret),
                    active_end: Anchor::End,
                    granted: None,
                    detached: false,
                    faults: HashSet::new(),
                }),
            }),
            queue,
        })
    }

    pub fn id(&self) -> DocumentMgrId {
        self.id
    }

    pub fn text(&self) -> String {
        self.shared.state.lock().text.iter().collect()
    }

    /// Current selection as `(start, end)` character offsets.
    pub fn selection(&self) -> (usize, usize) {
        self.shared.state.lock().selection
    }

    pub fn active_end(&self) -> Anchor {
        self.shared.state.lock().active_end
    }

    /// Select `start..end` directly, outside any edit session.
    pub fn select(&self, start: usize, end: usize) {
        let mut state = self.shared.state.lock();
        let len = state.text.len();
        let (start, end) = (start.min(len), end.min(len));
        state.selection = (start.min(end), start.max(end));
    }

    /// Tear the document down. Later edit sessions fail at their first access.
    pub fn detach(&self) {
        self.shared.state.lock().detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.shared.state.lock().detached
    }

    pub fn inject_fault(&self, fault: DocumentFault) {
        self.shared.state.lock().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.shared.state.lock().faults.clear();
    }

    pub fn queue(&self) -> &Arc<EditQueue> {
        &self.queue
    }
}

impl InsertAtSelection for MemoryDocument {
    fn query_selection(&self, ec: EditCookie) -> Result<Box<dyn TextRange>> {
        let state = self.shared.state.lock();
        state.check(ec)?;
        state.fault(DocumentFault::QuerySelection)?;
        let (start, end) = state.selection;
        Ok(Box::new(MemoryRange {
            shared: Arc::clone(&self.shared),
            start,
            end,
        }))
    }
}

impl DocumentContext for MemoryDocument {
    fn insert_at_selection(&self) -> Option<&dyn InsertAtSelection> {
        let state = self.shared.state.lock();
        if state.faults.contains(&DocumentFault::NoInsertAtSelection) {
            return None;
        }
        Some(self)
    }

    fn set_selection(&self, ec: EditCookie, selection: &Selection<'_>) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.check(ec)?;
        state.fault(DocumentFault::SetSelection)?;
        let (start, end) = selection.range.span();
        if start > end || end > state.text.len() {
            return Err(ServiceError::InvalidArgument("selection out of bounds"));
        }
        state.selection = (start, end);
        state.active_end = selection.active_end;
        Ok(())
    }

    fn request_edit_session(
        &self,
        client_id: ClientId,
        mut session: Box<dyn EditSession>,
        mode: EditMode,
    ) -> Result<()> {
        if client_id.is_null() {
            return Err(ServiceError::InvalidArgument("client id"));
        }
        let shared = Arc::clone(&self.shared);
        if mode != EditMode::Sync {
            session.on_queued();
        }
        let doc = self.id;
        self.queue.submit(
            mode,
            Box::new(move |ec| {
                shared.state.lock().granted = Some(ec);
                if let Err(err) = session.do_edit_session(ec) {
                    tracing::debug!(?doc, error = %err, "edit session reported failure");
                }
                shared.state.lock().granted = None;
            }),
        )
    }
}

/// Range handed out by [`MemoryDocument`].
struct MemoryRange {
    shared: Arc<DocShared>,
    start: usize,
    end: usize,
}

impl TextRange for MemoryRange {
    fn collapse(&mut self, ec: EditCookie, anchor: Anchor) -> Result<()> {
        let state = self.shared.state.lock();
        state.check(ec)?;
        match anchor {
            Anchor::Start => {
                state.fault(DocumentFault::CollapseStart)?;
                self.end = self.start;
            }
            Anchor::End => {
                state.fault(DocumentFault::CollapseEnd)?;
                self.start = self.end;
            }
        }
        Ok(())
    }

    fn set_text(&mut self, ec: EditCookie, text: &str) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.check(ec)?;
        state.fault(DocumentFault::SetText)?;
        let len = state.text.len();
        let start = self.start.min(len);
        let end = self.end.clamp(start, len);
        state.replace(start, end, text);
        self.start = start;
        self.end = start;
        Ok(())
    }

    fn shift_end(&mut self, ec: EditCookie, count: isize) -> Result<isize> {
        let state = self.shared.state.lock();
        state.check(ec)?;
        state.fault(DocumentFault::ShiftEnd)?;
        let len = state.text.len() as isize;
        let new_end = (self.end as isize + count).clamp(0, len);
        let moved = new_end - self.end as isize;
        self.end = new_end as usize;
        if self.end < self.start {
            self.start = self.end;
        }
        Ok(moved)
    }

    fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

// ============================================================================
// MemoryThreadManager - sink registry and key dispatch
// ============================================================================

/// Thread manager operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFault {
    AdviseThreadSink,
    AdviseKeySink,
    UnadviseThreadSink,
    UnadviseKeySink,
}

struct HostState {
    next_cookie: u32,
    next_document: u32,
    thread_sinks: BTreeMap<u32, Arc<dyn ThreadEventSink>>,
    key_sink: Option<(ClientId, Arc<dyn KeyEventSink>)>,
    flags: Option<HostModeFlags>,
    faults: HashSet<HostFault>,
    unadvised: Vec<SinkCookie>,
}

impl HostState {
    fn fault(&self, fault: HostFault) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(ServiceError::unavailable(format!("injected fault: {:?}", fault)));
        }
        Ok(())
    }
}

/// In-memory thread manager.
pub struct MemoryThreadManager {
    queue: Arc<EditQueue>,
    state: Mutex<HostState>,
}

impl MemoryThreadManager {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Thread manager reporting `flags` as its active mode.
    pub fn with_flags(flags: HostModeFlags) -> Arc<Self> {
        Self::build(Some(flags))
    }

    fn build(flags: Option<HostModeFlags>) -> Arc<Self> {
        Arc::new(Self {
            queue: EditQueue::new(),
            state: Mutex::new(HostState {
                next_cookie: 1,
                next_document: 1,
                thread_sinks: BTreeMap::new(),
                key_sink: None,
                flags,
                faults: HashSet::new(),
                unadvised: Vec::new(),
            }),
        })
    }

    pub fn edit_queue(&self) -> &Arc<EditQueue> {
        &self.queue
    }

    /// New document on this thread, caret at `caret`.
    pub fn create_document(&self, text: &str, caret: usize) -> Arc<MemoryDocument> {
        let id = {
            let mut state = self.state.lock();
            let id = DocumentMgrId(state.next_document);
            state.next_document += 1;
            id
        };
        MemoryDocument::with_text(id, Arc::clone(&self.queue), text, caret)
    }

    pub fn inject_fault(&self, fault: HostFault) {
        self.state.lock().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn thread_sink_count(&self) -> usize {
        self.state.lock().thread_sinks.len()
    }

    pub fn has_key_sink(&self) -> bool {
        self.state.lock().key_sink.is_some()
    }

    pub fn key_sink_client(&self) -> Option<ClientId> {
        self.state.lock().key_sink.as_ref().map(|(id, _)| *id)
    }

    /// Cookies passed to successful `unadvise_sink` calls, in order.
    pub fn unadvised_cookies(&self) -> Vec<SinkCookie> {
        self.state.lock().unadvised.clone()
    }

    fn key_sink(&self) -> Option<Arc<dyn KeyEventSink>> {
        self.state.lock().key_sink.as_ref().map(|(_, sink)| Arc::clone(sink))
    }

    fn thread_sinks(&self) -> Vec<Arc<dyn ThreadEventSink>> {
        self.state.lock().thread_sinks.values().cloned().collect()
    }

    /// Deliver a key press the way the keystroke manager does: probe first,
    /// then the real key-down only if the probe says the key will be eaten.
    pub fn press_key(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        let Some(sink) = self.key_sink() else {
            return Ok(false);
        };
        if !sink.on_test_key_down(context, key, meta)? {
            return Ok(false);
        }
        sink.on_key_down(context, key, meta)
    }

    /// Deliver a key release.
    pub fn release_key(
        &self,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> Result<bool> {
        let Some(sink) = self.key_sink() else {
            return Ok(false);
        };
        if !sink.on_test_key_up(context, key, meta)? {
            return Ok(false);
        }
        sink.on_key_up(context, key, meta)
    }

    /// Notify sinks that `doc` gained focus.
    pub fn set_focus(
        &self,
        doc: Option<DocumentMgrId>,
        previous: Option<DocumentMgrId>,
    ) -> Result<()> {
        for sink in self.thread_sinks() {
            sink.on_set_focus(doc, previous)?;
        }
        if let Some(sink) = self.key_sink() {
            sink.on_set_focus(doc.is_some())?;
        }
        Ok(())
    }

    pub fn init_document(&self, doc: DocumentMgrId) -> Result<()> {
        for sink in self.thread_sinks() {
            sink.on_init_document_mgr(doc)?;
        }
        Ok(())
    }

    pub fn uninit_document(&self, doc: DocumentMgrId) -> Result<()> {
        for sink in self.thread_sinks() {
            sink.on_uninit_document_mgr(doc)?;
        }
        Ok(())
    }

    pub fn push_context(&self, context: &Arc<dyn DocumentContext>) -> Result<()> {
        for sink in self.thread_sinks() {
            sink.on_push_context(context)?;
        }
        Ok(())
    }

    pub fn pop_context(&self, context: &Arc<dyn DocumentContext>) -> Result<()> {
        for sink in self.thread_sinks() {
            sink.on_pop_context(context)?;
        }
        Ok(())
    }
}

impl ThreadManager for MemoryThreadManager {
    fn advise_thread_event_sink(&self, sink: Arc<dyn ThreadEventSink>) -> Result<SinkCookie> {
        let mut state = self.state.lock();
        state.fault(HostFault::AdviseThreadSink)?;
        let cookie = state.next_cookie;
        state.next_cookie += 1;
        state.thread_sinks.insert(cookie, sink);
        Ok(SinkCookie(cookie))
    }

    fn unadvise_sink(&self, cookie: SinkCookie) -> Result<()> {
        let mut state = self.state.lock();
        state.fault(HostFault::UnadviseThreadSink)?;
        // Sink is dropped after the lock is released.
        let removed = state.thread_sinks.remove(&cookie.0);
        if removed.is_none() {
            return Err(ServiceError::InvalidArgument("unknown sink cookie"));
        }
        state.unadvised.push(cookie);
        drop(state);
        drop(removed);
        Ok(())
    }

    fn advise_key_event_sink(
        &self,
        client_id: ClientId,
        sink: Arc<dyn KeyEventSink>,
        _foreground: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.fault(HostFault::AdviseKeySink)?;
        if state.key_sink.is_some() {
            return Err(ServiceError::Host("key event sink already advised".into()));
        }
        state.key_sink = Some((client_id, sink));
        Ok(())
    }

    fn unadvise_key_event_sink(&self, client_id: ClientId) -> Result<()> {
        let mut state = self.state.lock();
        state.fault(HostFault::UnadviseKeySink)?;
        let owned = matches!(&state.key_sink, Some((owner, _)) if *owner == client_id);
        if !owned {
            return Err(ServiceError::InvalidArgument("no key sink for client"));
        }
        let removed = state.key_sink.take();
        drop(state);
        drop(removed);
        Ok(())
    }

    fn active_flags(&self) -> Option<HostModeFlags> {
        self.state.lock().flags
    }
}
