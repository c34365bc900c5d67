//! Key interception: the probe/commit decision protocol.
//!
//! The host first asks `test_key_down` whether a key would be eaten, then
//! calls `key_down` to actually handle it. Only `key_down` submits work, and
//! it only *submits*: the insertion itself runs later on the host's edit
//! scheduler. Every failure on this path degrades to "not eaten" so the
//! host's own handling of the key still happens.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::activation::SessionView;
use crate::error::{Result, ServiceError};
use crate::host::{DocumentContext, EditMode};
use crate::insertion::{Completion, InsertionOutcome, InsertionUnit};
use crate::key_event::{KeyMetadata, PreservedKeyId};
use crate::keymap::{KeyCode, KeyMapper};
use crate::ServiceConfig;

/// Decides which keys are eaten and submits insertions for them.
pub struct KeyInterceptor {
    mapper: Arc<dyn KeyMapper>,
    edit_mode: EditMode,
    log_key_details: bool,
    next_sequence: AtomicU64,
    accepted: AtomicU64,
    in_flight: Mutex<VecDeque<Completion>>,
    last_error: Mutex<Option<ServiceError>>,
}

impl KeyInterceptor {
    pub fn new(mapper: Arc<dyn KeyMapper>, config: &ServiceConfig) -> Self {
        Self {
            mapper,
            edit_mode: config.edit_mode,
            log_key_details: config.log_key_details,
            next_sequence: AtomicU64::new(1),
            accepted: AtomicU64::new(0),
            in_flight: Mutex::new(VecDeque::new()),
            last_error: Mutex::new(None),
        }
    }

    pub fn mapper(&self) -> &Arc<dyn KeyMapper> {
        &self.mapper
    }

    pub fn edit_mode(&self) -> EditMode {
        self.edit_mode
    }

    /// Number of insertions the host has accepted so far.
    pub fn submitted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Probe: would `key_down` eat this key? Never has side effects.
    pub fn test_key_down(
        &self,
        session: SessionView,
        _context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        _meta: KeyMetadata,
    ) -> bool {
        session.active && session.enabled && self.mapper.is_mapped(key)
    }

    /// Commit: insert the mapped character for `key`, if any.
    ///
    /// Returns true only when the insertion was accepted by the host.
    pub fn key_down(
        &self,
        session: SessionView,
        context: Option<&Arc<dyn DocumentContext>>,
        key: KeyCode,
        meta: KeyMetadata,
    ) -> bool {
        self.reap_completions();

        let Some(context) = context else {
            tracing::debug!(?key, "key down without a document context");
            return false;
        };
        if !session.active || !session.enabled {
            return false;
        }
        if self.log_key_details {
            tracing::trace!(?key, ?meta, client_id = ?session.client_id, "key down");
        }

        let Some(ch) = self.mapper.map(key) else {
            tracing::trace!(?key, "no mapping, passing key through");
            return false;
        };
        tracing::debug!(?key, mapped = %ch, code_point = ch as u32, "mapped key");

        let mut buf = [0u8; 4];
        match self.submit_insertion(session, context, ch.encode_utf8(&mut buf)) {
            Ok(completion) => {
                tracing::trace!(sequence = completion.sequence(), "insertion submitted");
                true
            }
            Err(err) => {
                tracing::warn!(?key, error = %err, "insertion submission failed, key not eaten");
                *self.last_error.lock() = Some(err);
                false
            }
        }
    }

    pub fn test_key_up(
        &self,
        _context: Option<&Arc<dyn DocumentContext>>,
        _key: KeyCode,
        _meta: KeyMetadata,
    ) -> bool {
        false
    }

    pub fn key_up(
        &self,
        _context: Option<&Arc<dyn DocumentContext>>,
        _key: KeyCode,
        _meta: KeyMetadata,
    ) -> bool {
        false
    }

    pub fn preserved_key(
        &self,
        _context: Option<&Arc<dyn DocumentContext>>,
        key: PreservedKeyId,
    ) -> bool {
        tracing::trace!(?key, "preserved key ignored");
        false
    }

    /// Build an insertion unit for `text` and hand it to the host.
    ///
    /// The returned completion resolves once the host runs (or drops) the
    /// unit; this call never waits for that.
    pub fn submit_insertion(
        &self,
        session: SessionView,
        context: &Arc<dyn DocumentContext>,
        text: &str,
    ) -> Result<Completion> {
        if session.client_id.is_null() {
            return Err(ServiceError::InvalidArgument("client id"));
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let (unit, completion) = InsertionUnit::new(sequence, Arc::clone(context), text)?;
        context.request_edit_session(session.client_id, Box::new(unit), self.edit_mode)?;
        self.accepted.fetch_add(1, Ordering::SeqCst);
        self.in_flight.lock().push_back(completion.clone());
        Ok(completion)
    }

    /// Completions of submitted units that have not been reaped yet.
    pub fn in_flight(&self) -> Vec<Completion> {
        self.in_flight.lock().iter().cloned().collect()
    }

    /// Drop resolved completions, logging units that did not complete.
    /// Returns the reaped `(sequence, outcome)` pairs in submission order.
    pub fn reap_completions(&self) -> Vec<(u64, InsertionOutcome)> {
        let mut in_flight = self.in_flight.lock();
        let mut reaped = Vec::new();
        in_flight.retain(|completion| match completion.outcome() {
            Some(outcome) => {
                match &outcome {
                    InsertionOutcome::Failed {
                        step,
                        error,
                        text_inserted,
                    } => tracing::warn!(
                        sequence = completion.sequence(),
                        ?step,
                        text_inserted,
                        error = %error,
                        "earlier insertion failed"
                    ),
                    InsertionOutcome::Discarded => tracing::debug!(
                        sequence = completion.sequence(),
                        "earlier insertion was discarded"
                    ),
                    InsertionOutcome::Completed { .. } => {}
                }
                reaped.push((completion.sequence(), outcome));
                false
            }
            None => true,
        });
        reaped
    }

    /// Take the most recent submission error, if any.
    pub fn take_last_error(&self) -> Option<ServiceError> {
        self.last_error.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClientId, DocumentMgrId};
    use crate::insertion::UnitState;
    use crate::keymap::KeyTable;
    use crate::memory::{EditQueue, MemoryDocument};

    static TABLE: KeyTable = KeyTable::new(
        "test",
        &[(KeyCode(0x41), '\u{0B85}'), (KeyCode(0x51), '\u{0B95}')],
    );

    const ACTIVE: SessionView = SessionView {
        active: true,
        enabled: true,
        client_id: ClientId(7),
    };

    fn interceptor() -> KeyInterceptor {
        KeyInterceptor::new(Arc::new(TABLE), &ServiceConfig::default())
    }

    fn document() -> (Arc<EditQueue>, Arc<dyn DocumentContext>) {
        let queue = EditQueue::new();
        let doc: Arc<dyn DocumentContext> =
            MemoryDocument::new(DocumentMgrId(1), Arc::clone(&queue));
        (queue, doc)
    }

    #[test]
    fn test_probe_has_no_side_effects() {
        let ki = interceptor();
        let (queue, doc) = document();
        assert!(ki.test_key_down(ACTIVE, Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        assert!(!ki.test_key_down(ACTIVE, Some(&doc), KeyCode(0x5A), KeyMetadata::default()));
        assert_eq!(queue.accepted(), 0);
        assert_eq!(ki.submitted(), 0);
    }

    #[test]
    fn test_disabled_or_inactive_never_eats() {
        let ki = interceptor();
        let (queue, doc) = document();
        let disabled = SessionView { enabled: false, ..ACTIVE };
        let inactive = SessionView { active: false, ..ACTIVE };
        for session in [disabled, inactive] {
            assert!(!ki.test_key_down(session, Some(&doc), KeyCode(0x41), KeyMetadata::default()));
            assert!(!ki.key_down(session, Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        }
        assert_eq!(queue.accepted(), 0);
    }

    #[test]
    fn test_missing_context_fails_open() {
        let ki = interceptor();
        assert!(!ki.key_down(ACTIVE, None, KeyCode(0x41), KeyMetadata::default()));
        assert_eq!(ki.submitted(), 0);
        assert!(ki.take_last_error().is_none());
    }

    #[test]
    fn test_key_down_submits_one_unit() {
        let ki = interceptor();
        let (queue, doc) = document();
        assert!(ki.key_down(ACTIVE, Some(&doc), KeyCode(0x51), KeyMetadata::press(0x10)));
        assert_eq!(queue.pending(), 1);

        let in_flight = ki.in_flight();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].state(), UnitState::Queued);

        queue.run_pending();
        let reaped = ki.reap_completions();
        assert_eq!(reaped, vec![(1, InsertionOutcome::Completed { caret: 1 })]);
        assert!(ki.in_flight().is_empty());
    }

    #[test]
    fn test_submission_failure_is_not_eaten() {
        let ki = interceptor();
        let (queue, doc) = document();
        queue.reject_next(1);
        assert!(!ki.key_down(ACTIVE, Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        assert_eq!(ki.take_last_error(), Some(ServiceError::OutOfMemory));
        assert_eq!(ki.submitted(), 0);
        assert!(ki.in_flight().is_empty());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_key_up_and_preserved_keys_pass_through() {
        let ki = interceptor();
        let (_, doc) = document();
        assert!(!ki.test_key_up(Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        assert!(!ki.key_up(Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        assert!(!ki.preserved_key(Some(&doc), PreservedKeyId(uuid::Uuid::nil())));
    }

    #[test]
    fn test_discarded_units_are_reaped() {
        let ki = interceptor();
        let (queue, doc) = document();
        assert!(ki.key_down(ACTIVE, Some(&doc), KeyCode(0x41), KeyMetadata::default()));
        queue.discard_pending();
        assert_eq!(ki.reap_completions(), vec![(1, InsertionOutcome::Discarded)]);
    }
}
