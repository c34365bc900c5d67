//! Insertion units: one pending "type this text at the caret" mutation.
//!
//! A unit is built on the key path, handed to the host through
//! [`DocumentContext::request_edit_session`], and run whenever the host's
//! scheduler gets to it. The unit holds its own `Arc` to the document, so a
//! context torn down while the unit is queued stays valid long enough for the
//! unit to run or fail cleanly.
//!
//! Progress is shared with a [`Completion`] handle so the submitter can see
//! when (and how) the unit finished.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::host::{Anchor, DocumentContext, EditCookie, EditSession, Selection};

/// Lifecycle of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Queued,
    Executing,
    Completed,
    Failed,
}

/// Steps of the insertion protocol, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionStep {
    ObtainInsertion,
    QuerySelection,
    CollapseToStart,
    WriteText,
    ExtendEnd,
    CollapseToEnd,
    CommitSelection,
}

/// Final result of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionOutcome {
    /// Text written, caret left at `caret` (just after the text).
    Completed { caret: usize },
    /// A step failed. `text_inserted` is set when the text had already
    /// landed; it is left in place.
    Failed {
        step: InsertionStep,
        error: ServiceError,
        text_inserted: bool,
    },
    /// Dropped by the host without ever running.
    Discarded,
}

impl InsertionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug)]
struct Progress {
    state: UnitState,
    outcome: Option<InsertionOutcome>,
}

/// Observer side of a submitted unit.
#[derive(Debug, Clone)]
pub struct Completion {
    sequence: u64,
    progress: Arc<Mutex<Progress>>,
}

impl Completion {
    /// Submission order of the unit within its service.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> UnitState {
        self.progress.lock().state
    }

    /// Outcome, once the unit has run or been dropped.
    pub fn outcome(&self) -> Option<InsertionOutcome> {
        self.progress.lock().outcome.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.progress.lock().outcome.is_some()
    }
}

struct StepFailure {
    step: InsertionStep,
    error: ServiceError,
    text_inserted: bool,
}

trait StepExt<T> {
    fn at(self, step: InsertionStep, text_inserted: bool) -> std::result::Result<T, StepFailure>;
}

impl<T> StepExt<T> for Result<T> {
    fn at(self, step: InsertionStep, text_inserted: bool) -> std::result::Result<T, StepFailure> {
        self.map_err(|error| StepFailure {
            step,
            error,
            text_inserted,
        })
    }
}

/// Pending insertion of `text` at the caret of `context`.
pub struct InsertionUnit {
    sequence: u64,
    text: String,
    len: usize,
    context: Arc<dyn DocumentContext>,
    progress: Arc<Mutex<Progress>>,
}

impl InsertionUnit {
    /// Build a unit and its completion handle. Empty text is rejected.
    pub fn new(
        sequence: u64,
        context: Arc<dyn DocumentContext>,
        text: &str,
    ) -> Result<(Self, Completion)> {
        if text.is_empty() {
            return Err(ServiceError::InvalidArgument("insertion text is empty"));
        }
        let progress = Arc::new(Mutex::new(Progress {
            state: UnitState::Created,
            outcome: None,
        }));
        let unit = Self {
            sequence,
            text: text.to_owned(),
            len: text.chars().count(),
            context,
            progress: Arc::clone(&progress),
        };
        Ok((unit, Completion { sequence, progress }))
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn state(&self) -> UnitState {
        self.progress.lock().state
    }

    /// Run the insertion protocol with the given edit cookie.
    ///
    /// Returns the caret position after the inserted text. On failure the
    /// steps that already ran are not undone.
    pub fn execute(&mut self, ec: EditCookie) -> Result<usize> {
        self.progress.lock().state = UnitState::Executing;
        tracing::trace!(sequence = self.sequence, len = self.len, "insertion unit executing");

        let result = self.run_protocol(ec);
        let mut progress = self.progress.lock();
        match result {
            Ok(caret) => {
                tracing::debug!(sequence = self.sequence, caret, "insertion completed");
                progress.state = UnitState::Completed;
                progress.outcome = Some(InsertionOutcome::Completed { caret });
                Ok(caret)
            }
            Err(failure) => {
                tracing::warn!(
                    sequence = self.sequence,
                    step = ?failure.step,
                    text_inserted = failure.text_inserted,
                    error = %failure.error,
                    "insertion failed"
                );
                progress.state = UnitState::Failed;
                progress.outcome = Some(InsertionOutcome::Failed {
                    step: failure.step,
                    error: failure.error.clone(),
                    text_inserted: failure.text_inserted,
                });
                Err(failure.error)
            }
        }
    }

    fn run_protocol(&self, ec: EditCookie) -> std::result::Result<usize, StepFailure> {
        let insert = self
            .context
            .insert_at_selection()
            .ok_or_else(|| ServiceError::unavailable("insert-at-selection"))
            .at(InsertionStep::ObtainInsertion, false)?;

        let mut range = insert
            .query_selection(ec)
            .at(InsertionStep::QuerySelection, false)?;

        range
            .collapse(ec, Anchor::Start)
            .at(InsertionStep::CollapseToStart, false)?;
        range
            .set_text(ec, &self.text)
            .at(InsertionStep::WriteText, false)?;

        let moved = range
            .shift_end(ec, self.len as isize)
            .at(InsertionStep::ExtendEnd, true)?;
        if moved != self.len as isize {
            tracing::trace!(sequence = self.sequence, moved, expected = self.len, "end anchor clamped");
        }

        // Caret trails the inserted text.
        range
            .collapse(ec, Anchor::End)
            .at(InsertionStep::CollapseToEnd, true)?;
        self.context
            .set_selection(ec, &Selection::new(range.as_ref(), Anchor::End))
            .at(InsertionStep::CommitSelection, true)?;

        Ok(range.span().1)
    }
}

impl EditSession for InsertionUnit {
    fn on_queued(&mut self) {
        let mut progress = self.progress.lock();
        if progress.state == UnitState::Created {
            progress.state = UnitState::Queued;
        }
    }

    fn do_edit_session(mut self: Box<Self>, ec: EditCookie) -> Result<()> {
        self.execute(ec).map(|_| ())
    }
}

impl Drop for InsertionUnit {
    fn drop(&mut self) {
        let mut progress = self.progress.lock();
        if progress.outcome.is_none() {
            tracing::debug!(sequence = self.sequence, "insertion unit discarded without running");
            progress.outcome = Some(InsertionOutcome::Discarded);
        }
    }
}

impl std::fmt::Debug for InsertionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertionUnit")
            .field("sequence", &self.sequence)
            .field("text", &self.text)
            .field("len", &self.len)
            .field("state", &self.state())
            .finish()
    }
}
