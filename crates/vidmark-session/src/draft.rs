//! The in-progress annotation and its walk through the questionnaire.

use std::sync::Arc;
use std::time::Duration;

use vidmark_core::config::schema::normalize_value;
use vidmark_core::config::StepKind;
use vidmark_core::{Entry, EntryId, Origin, StepValues};

use crate::context::SessionContext;
use crate::error::SessionError;
use crate::history::HistoryStack;
use crate::indicator::{IndicatorScheduler, Placement};

/// An uncommitted entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub id: EntryId,
    pub playback_time_seconds: f64,
    pub click_x: f64,
    pub click_y: f64,
    pub values: StepValues,
    /// Index of the step being asked.
    pub step_index: usize,
}

impl Draft {
    fn placement(&self) -> Placement {
        Placement {
            playback_time_seconds: self.playback_time_seconds,
            x: self.click_x,
            y: self.click_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftProgress {
    /// Waiting for an answer to this step.
    Asking { step_index: usize },
    Committed(Arc<Entry>),
    /// The click was withdrawn; nothing reached the log.
    Cancelled(EntryId),
}

/// Collaborators a draft operation may touch besides the context.
pub struct DraftDeps<'a> {
    pub history: &'a mut HistoryStack,
    pub indicators: &'a mut IndicatorScheduler,
    pub wall: Duration,
}

/// Owner of the single open draft, if any.
#[derive(Debug, Clone, Default)]
pub struct EntrySession {
    draft: Option<Draft>,
}

impl EntrySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn is_drafting(&self) -> bool {
        self.draft.is_some()
    }

    /// Open a draft for a click. A silent no-op (`Ok(None)`) while another
    /// draft is open.
    pub fn start_draft(
        &mut self,
        ctx: &mut SessionContext,
        deps: DraftDeps<'_>,
        playback_time_seconds: f64,
        click_x: f64,
        click_y: f64,
    ) -> Result<Option<DraftProgress>, SessionError> {
        if self.draft.is_some() {
            return Ok(None);
        }
        let values = StepValues::new();
        let first = ctx.workflow().first_step(&values);
        let draft = Draft {
            id: ctx.allocate_id(),
            playback_time_seconds,
            click_x,
            click_y,
            values,
            step_index: first.unwrap_or(0),
        };
        deps.indicators
            .set_waiting(draft.id, draft.placement(), deps.wall);
        tracing::debug!(id = %draft.id, time = playback_time_seconds, "draft opened");
        self.draft = Some(draft);

        match first {
            Some(step_index) => Ok(Some(DraftProgress::Asking { step_index })),
            None => self.commit(ctx, deps).map(|e| Some(DraftProgress::Committed(e))),
        }
    }

    /// Record an answer for the current step and advance.
    pub fn answer(
        &mut self,
        ctx: &mut SessionContext,
        deps: DraftDeps<'_>,
        step_id: &str,
        value: &str,
    ) -> Result<DraftProgress, SessionError> {
        let draft = self.draft.as_mut().ok_or(SessionError::NoDraft)?;
        let workflow = ctx.workflow();
        let step = workflow
            .step(draft.step_index)
            .ok_or(SessionError::NoDraft)?;
        if step.id != step_id {
            return Err(SessionError::NotCurrentStep {
                expected: step.id.clone(),
                got: step_id.to_string(),
            });
        }

        let value = normalize_value(value);
        match step.kind {
            StepKind::Choice if !step.has_choice(&value) => {
                return Err(SessionError::InvalidChoice {
                    step: step.id.clone(),
                    value,
                });
            }
            StepKind::Text if step.required && value.is_empty() => {
                return Err(SessionError::BlankAnswer {
                    step: step.id.clone(),
                });
            }
            _ => {}
        }

        if value.is_empty() {
            draft.values.remove(&step.id);
        } else {
            draft.values.insert(step.id.clone(), value);
        }
        let next = workflow.next_valid_step(draft.step_index + 1, &draft.values);

        match next {
            Some(step_index) => {
                draft.step_index = step_index;
                Ok(DraftProgress::Asking { step_index })
            }
            None => self.commit(ctx, deps).map(DraftProgress::Committed),
        }
    }

    /// Step back to the previous qualifying step, or withdraw the click when
    /// there is none.
    ///
    /// Clears the answer for the step being left and for the step re-entered,
    /// then drops later answers the rollback invalidated.
    pub fn go_back(
        &mut self,
        ctx: &SessionContext,
        indicators: &mut IndicatorScheduler,
    ) -> Result<DraftProgress, SessionError> {
        let draft = self.draft.as_mut().ok_or(SessionError::NoDraft)?;
        let workflow = ctx.workflow();
        let current = draft.step_index;
        if let Some(step) = workflow.step(current) {
            draft.values.remove(&step.id);
        }

        let previous = current
            .checked_sub(1)
            .and_then(|from| workflow.prev_valid_step(from, &draft.values));
        match previous {
            Some(index) => {
                if let Some(step) = workflow.step(index) {
                    draft.values.remove(&step.id);
                }
                let purged = workflow.purge_invalidated(index, &mut draft.values);
                if !purged.is_empty() {
                    tracing::debug!(?purged, "answers invalidated by going back");
                }
                draft.step_index = index;
                Ok(DraftProgress::Asking { step_index: index })
            }
            None => {
                let id = draft.id;
                self.draft = None;
                indicators.remove(id);
                tracing::debug!(%id, "draft cancelled");
                Ok(DraftProgress::Cancelled(id))
            }
        }
    }

    /// Commit the open draft as it stands.
    ///
    /// The history snapshot is taken before the log changes, and only once
    /// the entry is known to be insertable.
    pub fn commit(
        &mut self,
        ctx: &mut SessionContext,
        deps: DraftDeps<'_>,
    ) -> Result<Arc<Entry>, SessionError> {
        let draft = self.draft.as_ref().ok_or(SessionError::NoDraft)?;
        let mut entry = Entry {
            id: draft.id,
            playback_time_seconds: draft.playback_time_seconds,
            click_x: draft.click_x,
            click_y: draft.click_y,
            derived_timestamp: String::new(),
            step_values: draft.values.clone(),
            origin: Origin::New,
            deleted: false,
        };
        ctx.log.check_insertable(&entry)?;
        entry.derived_timestamp = ctx.derive_timestamp(entry.playback_time_seconds);
        let placement = draft.placement();

        deps.history.snapshot(ctx);
        let entry = ctx.log.push(entry)?;
        ctx.audit.record_new(entry.id);
        deps.indicators.finalize(entry.id, placement, deps.wall);
        self.draft = None;
        tracing::debug!(id = %entry.id, ts = %entry.derived_timestamp, "entry committed");
        Ok(entry)
    }
}
