//! Linear undo/redo over the annotation log and the audit id sets.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use vidmark_core::{Entry, EntryId};

use crate::context::SessionContext;
use crate::error::SessionError;

/// State captured immediately before a mutation. Entries are shared, so a
/// capture costs one pointer per entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub log: Vec<Arc<Entry>>,
    pub new_entry_ids: BTreeSet<EntryId>,
    pub deleted_entry_ids: BTreeSet<EntryId>,
}

impl HistorySnapshot {
    pub fn capture(ctx: &SessionContext) -> Self {
        Self {
            log: ctx.log.entries().to_vec(),
            new_entry_ids: ctx.audit.new_entry_ids().clone(),
            deleted_entry_ids: ctx.audit.deleted_entry_ids().clone(),
        }
    }

    fn restore(self, ctx: &mut SessionContext) {
        ctx.log.replace(self.log);
        ctx.audit.set_ids(self.new_entry_ids, self.deleted_entry_ids);
    }
}

/// What an undo or redo did to the log.
#[derive(Debug, Clone, Default)]
pub struct HistoryChange {
    /// Entries present before the step and gone after it.
    pub removed: Vec<Arc<Entry>>,
    /// Entries absent before the step and present after it.
    pub added: Vec<Arc<Entry>>,
    /// Same id on both sides with a different record (the `deleted` flag).
    pub changed: Vec<Arc<Entry>>,
    /// Entry playback should be moved to.
    pub focus: Option<Arc<Entry>>,
}

impl HistoryChange {
    fn between(before: &[Arc<Entry>], after: &[Arc<Entry>]) -> Self {
        let before_ids: HashMap<EntryId, &Arc<Entry>> = before.iter().map(|e| (e.id, e)).collect();
        let after_ids: HashMap<EntryId, &Arc<Entry>> = after.iter().map(|e| (e.id, e)).collect();

        let removed = before
            .iter()
            .filter(|e| !after_ids.contains_key(&e.id))
            .cloned()
            .collect();
        let added = after
            .iter()
            .filter(|e| !before_ids.contains_key(&e.id))
            .cloned()
            .collect();
        let changed = after
            .iter()
            .filter(|new| {
                before_ids
                    .get(&new.id)
                    .is_some_and(|old| !Arc::ptr_eq(*old, *new) && ***old != ***new)
            })
            .cloned()
            .collect();

        Self {
            removed,
            added,
            changed,
            focus: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStack {
    undo: VecDeque<HistorySnapshot>,
    redo: Vec<HistorySnapshot>,
    max_depth: usize,
}

impl HistoryStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record the current state before a mutation. Invalidates redo.
    pub fn snapshot(&mut self, ctx: &SessionContext) {
        self.push_undo(HistorySnapshot::capture(ctx));
        self.redo.clear();
    }

    fn push_undo(&mut self, snapshot: HistorySnapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
    }

    /// Restore the state before the last mutation.
    ///
    /// Focus is the entry most recently removed by the rollback, falling back
    /// to one whose record changed or reappeared.
    pub fn undo(&mut self, ctx: &mut SessionContext) -> Result<HistoryChange, SessionError> {
        let target = self.undo.pop_back().ok_or(SessionError::NothingToUndo)?;
        let current = HistorySnapshot::capture(ctx);
        let mut change = HistoryChange::between(&current.log, &target.log);
        change.focus = change
            .removed
            .last()
            .or(change.changed.last())
            .or(change.added.last())
            .cloned();
        self.redo.push(current);
        target.restore(ctx);
        Ok(change)
    }

    /// Re-apply the last undone mutation. Focus is the entry most recently
    /// re-applied.
    pub fn redo(&mut self, ctx: &mut SessionContext) -> Result<HistoryChange, SessionError> {
        let target = self.redo.pop().ok_or(SessionError::NothingToRedo)?;
        let current = HistorySnapshot::capture(ctx);
        let mut change = HistoryChange::between(&current.log, &target.log);
        change.focus = change
            .added
            .last()
            .or(change.changed.last())
            .or(change.removed.last())
            .cloned();
        self.push_undo(current);
        target.restore(ctx);
        Ok(change)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
