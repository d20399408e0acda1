//! Reconciliation of a prior export against edits made in this session.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use vidmark_core::{AnnotationLog, Entry, EntryId, Origin, PriorRow};

use crate::context::SessionContext;
use crate::error::SessionError;
use crate::history::HistoryStack;

/// Origin bookkeeping for audit mode.
///
/// `new_entry_ids` holds entries committed while auditing;
/// `deleted_entry_ids` holds soft-deleted pre-existing entries, which stay in
/// the log with `deleted` set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReconciler {
    active: bool,
    new_entry_ids: BTreeSet<EntryId>,
    deleted_entry_ids: BTreeSet<EntryId>,
}

impl AuditReconciler {
    pub(crate) fn restored(
        active: bool,
        new_entry_ids: impl IntoIterator<Item = EntryId>,
        deleted_entry_ids: impl IntoIterator<Item = EntryId>,
    ) -> Self {
        Self {
            active,
            new_entry_ids: new_entry_ids.into_iter().collect(),
            deleted_entry_ids: deleted_entry_ids.into_iter().collect(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn new_entry_ids(&self) -> &BTreeSet<EntryId> {
        &self.new_entry_ids
    }

    pub fn deleted_entry_ids(&self) -> &BTreeSet<EntryId> {
        &self.deleted_entry_ids
    }

    pub(crate) fn record_new(&mut self, id: EntryId) {
        if self.active {
            self.new_entry_ids.insert(id);
        }
    }

    pub(crate) fn set_ids(&mut self, new: BTreeSet<EntryId>, deleted: BTreeSet<EntryId>) {
        self.new_entry_ids = new;
        self.deleted_entry_ids = deleted;
    }
}

/// Load a prior export into an empty session and switch to audit mode.
///
/// All-or-nothing: a bad row leaves the session untouched. Rows without a
/// derived timestamp get one from the session's start time.
pub fn load_prior(ctx: &mut SessionContext, rows: Vec<PriorRow>) -> Result<usize, SessionError> {
    if !ctx.log.is_empty() {
        return Err(SessionError::PriorAfterEdits);
    }
    let count = rows.len();
    let ids: Vec<EntryId> = ctx.peek_ids(count).collect();
    let mut log = AnnotationLog::new();
    for (id, row) in ids.into_iter().zip(rows) {
        let derived_timestamp = if row.derived_timestamp.is_empty() {
            ctx.derive_timestamp(row.playback_time_seconds)
        } else {
            row.derived_timestamp
        };
        log.push(Entry {
            id,
            playback_time_seconds: row.playback_time_seconds,
            click_x: row.click_x,
            click_y: row.click_y,
            derived_timestamp,
            step_values: row.step_values,
            origin: Origin::PreExisting,
            deleted: false,
        })?;
    }

    ctx.consume_ids(count);
    ctx.log.replace(log.entries().to_vec());
    ctx.audit = AuditReconciler {
        active: true,
        ..Default::default()
    };
    Ok(count)
}

/// Delete an entry. Pre-existing entries are soft-deleted and stay in the
/// log; entries committed this session are removed outright.
pub fn delete_entry(
    ctx: &mut SessionContext,
    history: &mut HistoryStack,
    id: EntryId,
) -> Result<Arc<Entry>, SessionError> {
    let entry = ctx.log.get(id).cloned().ok_or(SessionError::UnknownEntry(id))?;
    if entry.deleted {
        return Err(SessionError::AlreadyDeleted(id));
    }

    history.snapshot(ctx);
    match entry.origin {
        Origin::PreExisting => {
            ctx.log.mark_deleted(id);
            ctx.audit.deleted_entry_ids.insert(id);
        }
        Origin::New => {
            ctx.log.remove(id);
            ctx.audit.new_entry_ids.remove(&id);
        }
    }
    Ok(entry)
}

/// `(PreExisting ∪ New) ∖ deleted`, in log order, each id once.
pub fn export_entries(ctx: &SessionContext) -> Vec<Arc<Entry>> {
    let mut seen = HashSet::new();
    ctx.log
        .iter()
        .filter(|e| !e.deleted && !ctx.audit.deleted_entry_ids.contains(&e.id))
        .filter(|e| seen.insert(e.id))
        .cloned()
        .collect()
}
