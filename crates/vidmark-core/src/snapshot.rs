use serde::{Deserialize, Serialize};

use crate::config::parser::validate_config;
use crate::config::schema::{SetupMetadata, WorkflowConfig};
use crate::error::{LogError, SnapshotError};
use crate::export::{ExportFormat, ExportTable};
use crate::types::{AnnotationLog, EntryId};

/// Everything needed to resume a session: the flat file a store persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub config: WorkflowConfig,
    pub setup_metadata: SetupMetadata,
    pub log: AnnotationLog,
    #[serde(default)]
    pub new_entry_ids: Vec<EntryId>,
    #[serde(default)]
    pub deleted_entry_ids: Vec<EntryId>,
    pub playback_position_seconds: f64,
    #[serde(default = "default_rate")]
    pub playback_rate: f64,
    pub entry_counter: u64,
}

fn default_rate() -> f64 {
    1.0
}

impl SessionSnapshot {
    /// Check a loaded snapshot before a session is built from it.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        validate_config(&self.config)?;

        if !self.log.has_unique_ids() {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = self.log.iter().find(|e| !seen.insert(e.id)) {
                return Err(LogError::DuplicateId(dup.id).into());
            }
        }
        if let Some(bad) = self
            .log
            .iter()
            .find(|e| !e.playback_time_seconds.is_finite() || e.playback_time_seconds < 0.0)
        {
            return Err(LogError::InvalidTime {
                id: bad.id,
                time: bad.playback_time_seconds,
            }
            .into());
        }

        for (set, ids) in [
            ("new_entry_ids", &self.new_entry_ids),
            ("deleted_entry_ids", &self.deleted_entry_ids),
        ] {
            if let Some(id) = ids.iter().find(|id| !self.log.contains(**id)) {
                return Err(SnapshotError::DanglingId { set, id: *id });
            }
        }

        let pos = self.playback_position_seconds;
        if !pos.is_finite() || pos < 0.0 {
            return Err(SnapshotError::InvalidPlayback {
                field: "position",
                value: pos,
            });
        }
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(SnapshotError::InvalidPlayback {
                field: "rate",
                value: self.playback_rate,
            });
        }
        Ok(())
    }

    /// Counter value that cannot collide with any id already in the log.
    pub fn safe_counter(&self) -> u64 {
        let floor = self.log.max_id().map_or(0, |id| id.0 + 1);
        self.entry_counter.max(floor)
    }
}

/// Persistence collaborator. Receives plain data only; where and how it is
/// stored is the implementor's business.
pub trait SessionStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()>;

    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> anyhow::Result<Option<SessionSnapshot>>;

    fn export(&self, table: &ExportTable, format: ExportFormat) -> anyhow::Result<String>;
}
