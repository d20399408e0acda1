use std::sync::Arc;

use time::Time;
use vidmark_core::config::{SessionSettings, SetupMetadata};
use vidmark_core::export::build_export_table;
use vidmark_core::timestamp::{derive_timestamp, parse_start_time};
use vidmark_core::{
    validate_config, AnnotationLog, ConfigError, ConfigWorkflow, Entry, EntryId, ExportTable,
    Origin, SessionSnapshot, SnapshotError, WorkflowConfig,
};

use crate::audit::{self, AuditReconciler};

/// The shared mutable state of one annotation session.
///
/// Passed explicitly to every component operation; components keep no
/// reference to it between calls.
#[derive(Debug, Clone)]
pub struct SessionContext {
    config: WorkflowConfig,
    setup: SetupMetadata,
    start_time: Option<Time>,
    pub(crate) log: AnnotationLog,
    pub(crate) audit: AuditReconciler,
    entry_counter: u64,
}

impl SessionContext {
    /// Start a blank session. `setup` overrides the config's setup defaults.
    pub fn new(config: WorkflowConfig, setup: SetupMetadata) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let setup = config.setup.merged(&setup);
        let start_time = resolve_start(&setup)?;
        Ok(Self {
            config,
            setup,
            start_time,
            log: AnnotationLog::new(),
            audit: AuditReconciler::default(),
            entry_counter: 0,
        })
    }

    /// Rebuild a session from a saved snapshot, re-validating everything.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let entry_counter = snapshot.safe_counter();
        let start_time = resolve_start(&snapshot.setup_metadata)?;
        let active = !snapshot.new_entry_ids.is_empty()
            || !snapshot.deleted_entry_ids.is_empty()
            || snapshot.log.iter().any(|e| e.origin == Origin::PreExisting);
        let audit = AuditReconciler::restored(
            active,
            snapshot.new_entry_ids,
            snapshot.deleted_entry_ids,
        );
        Ok(Self {
            config: snapshot.config,
            setup: snapshot.setup_metadata,
            start_time,
            log: snapshot.log,
            audit,
            entry_counter,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn setup(&self) -> &SetupMetadata {
        &self.setup
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.config.settings
    }

    pub fn log(&self) -> &AnnotationLog {
        &self.log
    }

    pub fn audit(&self) -> &AuditReconciler {
        &self.audit
    }

    pub fn entry_counter(&self) -> u64 {
        self.entry_counter
    }

    pub fn workflow(&self) -> ConfigWorkflow<'_> {
        ConfigWorkflow::new(&self.config.steps)
    }

    pub(crate) fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.entry_counter);
        self.entry_counter += 1;
        id
    }

    /// Ids `[counter, counter + n)` without consuming them.
    pub(crate) fn peek_ids(&self, n: usize) -> impl Iterator<Item = EntryId> {
        (self.entry_counter..self.entry_counter + n as u64).map(EntryId)
    }

    pub(crate) fn consume_ids(&mut self, n: usize) {
        self.entry_counter += n as u64;
    }

    pub fn derive_timestamp(&self, playback_seconds: f64) -> String {
        derive_timestamp(self.start_time, playback_seconds)
    }

    /// Entries that belong in an export, in log order.
    pub fn export_entries(&self) -> Vec<Arc<Entry>> {
        audit::export_entries(self)
    }

    pub fn export_table(&self) -> ExportTable {
        let entries = self.export_entries();
        build_export_table(&self.config, &self.setup, entries.iter().map(|e| e.as_ref()))
    }

    pub fn to_snapshot(&self, position: f64, rate: f64) -> SessionSnapshot {
        SessionSnapshot {
            config: self.config.clone(),
            setup_metadata: self.setup.clone(),
            log: self.log.clone(),
            new_entry_ids: self.audit.new_entry_ids().iter().copied().collect(),
            deleted_entry_ids: self.audit.deleted_entry_ids().iter().copied().collect(),
            playback_position_seconds: position,
            playback_rate: rate,
            entry_counter: self.entry_counter,
        }
    }
}

fn resolve_start(setup: &SetupMetadata) -> Result<Option<Time>, ConfigError> {
    match &setup.video_start_time {
        None => Ok(None),
        Some(text) => parse_start_time(text)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidStartTime(text.clone())),
    }
}
