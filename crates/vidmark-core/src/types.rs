use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::LogError;

/// Entry identifier, allocated from the session's entry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Answers recorded for one entry, keyed by step id.
pub type StepValues = BTreeMap<String, String>;

/// Where an entry came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Committed during this session.
    #[default]
    New,
    /// Loaded from a prior export (audit mode).
    PreExisting,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::New => write!(f, "new"),
            Origin::PreExisting => write!(f, "pre_existing"),
        }
    }
}

/// A committed annotation: a click on the playback surface plus its answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub playback_time_seconds: f64,
    /// Horizontal click position as a fraction of the surface width.
    pub click_x: f64,
    /// Vertical click position as a fraction of the surface height.
    pub click_y: f64,
    pub derived_timestamp: String,
    #[serde(default)]
    pub step_values: StepValues,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub deleted: bool,
}

/// Committed entries in creation order (not time order).
///
/// Entries are shared copy-on-write records: cloning the log clones pointers,
/// and the only in-place mutation (the `deleted` flag) goes through
/// `Arc::make_mut`, so snapshots taken earlier never observe it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationLog {
    entries: Vec<Arc<Entry>>,
    #[serde(skip)]
    revision: u64,
}

impl PartialEq for AnnotationLog {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl AnnotationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from plain entries, enforcing id uniqueness and valid times.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self, LogError> {
        let mut log = Self::new();
        for entry in entries {
            log.push(entry)?;
        }
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.iter()
    }

    pub fn get(&self, id: EntryId) -> Option<&Arc<Entry>> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    /// Bumped on every mutation. Consumers cache derived indexes against it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether `entry` could be appended without breaking the log invariants.
    pub fn check_insertable(&self, entry: &Entry) -> Result<(), LogError> {
        if !entry.playback_time_seconds.is_finite() || entry.playback_time_seconds < 0.0 {
            return Err(LogError::InvalidTime {
                id: entry.id,
                time: entry.playback_time_seconds,
            });
        }
        if self.contains(entry.id) {
            return Err(LogError::DuplicateId(entry.id));
        }
        Ok(())
    }

    /// Append a committed entry.
    pub fn push(&mut self, entry: Entry) -> Result<Arc<Entry>, LogError> {
        self.check_insertable(&entry)?;
        let entry = Arc::new(entry);
        self.entries.push(Arc::clone(&entry));
        self.revision += 1;
        Ok(entry)
    }

    /// Physically remove an entry. Returns it if it was present.
    pub fn remove(&mut self, id: EntryId) -> Option<Arc<Entry>> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.revision += 1;
        Some(self.entries.remove(pos))
    }

    /// Set the soft-delete flag. Returns false if the entry is absent.
    pub fn mark_deleted(&mut self, id: EntryId) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                Arc::make_mut(entry).deleted = true;
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Replace the whole sequence, e.g. when restoring a snapshot.
    pub fn replace(&mut self, entries: Vec<Arc<Entry>>) {
        self.entries = entries;
        self.revision += 1;
    }

    /// Latest playback time among entries that are not soft-deleted.
    pub fn latest_time(&self) -> Option<f64> {
        self.entries
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.playback_time_seconds)
            .fold(None, |acc, t| Some(acc.map_or(t, |m: f64| m.max(t))))
    }

    /// Highest id present, used to keep the entry counter ahead of resumed logs.
    pub fn max_id(&self) -> Option<EntryId> {
        self.entries.iter().map(|e| e.id).max()
    }

    /// Check the uniqueness invariant over an arbitrary sequence.
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.entries.iter().all(|e| seen.insert(e.id))
    }
}

#[cfg(test)]
pub(crate) fn test_entry(id: u64, time: f64) -> Entry {
    Entry {
        id: EntryId(id),
        playback_time_seconds: time,
        click_x: 0.5,
        click_y: 0.5,
        derived_timestamp: String::new(),
        step_values: StepValues::new(),
        origin: Origin::New,
        deleted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_duplicate_ids() {
        let mut log = AnnotationLog::new();
        log.push(test_entry(1, 2.0)).unwrap();
        let err = log.push(test_entry(1, 3.0)).unwrap_err();
        assert_eq!(err, LogError::DuplicateId(EntryId(1)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn push_rejects_negative_time() {
        let mut log = AnnotationLog::new();
        assert!(log.push(test_entry(1, -0.5)).is_err());
        assert!(log.push(test_entry(2, f64::NAN)).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn latest_time_ignores_deleted() {
        let mut log = AnnotationLog::new();
        log.push(test_entry(1, 5.0)).unwrap();
        log.push(test_entry(2, 30.0)).unwrap();
        assert_eq!(log.latest_time(), Some(30.0));
        log.mark_deleted(EntryId(2));
        assert_eq!(log.latest_time(), Some(5.0));
    }

    #[test]
    fn mark_deleted_does_not_touch_clones() {
        let mut log = AnnotationLog::new();
        log.push(test_entry(1, 5.0)).unwrap();
        let before = log.clone();
        assert!(log.mark_deleted(EntryId(1)));
        assert!(!before.get(EntryId(1)).unwrap().deleted);
        assert!(log.get(EntryId(1)).unwrap().deleted);
    }

    #[test]
    fn revision_moves_on_every_mutation() {
        let mut log = AnnotationLog::new();
        let r0 = log.revision();
        log.push(test_entry(1, 1.0)).unwrap();
        let r1 = log.revision();
        log.remove(EntryId(1));
        let r2 = log.revision();
        log.replace(Vec::new());
        assert!(r0 < r1 && r1 < r2 && r2 < log.revision());
    }

    #[test]
    fn log_serializes_as_plain_array() {
        let mut log = AnnotationLog::new();
        log.push(test_entry(3, 1.5)).unwrap();
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["id"], 3);
        let back: AnnotationLog = serde_json::from_value(json).unwrap();
        assert_eq!(back, log);
    }
}
