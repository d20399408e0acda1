use thiserror::Error;

use crate::types::EntryId;

/// A questionnaire config that cannot start a session.
///
/// Every variant is detected at load time; a session never starts with a
/// config that would produce one of these mid-session.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid config syntax: {0}")]
    Syntax(String),

    #[error("config schema validation failed: {0}")]
    Schema(String),

    #[error("config name must be kebab-case (lowercase letters, digits, hyphens), got: \"{0}\"")]
    NameNotKebab(String),

    #[error("config must have at least one step")]
    NoSteps,

    #[error("step id must be non-empty and contain no whitespace, got: \"{0}\"")]
    InvalidStepId(String),

    #[error("duplicate step id: \"{0}\"")]
    DuplicateStep(String),

    #[error("choice step \"{0}\" must have at least one choice")]
    NoChoices(String),

    #[error("step \"{step}\" has duplicate choice value \"{value}\"")]
    DuplicateChoice { step: String, value: String },

    #[error("step \"{step}\" has a condition on \"{target}\" which does not exist")]
    UnknownConditionRef { step: String, target: String },

    #[error("step \"{step}\" has a condition on \"{target}\" which is not an earlier step")]
    ForwardConditionRef { step: String, target: String },

    #[error("step \"{step}\" condition operator {operator} needs {needs}")]
    ConditionOperand {
        step: String,
        operator: &'static str,
        needs: &'static str,
    },

    #[error("video_start_time must be HH:MM:SS or HH:MM, got: \"{0}\"")]
    InvalidStartTime(String),

    #[error("setting {name} is out of range: {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

/// A violation of the annotation log invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LogError {
    #[error("duplicate entry id {0}")]
    DuplicateId(EntryId),

    #[error("entry {id} has an invalid playback time {time}")]
    InvalidTime { id: EntryId, time: f64 },
}

/// A saved session that cannot be resumed.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("{set} lists entry {id} which is not in the log")]
    DanglingId { set: &'static str, id: EntryId },

    #[error("playback {field} is invalid: {value}")]
    InvalidPlayback { field: &'static str, value: f64 },
}

/// A prior export that cannot be loaded for audit.
#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("export is missing the \"{0}\" column")]
    MissingColumn(&'static str),

    #[error("row {row}: column \"{column}\" is not a number: \"{value}\"")]
    BadNumber {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}
