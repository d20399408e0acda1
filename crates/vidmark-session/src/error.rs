use serde::Serialize;
use thiserror::Error;
use vidmark_core::{EntryId, LogError};

/// A rejected operation. The engine never propagates these to the host: each
/// one leaves state untouched and becomes a [`Notice`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("click ignored: playback surface reports {width}x{height}")]
    Coordinate { width: f64, height: f64 },

    #[error("no annotation is being drafted")]
    NoDraft,

    #[error("finish or cancel the current annotation first")]
    DraftOpen,

    #[error("answer is for step \"{got}\" but the current step is \"{expected}\"")]
    NotCurrentStep { expected: String, got: String },

    #[error("\"{value}\" is not a choice of step \"{step}\"")]
    InvalidChoice { step: String, value: String },

    #[error("step \"{step}\" needs a non-empty answer")]
    BlankAnswer { step: String },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("entry {0} is not in the log")]
    UnknownEntry(EntryId),

    #[error("entry {0} is already deleted")]
    AlreadyDeleted(EntryId),

    #[error("a prior export can only be loaded into an empty session")]
    PriorAfterEdits,

    #[error("no recap is running")]
    NoRecap,

    #[error("playback rate must be positive, got {0}")]
    InvalidRate(f64),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Failure families from the error-handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Degenerate playback surface on click.
    Coordinate,
    /// Operation not valid in the current state.
    StateInvariant,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Coordinate { .. } => ErrorKind::Coordinate,
            _ => ErrorKind::StateInvariant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-blocking message for the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for Notice {
    fn from(err: &SessionError) -> Self {
        let level = match err.kind() {
            ErrorKind::Coordinate => NoticeLevel::Error,
            ErrorKind::StateInvariant => NoticeLevel::Warning,
        };
        Notice {
            level,
            message: err.to_string(),
        }
    }
}
