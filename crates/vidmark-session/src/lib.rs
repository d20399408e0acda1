pub mod audit;
pub mod clock;
pub mod context;
pub mod draft;
pub mod engine;
pub mod error;
pub mod history;
pub mod indicator;
pub mod recap;

#[cfg(test)]
mod testing;

pub use audit::AuditReconciler;
pub use clock::{InputHub, ListenerId, ListenerRegistry, ManualClock, ManualInput, PlaybackClock, Topic};
pub use context::SessionContext;
pub use draft::{Draft, DraftProgress, EntrySession};
pub use engine::{Click, KeyCommand, SessionEngine};
pub use error::{ErrorKind, Notice, NoticeLevel, SessionError};
pub use history::{HistoryChange, HistoryStack};
pub use indicator::{Indicator, IndicatorColor, IndicatorScheduler, IndicatorState, StateClock};
pub use recap::{RecapController, RecapState, ReviewMode};
