//! Bounded rewind-and-replay up to the latest annotation.

use serde::Serialize;
use vidmark_core::config::RecapSettings;
use vidmark_core::AnnotationLog;

use crate::clock::PlaybackClock;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecapState {
    Inactive,
    /// Replaying toward `end_time`.
    Rewinding { end_time: f64 },
    /// Reached the end; playback is paused until the operator moves on.
    Completed,
}

/// What the indicator scheduler may show on the review axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    Off,
    NoPreview,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecapStart {
    /// Position the clock was asked to seek to.
    pub seek_to: f64,
    pub end_time: f64,
    /// No entries to chase: paused at the seek target.
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecapEvent {
    /// A newer entry pushed the window end out.
    Extended { end_time: f64 },
    Completed { end_time: f64 },
}

#[derive(Debug, Clone)]
pub struct RecapController {
    state: RecapState,
    rewind_seconds: f64,
    pause_lead_seconds: f64,
}

impl RecapController {
    pub fn new(settings: &RecapSettings) -> Self {
        Self {
            state: RecapState::Inactive,
            rewind_seconds: settings.rewind_seconds,
            pause_lead_seconds: settings.pause_lead_seconds,
        }
    }

    pub fn state(&self) -> RecapState {
        self.state
    }

    pub fn end_time(&self) -> Option<f64> {
        match self.state {
            RecapState::Rewinding { end_time } => Some(end_time),
            _ => None,
        }
    }

    pub fn is_window_open(&self) -> bool {
        matches!(self.state, RecapState::Rewinding { .. })
    }

    pub fn review_mode(&self) -> ReviewMode {
        match self.state {
            RecapState::Inactive => ReviewMode::Off,
            RecapState::Rewinding { .. } => ReviewMode::Full,
            RecapState::Completed => ReviewMode::NoPreview,
        }
    }

    /// Rewind from the current position and (re)arm the window.
    ///
    /// A re-arm ends at the current latest entry. An open window keeps its
    /// end only while some entry still reaches it.
    pub fn start(&mut self, log: &AnnotationLog, clock: &mut impl PlaybackClock) -> RecapStart {
        let seek_to = (clock.position() - self.rewind_seconds).max(0.0);
        let latest = match (log.latest_time(), self.end_time()) {
            (Some(l), Some(p)) if l >= p => Some(p),
            (l, _) => l,
        };

        clock.seek(seek_to);
        let start = match latest {
            Some(end_time) => {
                clock.play();
                RecapStart {
                    seek_to,
                    end_time,
                    degenerate: false,
                }
            }
            None => {
                clock.pause();
                RecapStart {
                    seek_to,
                    end_time: seek_to,
                    degenerate: true,
                }
            }
        };
        self.state = RecapState::Rewinding {
            end_time: start.end_time,
        };
        start
    }

    /// Chase newer entries and stop at the window end.
    pub fn on_tick(
        &mut self,
        log: &AnnotationLog,
        position: f64,
        clock: &mut impl PlaybackClock,
    ) -> Option<RecapEvent> {
        let RecapState::Rewinding { end_time } = self.state else {
            return None;
        };

        let mut event = None;
        let mut end_time = end_time;
        if let Some(latest) = log.latest_time() {
            if latest > end_time {
                end_time = latest;
                event = Some(RecapEvent::Extended { end_time });
            }
        }
        self.state = RecapState::Rewinding { end_time };

        if position >= end_time - self.pause_lead_seconds {
            clock.pause();
            self.state = RecapState::Completed;
            return Some(RecapEvent::Completed { end_time });
        }
        event
    }

    /// Leave recap and resume normal playback. Returns the state that was
    /// left, or `None` if no recap was running.
    pub fn exit(&mut self, clock: &mut impl PlaybackClock) -> Option<RecapState> {
        let left = self.state;
        if left == RecapState::Inactive {
            return None;
        }
        self.state = RecapState::Inactive;
        clock.play();
        Some(left)
    }

    /// A seek the operator made. Landing past the window abandons it.
    pub fn on_user_seek(&mut self, position: f64) -> bool {
        match self.state {
            RecapState::Rewinding { end_time } if position > end_time + self.pause_lead_seconds => {
                self.state = RecapState::Inactive;
                true
            }
            _ => false,
        }
    }
}
