//! Contracts for the external playback clock and global input, plus a
//! deterministic in-process clock for replays and tests.

use std::collections::BTreeMap;

/// Handle returned by a subscription; needed to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Notifications the engine listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PositionChanged,
    SeekCompleted,
    Click,
    Key,
}

/// Something the engine can install listeners on.
pub trait ListenerRegistry {
    fn subscribe(&mut self, topic: Topic) -> ListenerId;

    /// Returns false if the id was not registered.
    fn unsubscribe(&mut self, id: ListenerId) -> bool;
}

/// The video player as seen by the engine.
pub trait PlaybackClock: ListenerRegistry {
    /// Current position in seconds.
    fn position(&self) -> f64;
    /// Total duration in seconds.
    fn duration(&self) -> f64;
    fn rate(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn seek(&mut self, seconds: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn set_rate(&mut self, rate: f64);
}

/// Global click and key source.
pub trait InputHub: ListenerRegistry {}

/// Listener bookkeeping shared by the in-process clock and input hub.
#[derive(Debug, Default)]
struct Listeners {
    next: u64,
    active: BTreeMap<ListenerId, Topic>,
}

impl Listeners {
    fn subscribe(&mut self, topic: Topic) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.active.insert(id, topic);
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.active.remove(&id).is_some()
    }

    fn count(&self, topic: Topic) -> usize {
        self.active.values().filter(|t| **t == topic).count()
    }
}

/// Global click/key source with listener bookkeeping only.
#[derive(Debug, Default)]
pub struct ManualInput {
    listeners: Listeners,
}

impl InputHub for ManualInput {}

impl ManualInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.count(topic)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.active.len()
    }
}

impl ListenerRegistry for ManualInput {
    fn subscribe(&mut self, topic: Topic) -> ListenerId {
        self.listeners.subscribe(topic)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// A playback clock advanced explicitly by the caller.
///
/// Seeks land immediately; the completion is queued until the host collects
/// it with [`ManualClock::take_completed_seeks`] and forwards it.
#[derive(Debug)]
pub struct ManualClock {
    position: f64,
    duration: f64,
    rate: f64,
    paused: bool,
    completed_seeks: Vec<f64>,
    listeners: Listeners,
}

impl ManualClock {
    /// Paused at 0 with rate 1.
    pub fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration: duration.max(0.0),
            rate: 1.0,
            paused: true,
            completed_seeks: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
        self.position = self.position.min(self.duration);
    }

    /// Let `wall_seconds` of real time pass. Returns the new position.
    /// Playback stops at the end of the video.
    pub fn advance(&mut self, wall_seconds: f64) -> f64 {
        if !self.paused && wall_seconds > 0.0 {
            self.position = (self.position + wall_seconds * self.rate).min(self.duration);
            if self.position >= self.duration {
                self.paused = true;
            }
        }
        self.position
    }

    /// Drain seek completions in the order they happened.
    pub fn take_completed_seeks(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.completed_seeks)
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.count(topic)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.active.len()
    }
}

impl ListenerRegistry for ManualClock {
    fn subscribe(&mut self, topic: Topic) -> ListenerId {
        self.listeners.subscribe(topic)
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

impl PlaybackClock for ManualClock {
    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn seek(&mut self, seconds: f64) {
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, self.duration)
        } else {
            0.0
        };
        self.position = target;
        self.completed_seeks.push(target);
    }

    fn play(&mut self) {
        if self.position < self.duration {
            self.paused = false;
        }
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn set_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
    }
}
