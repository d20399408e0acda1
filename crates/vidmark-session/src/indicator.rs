//! Per-entry visual state derived from two time axes.
//!
//! Creation states (`Waiting`, `Finalized`, `Undo`) are explicit marks keyed on
//! wall-clock time. Review states (`Preview`, `Active`, `Shown`) are never
//! stored: each tick recomputes them from `now - entry.time`, so a tick is
//! idempotent and there are no timers to cancel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use vidmark_core::config::IndicatorSettings;
use vidmark_core::{AnnotationLog, Entry, EntryId};

use crate::recap::ReviewMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorState {
    Waiting,
    Finalized,
    Undo,
    Preview,
    Active,
    Shown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorColor {
    Green,
    Red,
    Orange,
}

impl IndicatorState {
    pub fn color(self) -> IndicatorColor {
        match self {
            IndicatorState::Waiting | IndicatorState::Active => IndicatorColor::Green,
            IndicatorState::Finalized | IndicatorState::Shown => IndicatorColor::Red,
            IndicatorState::Undo | IndicatorState::Preview => IndicatorColor::Orange,
        }
    }

    pub fn is_review(self) -> bool {
        matches!(
            self,
            IndicatorState::Preview | IndicatorState::Active | IndicatorState::Shown
        )
    }
}

/// When a state was entered, on the axis that drives it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "axis", content = "seconds", rename_all = "snake_case")]
pub enum StateClock {
    Wall(f64),
    Playback(f64),
}

/// Where an indicator is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub playback_time_seconds: f64,
    pub x: f64,
    pub y: f64,
}

impl Placement {
    pub fn of(entry: &Entry) -> Self {
        Self {
            playback_time_seconds: entry.playback_time_seconds,
            x: entry.click_x,
            y: entry.click_y,
        }
    }
}

/// One rendered dot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub entry_id: EntryId,
    pub state: IndicatorState,
    pub color: IndicatorColor,
    pub since: StateClock,
    pub playback_time_seconds: f64,
    pub x: f64,
    pub y: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    state: IndicatorState,
    since: Duration,
    at: Placement,
}

#[derive(Debug, Clone)]
pub struct IndicatorScheduler {
    settings: IndicatorSettings,
    marks: BTreeMap<EntryId, Mark>,
    index: Vec<Arc<Entry>>,
    indexed_revision: Option<u64>,
}

impl IndicatorScheduler {
    pub fn new(settings: IndicatorSettings) -> Self {
        Self {
            settings,
            marks: BTreeMap::new(),
            index: Vec::new(),
            indexed_revision: None,
        }
    }

    /// Requesting the state an entry already holds keeps its original
    /// timestamp.
    fn mark(&mut self, id: EntryId, state: IndicatorState, at: Placement, wall: Duration) {
        match self.marks.get_mut(&id) {
            Some(mark) if mark.state == state => mark.at = at,
            _ => {
                self.marks.insert(
                    id,
                    Mark {
                        state,
                        since: wall,
                        at,
                    },
                );
            }
        }
    }

    pub fn set_waiting(&mut self, id: EntryId, at: Placement, wall: Duration) {
        self.mark(id, IndicatorState::Waiting, at, wall);
    }

    pub fn finalize(&mut self, id: EntryId, at: Placement, wall: Duration) {
        self.mark(id, IndicatorState::Finalized, at, wall);
    }

    pub fn mark_undo(&mut self, id: EntryId, at: Placement, wall: Duration) {
        self.mark(id, IndicatorState::Undo, at, wall);
    }

    /// Drop every pending `Undo` mark. Returns how many were cleared.
    pub fn clear_undo_all(&mut self) -> usize {
        let before = self.marks.len();
        self.marks.retain(|_, m| m.state != IndicatorState::Undo);
        before - self.marks.len()
    }

    pub fn clear_undo(&mut self, id: EntryId) -> bool {
        if self
            .marks
            .get(&id)
            .is_some_and(|m| m.state == IndicatorState::Undo)
        {
            self.marks.remove(&id);
            return true;
        }
        false
    }

    pub fn remove(&mut self, id: EntryId) -> bool {
        self.marks.remove(&id).is_some()
    }

    pub fn mark_state(&self, id: EntryId) -> Option<IndicatorState> {
        self.marks.get(&id).map(|m| m.state)
    }

    /// Derive every visible indicator at (`wall`, `position`).
    ///
    /// Expired `Finalized` marks are dropped. Review states are computed only
    /// for live entries inside the scan window, and never for an entry that
    /// holds a creation mark.
    pub fn tick(
        &mut self,
        log: &AnnotationLog,
        wall: Duration,
        position: f64,
        mode: ReviewMode,
    ) -> Vec<Indicator> {
        let finalize = self.settings.finalize_seconds;
        self.marks.retain(|_, m| {
            m.state != IndicatorState::Finalized
                || wall.saturating_sub(m.since).as_secs_f64() < finalize
        });

        let mut out: Vec<Indicator> = self
            .marks
            .iter()
            .map(|(id, m)| Indicator {
                entry_id: *id,
                state: m.state,
                color: m.state.color(),
                since: StateClock::Wall(m.since.as_secs_f64()),
                playback_time_seconds: m.at.playback_time_seconds,
                x: m.at.x,
                y: m.at.y,
                opacity: self.mark_opacity(m, wall),
            })
            .collect();

        if mode != ReviewMode::Off {
            self.refresh_index(log);
            let s = &self.settings;
            let lo = position - s.flash_seconds - s.decay_seconds;
            let hi = position + s.preview_lead_seconds;
            let start = self.index.partition_point(|e| e.playback_time_seconds < lo);
            for entry in self.index[start..]
                .iter()
                .take_while(|e| e.playback_time_seconds <= hi)
            {
                if entry.deleted || self.marks.contains_key(&entry.id) {
                    continue;
                }
                if let Some(ind) = review_indicator(s, entry, position, mode) {
                    out.push(ind);
                }
            }
        }

        out.sort_by_key(|i| i.entry_id);
        out
    }

    fn mark_opacity(&self, mark: &Mark, wall: Duration) -> f64 {
        if mark.state != IndicatorState::Finalized {
            return 1.0;
        }
        let total = self.settings.finalize_seconds;
        let fade = total * self.settings.fade_fraction;
        let remaining = total - wall.saturating_sub(mark.since).as_secs_f64();
        if fade <= 0.0 || remaining >= fade {
            1.0
        } else {
            (remaining / fade).clamp(0.0, 1.0)
        }
    }

    fn refresh_index(&mut self, log: &AnnotationLog) {
        if self.indexed_revision == Some(log.revision()) {
            return;
        }
        let mut index = log.entries().to_vec();
        index.sort_by(|a, b| a.playback_time_seconds.total_cmp(&b.playback_time_seconds));
        self.index = index;
        self.indexed_revision = Some(log.revision());
    }
}

fn review_indicator(
    s: &IndicatorSettings,
    entry: &Entry,
    now: f64,
    mode: ReviewMode,
) -> Option<Indicator> {
    let t = entry.playback_time_seconds;
    let delta = now - t;
    let lead = s.preview_lead_seconds;
    let flash = s.flash_seconds;
    let decay = s.decay_seconds;

    let (state, since, opacity) = if delta < -lead {
        return None;
    } else if delta < 0.0 {
        if mode != ReviewMode::Full {
            return None;
        }
        (IndicatorState::Preview, t - lead, (delta + lead) / lead)
    } else if delta < flash {
        (IndicatorState::Active, t, 1.0)
    } else if delta < flash + decay {
        (IndicatorState::Shown, t + flash, 1.0 - (delta - flash) / decay)
    } else {
        return None;
    };

    Some(Indicator {
        entry_id: entry.id,
        state,
        color: state.color(),
        since: StateClock::Playback(since),
        playback_time_seconds: t,
        x: entry.click_x,
        y: entry.click_y,
        opacity: opacity.clamp(0.0, 1.0),
    })
}
