//! The event dispatcher: owns the session state, the components and the
//! playback clock, and routes every external event to them.
//!
//! Handlers never return errors. A rejected operation leaves state unchanged,
//! logs a warning and queues a [`Notice`] for the host to drain.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};
use vidmark_core::config::SetupMetadata;
use vidmark_core::timestamp::PLAYBACK_ORIGIN_SECONDS;
use vidmark_core::{
    ConfigError, Entry, EntryId, ExportTable, PriorRow, SessionSnapshot, SessionStore,
    SnapshotError, WorkflowConfig,
};

use crate::audit;
use crate::clock::{InputHub, ListenerId, PlaybackClock, Topic};
use crate::context::SessionContext;
use crate::draft::{Draft, DraftDeps, DraftProgress, EntrySession};
use crate::error::{Notice, SessionError};
use crate::history::{HistoryChange, HistoryStack};
use crate::indicator::{Indicator, IndicatorScheduler, Placement};
use crate::recap::{RecapController, RecapEvent, RecapStart, RecapState, ReviewMode};

/// Tolerance when matching a seek completion to a seek the engine issued.
const SEEK_MATCH_EPSILON: f64 = 1e-6;

/// Engine seeks awaiting completion; older ones are dropped past this.
const MAX_PENDING_SEEKS: usize = 8;

/// A click on the playback surface, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Click {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Click {
    /// Click position as fractions of the surface, clamped to `0..=1`.
    pub fn fractions(&self) -> Result<(f64, f64), SessionError> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if !usable(self.width) || !usable(self.height) || !self.x.is_finite() || !self.y.is_finite()
        {
            return Err(SessionError::Coordinate {
                width: self.width,
                height: self.height,
            });
        }
        Ok((
            (self.x / self.width).clamp(0.0, 1.0),
            (self.y / self.height).clamp(0.0, 1.0),
        ))
    }
}

/// Keyboard shortcuts the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCommand {
    TogglePlayback,
    Undo,
    Redo,
    Recap,
    ExitRecap,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerOwner {
    Clock,
    Input,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    owner: ListenerOwner,
    topic: Topic,
    id: ListenerId,
}

pub struct SessionEngine<C: PlaybackClock, I: InputHub> {
    ctx: SessionContext,
    clock: C,
    input: I,
    entry: EntrySession,
    history: HistoryStack,
    recap: RecapController,
    indicators: IndicatorScheduler,
    subscriptions: Vec<Subscription>,
    expected_seeks: Vec<f64>,
    source: Option<String>,
    resumed: bool,
    notices: Vec<Notice>,
    closed: bool,
}

impl<C: PlaybackClock, I: InputHub> SessionEngine<C, I> {
    /// Start a blank session. A bad config never gets this far.
    pub fn open(
        config: WorkflowConfig,
        setup: SetupMetadata,
        clock: C,
        input: I,
    ) -> Result<Self, ConfigError> {
        let ctx = SessionContext::new(config, setup)?;
        let engine = Self::attach(ctx, clock, input, false);
        info!(config = %engine.ctx.config().name, "session opened");
        Ok(engine)
    }

    /// Continue a saved session: restores the log, audit sets, counter,
    /// playback position and rate.
    pub fn resume(snapshot: SessionSnapshot, clock: C, input: I) -> Result<Self, SnapshotError> {
        let position = snapshot.playback_position_seconds;
        let rate = snapshot.playback_rate;
        let ctx = SessionContext::from_snapshot(snapshot)?;
        let mut engine = Self::attach(ctx, clock, input, true);
        engine.clock.set_rate(rate);
        engine.clock.pause();
        engine.seek_internal(position);
        info!(
            config = %engine.ctx.config().name,
            entries = engine.ctx.log().len(),
            audit = engine.ctx.audit().is_active(),
            "session resumed"
        );
        Ok(engine)
    }

    fn attach(ctx: SessionContext, mut clock: C, mut input: I, resumed: bool) -> Self {
        let mut subscriptions = Vec::with_capacity(4);
        for topic in [Topic::PositionChanged, Topic::SeekCompleted] {
            let id = clock.subscribe(topic);
            subscriptions.push(Subscription {
                owner: ListenerOwner::Clock,
                topic,
                id,
            });
        }
        for topic in [Topic::Click, Topic::Key] {
            let id = input.subscribe(topic);
            subscriptions.push(Subscription {
                owner: ListenerOwner::Input,
                topic,
                id,
            });
        }

        let settings = ctx.settings().clone();
        Self {
            clock,
            input,
            entry: EntrySession::new(),
            history: HistoryStack::new(settings.history_depth),
            recap: RecapController::new(&settings.recap),
            indicators: IndicatorScheduler::new(settings.indicator),
            subscriptions,
            expected_seeks: Vec::new(),
            source: None,
            resumed,
            notices: Vec::new(),
            closed: false,
            ctx,
        }
    }

    /// Unregister every listener. Later events are ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for sub in self.subscriptions.drain(..) {
            let removed = match sub.owner {
                ListenerOwner::Clock => self.clock.unsubscribe(sub.id),
                ListenerOwner::Input => self.input.unsubscribe(sub.id),
            };
            if !removed {
                debug!(topic = ?sub.topic, id = sub.id.0, "listener already gone");
            }
        }
        self.closed = true;
        info!(entries = self.ctx.log().len(), "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── Accessors ──

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.entry.draft()
    }

    pub fn recap_state(&self) -> RecapState {
        self.recap.state()
    }

    /// Recap drives the review axis; audit mode keeps at least the
    /// non-preview review states visible during normal playback.
    pub fn review_mode(&self) -> ReviewMode {
        let audit_floor = if self.ctx.audit().is_active() {
            ReviewMode::NoPreview
        } else {
            ReviewMode::Off
        };
        self.recap.review_mode().max(audit_floor)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ── Playback events ──

    /// The host attached a video. Repeats for the same source are ignored.
    pub fn on_source_ready(&mut self, source: &str) -> bool {
        if self.ignored("source_ready") {
            return false;
        }
        if self.source.as_deref() == Some(source) {
            debug!(source, "duplicate source ready ignored");
            return false;
        }
        if let Some(previous) = self.source.replace(source.to_string()) {
            info!(previous = %previous, source, "video source replaced");
        }
        if !self.resumed && self.clock.position() < PLAYBACK_ORIGIN_SECONDS {
            self.clock.pause();
            self.seek_internal(PLAYBACK_ORIGIN_SECONDS);
        }
        true
    }

    /// A position sample. Advances recap and returns the indicator frame.
    pub fn on_position(&mut self, wall: Duration, position: f64) -> Vec<Indicator> {
        if self.ignored("position") {
            return Vec::new();
        }
        match self.recap.on_tick(&self.ctx.log, position, &mut self.clock) {
            Some(RecapEvent::Extended { end_time }) => {
                debug!(end_time, "recap window extended");
            }
            Some(RecapEvent::Completed { end_time }) => {
                info!(end_time, "recap completed");
            }
            None => {}
        }
        let mode = self.review_mode();
        self.indicators.tick(&self.ctx.log, wall, position, mode)
    }

    /// A seek finished. Seeks the engine issued are expected; anything else
    /// came from the operator. A completion for a later engine seek settles
    /// every earlier one, since players may merge back-to-back seeks.
    pub fn on_seek_completed(&mut self, position: f64) {
        if self.ignored("seek_completed") {
            return;
        }
        if let Some(i) = self
            .expected_seeks
            .iter()
            .position(|t| (t - position).abs() < SEEK_MATCH_EPSILON)
        {
            self.expected_seeks.drain(..=i);
            debug!(position, "engine seek completed");
            return;
        }
        if !self.expected_seeks.is_empty() {
            debug!(stale = self.expected_seeks.len(), "pending engine seeks dropped");
            self.expected_seeks.clear();
        }
        debug!(position, "operator seek");
        if self.recap.on_user_seek(position) {
            info!(position, "recap abandoned by seek");
            self.notices.push(Notice::info("recap abandoned"));
        }
    }

    // ── Input events ──

    /// A click starts a draft at the current position and pauses playback.
    pub fn on_click(&mut self, wall: Duration, click: Click) -> Option<DraftProgress> {
        if self.ignored("click") {
            return None;
        }
        let (x, y) = match click.fractions() {
            Ok(v) => v,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        let cleared = self.indicators.clear_undo_all();
        if cleared > 0 {
            debug!(cleared, "undo marks cleared");
        }
        if self.entry.is_drafting() {
            debug!("click ignored while drafting");
            return None;
        }

        self.clock.pause();
        let position = self.clock.position();
        let result = self.entry.start_draft(
            &mut self.ctx,
            DraftDeps {
                history: &mut self.history,
                indicators: &mut self.indicators,
                wall,
            },
            position,
            x,
            y,
        );
        self.settle(result).flatten()
    }

    pub fn on_key(&mut self, wall: Duration, key: KeyCommand) {
        if self.ignored("key") {
            return;
        }
        debug!(?key, "key");
        match key {
            KeyCommand::TogglePlayback => self.toggle_playback(),
            KeyCommand::Undo => {
                self.undo(wall);
            }
            KeyCommand::Redo => {
                self.redo();
            }
            KeyCommand::Recap => {
                self.start_recap();
            }
            KeyCommand::ExitRecap => {
                self.exit_recap();
            }
            KeyCommand::Back => {
                self.go_back();
            }
        }
    }

    // ── Drafting ──

    pub fn answer(&mut self, wall: Duration, step_id: &str, value: &str) -> Option<DraftProgress> {
        if self.ignored("answer") {
            return None;
        }
        let result = self.entry.answer(
            &mut self.ctx,
            DraftDeps {
                history: &mut self.history,
                indicators: &mut self.indicators,
                wall,
            },
            step_id,
            value,
        );
        self.settle(result)
    }

    pub fn go_back(&mut self) -> Option<DraftProgress> {
        if self.ignored("back") {
            return None;
        }
        let result = self.entry.go_back(&self.ctx, &mut self.indicators);
        self.settle(result)
    }

    /// Resume playback once a draft finishes either way.
    fn settle<T: Settled>(&mut self, result: Result<T, SessionError>) -> Option<T> {
        match result {
            Ok(value) => {
                if value.finished() {
                    self.resume_playback();
                }
                Some(value)
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    // ── History ──

    /// Roll back the last edit, pause and show where it happened.
    pub fn undo(&mut self, wall: Duration) -> Option<HistoryChange> {
        if self.ignored("undo") {
            return None;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return None;
        }
        let change = match self.history.undo(&mut self.ctx) {
            Ok(change) => change,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        info!(focus = ?change.focus.as_ref().map(|e| e.id), "undo");
        if let Some(focus) = &change.focus {
            self.indicators
                .mark_undo(focus.id, Placement::of(focus), wall);
            self.clock.pause();
            self.seek_internal(focus.playback_time_seconds);
        }
        Some(change)
    }

    pub fn redo(&mut self) -> Option<HistoryChange> {
        if self.ignored("redo") {
            return None;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return None;
        }
        let change = match self.history.redo(&mut self.ctx) {
            Ok(change) => change,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        info!(focus = ?change.focus.as_ref().map(|e| e.id), "redo");
        if let Some(focus) = &change.focus {
            self.indicators.clear_undo(focus.id);
            self.seek_internal(focus.playback_time_seconds);
        }
        Some(change)
    }

    // ── Audit ──

    pub fn delete_entry(&mut self, id: EntryId) -> Option<Arc<Entry>> {
        if self.ignored("delete") {
            return None;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return None;
        }
        match audit::delete_entry(&mut self.ctx, &mut self.history, id) {
            Ok(entry) => {
                self.indicators.remove(id);
                info!(%id, origin = %entry.origin, "entry deleted");
                Some(entry)
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    /// Load a prior export and switch to audit mode.
    pub fn load_prior(&mut self, rows: Vec<PriorRow>) -> Option<usize> {
        if self.ignored("load_prior") {
            return None;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return None;
        }
        match audit::load_prior(&mut self.ctx, rows) {
            Ok(count) => {
                self.history.clear();
                info!(count, "prior export loaded, audit mode on");
                self.notices
                    .push(Notice::info(format!("loaded {count} prior entries")));
                Some(count)
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    // ── Recap and playback ──

    pub fn start_recap(&mut self) -> Option<RecapStart> {
        if self.ignored("recap") {
            return None;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return None;
        }
        let start = self.recap.start(&self.ctx.log, &mut self.clock);
        let target = self.seek_target(start.seek_to);
        self.expect_seek(target);
        info!(
            seek_to = start.seek_to,
            end_time = start.end_time,
            degenerate = start.degenerate,
            "recap started"
        );
        Some(start)
    }

    pub fn exit_recap(&mut self) -> bool {
        if self.ignored("exit_recap") {
            return false;
        }
        match self.recap.exit(&mut self.clock) {
            Some(left) => {
                info!(?left, "recap exited");
                true
            }
            None => {
                self.report(SessionError::NoRecap);
                false
            }
        }
    }

    pub fn toggle_playback(&mut self) {
        if self.ignored("toggle") {
            return;
        }
        if self.entry.is_drafting() {
            self.report(SessionError::DraftOpen);
            return;
        }
        if self.clock.is_paused() {
            self.resume_playback();
        } else {
            self.clock.pause();
        }
    }

    pub fn set_rate(&mut self, rate: f64) {
        if self.ignored("rate") {
            return;
        }
        if !rate.is_finite() || rate <= 0.0 {
            self.report(SessionError::InvalidRate(rate));
            return;
        }
        self.clock.set_rate(rate);
    }

    /// Operator-initiated seek; its completion is treated as a user seek.
    pub fn seek(&mut self, seconds: f64) {
        if self.ignored("seek") {
            return;
        }
        self.clock.seek(seconds);
    }

    /// Play, leaving an exhausted recap first. An open recap window keeps
    /// running toward its end.
    fn resume_playback(&mut self) {
        if self.recap.state() == RecapState::Completed {
            self.recap.exit(&mut self.clock);
            info!("recap exited on resume");
        } else {
            self.clock.play();
        }
    }

    fn seek_internal(&mut self, seconds: f64) {
        let target = self.seek_target(seconds);
        self.expect_seek(target);
        self.clock.seek(target);
    }

    /// Clamp into `[0, duration]`. An unknown duration bounds nothing.
    fn seek_target(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let duration = self.clock.duration();
        if duration.is_finite() && duration >= 0.0 {
            seconds.min(duration)
        } else {
            seconds
        }
    }

    fn expect_seek(&mut self, target: f64) {
        if self.expected_seeks.len() >= MAX_PENDING_SEEKS {
            self.expected_seeks.remove(0);
        }
        self.expected_seeks.push(target);
    }

    // ── Output ──

    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx
            .to_snapshot(self.clock.position(), self.clock.rate())
    }

    pub fn checkpoint(&self, store: &mut dyn SessionStore) -> anyhow::Result<()> {
        store.save(&self.snapshot())?;
        debug!(entries = self.ctx.log().len(), "session saved");
        Ok(())
    }

    pub fn export_table(&self) -> ExportTable {
        self.ctx.export_table()
    }

    /// Indicator frame at the clock's current position.
    pub fn indicators(&mut self, wall: Duration) -> Vec<Indicator> {
        let mode = self.review_mode();
        self.indicators
            .tick(&self.ctx.log, wall, self.clock.position(), mode)
    }

    // ── Internals ──

    fn ignored(&self, event: &'static str) -> bool {
        if self.closed {
            debug!(event, "event after close ignored");
        }
        self.closed
    }

    fn report(&mut self, err: SessionError) {
        warn!(error = %err, kind = ?err.kind(), "operation rejected");
        self.notices.push(Notice::from(&err));
    }
}

/// Results that may end a draft.
trait Settled {
    fn finished(&self) -> bool;
}

impl Settled for DraftProgress {
    fn finished(&self) -> bool {
        !matches!(self, DraftProgress::Asking { .. })
    }
}

impl Settled for Option<DraftProgress> {
    fn finished(&self) -> bool {
        self.as_ref().is_some_and(Settled::finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ListenerRegistry, ManualClock, ManualInput};
    use crate::error::NoticeLevel;
    use crate::indicator::IndicatorState;
    use crate::testing::vehicle_config;
    use vidmark_core::{Origin, StepValues};

    type Engine = SessionEngine<ManualClock, ManualInput>;

    fn engine_with(config: WorkflowConfig) -> Engine {
        SessionEngine::open(
            config,
            SetupMetadata::default(),
            ManualClock::new(600.0),
            ManualInput::new(),
        )
        .unwrap()
    }

    fn engine() -> Engine {
        engine_with(vehicle_config())
    }

    fn wall(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    const CLICK: Click = Click {
        x: 320.0,
        y: 120.0,
        width: 640.0,
        height: 480.0,
    };

    /// Forward queued seek completions, as a host would.
    fn pump(engine: &mut Engine) {
        for position in engine.clock_mut().take_completed_seeks() {
            engine.on_seek_completed(position);
        }
    }

    fn goto(engine: &mut Engine, position: f64) {
        engine.seek(position);
        pump(engine);
    }

    fn commit_car(engine: &mut Engine, at: f64) -> Arc<Entry> {
        goto(engine, at);
        engine.on_click(wall(at), CLICK).unwrap();
        match engine.answer(wall(at), "vehicle_type", "car") {
            Some(DraftProgress::Committed(entry)) => entry,
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn open_registers_and_close_unregisters_listeners() {
        let mut engine = engine();
        assert_eq!(engine.clock().total_listeners(), 2);
        assert_eq!(engine.input().total_listeners(), 2);
        engine.close();
        assert!(engine.is_closed());
        assert_eq!(engine.clock().total_listeners(), 0);
        assert_eq!(engine.input().total_listeners(), 0);

        assert_eq!(engine.on_click(wall(1.0), CLICK), None);
        assert!(engine.on_position(wall(1.0), 3.0).is_empty());
        assert_eq!(engine.context().entry_counter(), 0);
        engine.close();
    }

    #[test]
    fn open_rejects_bad_config() {
        let mut config = vehicle_config();
        config.steps[1].condition.as_mut().unwrap().step = "license_plate".into();
        let err = SessionEngine::open(
            config,
            SetupMetadata::default(),
            ManualClock::new(10.0),
            ManualInput::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::ForwardConditionRef { .. }));
    }

    #[test]
    fn click_pauses_and_commit_resumes() {
        let mut engine = engine();
        goto(&mut engine, 4.0);
        engine.clock_mut().play();

        let progress = engine.on_click(wall(1.0), CLICK).unwrap();
        assert_eq!(progress, DraftProgress::Asking { step_index: 0 });
        assert!(engine.clock().is_paused());
        let draft = engine.draft().unwrap();
        assert_eq!((draft.click_x, draft.click_y), (0.5, 0.25));

        let frame = engine.indicators(wall(1.5));
        assert_eq!(frame[0].state, IndicatorState::Waiting);

        engine.answer(wall(2.0), "vehicle_type", "car").unwrap();
        assert!(!engine.clock().is_paused());
        let frame = engine.indicators(wall(2.5));
        assert_eq!(frame[0].state, IndicatorState::Finalized);
    }

    #[test]
    fn truck_waits_for_plate() {
        let mut engine = engine();
        engine.on_click(wall(1.0), CLICK);
        assert_eq!(
            engine.answer(wall(1.0), "vehicle_type", "truck"),
            Some(DraftProgress::Asking { step_index: 1 })
        );
        assert!(engine.clock().is_paused());
        assert!(engine.context().log().is_empty());
        let Some(DraftProgress::Committed(entry)) =
            engine.answer(wall(2.0), "license_plate", "AB-123")
        else {
            panic!("expected commit");
        };
        assert_eq!(entry.step_values.len(), 2);
    }

    #[test]
    fn degenerate_surface_is_reported_and_ignored() {
        let mut engine = engine();
        let bad = Click {
            width: 0.0,
            ..CLICK
        };
        assert_eq!(engine.on_click(wall(1.0), bad), None);
        assert!(engine.draft().is_none());
        assert_eq!(engine.context().entry_counter(), 0);
        let notices = engine.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[test]
    fn cancelling_the_first_step_resumes_playback() {
        let mut engine = engine();
        engine.on_click(wall(1.0), CLICK);
        let progress = engine.go_back().unwrap();
        assert!(matches!(progress, DraftProgress::Cancelled(_)));
        assert!(!engine.clock().is_paused());
        assert!(engine.indicators(wall(1.3)).is_empty());
    }

    #[test]
    fn invalid_answer_becomes_a_warning() {
        let mut engine = engine();
        engine.on_click(wall(1.0), CLICK);
        assert_eq!(engine.answer(wall(1.0), "vehicle_type", "boat"), None);
        let notices = engine.take_notices();
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(engine.draft().is_some());
    }

    #[test]
    fn undo_then_redo_via_engine() {
        let mut engine = engine();
        let a = commit_car(&mut engine, 5.0);
        let b = commit_car(&mut engine, 9.0);
        goto(&mut engine, 20.0);

        let change = engine.undo(wall(10.0)).unwrap();
        assert_eq!(change.focus.unwrap().id, b.id);
        let ids: Vec<EntryId> = engine.context().log().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id]);
        assert_eq!(engine.history().redo_len(), 1);
        assert!(engine.clock().is_paused());
        assert_eq!(engine.clock().position(), 9.0);
        let frame = engine.indicators(wall(20.0));
        assert!(frame
            .iter()
            .any(|i| i.entry_id == b.id && i.state == IndicatorState::Undo));

        engine.redo().unwrap();
        let ids: Vec<EntryId> = engine.context().log().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(engine.indicators(wall(20.0)).is_empty());
    }

    #[test]
    fn next_click_clears_undo_marks() {
        let mut engine = engine();
        let a = commit_car(&mut engine, 5.0);
        engine.undo(wall(10.0));
        assert!(engine
            .indicators(wall(10.0))
            .iter()
            .any(|i| i.entry_id == a.id));
        engine.on_click(wall(11.0), CLICK);
        assert!(engine
            .indicators(wall(11.0))
            .iter()
            .all(|i| i.entry_id != a.id));
    }

    #[test]
    fn history_is_locked_while_drafting() {
        let mut engine = engine();
        commit_car(&mut engine, 5.0);
        engine.on_click(wall(6.0), CLICK);
        assert!(engine.undo(wall(6.0)).is_none());
        assert_eq!(engine.context().log().len(), 1);
        assert_eq!(
            engine.take_notices()[0].message,
            SessionError::DraftOpen.to_string()
        );
    }

    #[test]
    fn empty_undo_is_a_notice_not_a_failure() {
        let mut engine = engine();
        assert!(engine.undo(wall(1.0)).is_none());
        assert_eq!(engine.take_notices()[0].message, "nothing to undo");
    }

    #[test]
    fn recap_on_empty_log_pauses_at_rewind_target() {
        let mut engine = engine();
        goto(&mut engine, 20.0);
        let start = engine.start_recap().unwrap();
        assert!(start.degenerate);
        assert_eq!(engine.clock().position(), 10.0);
        assert!(engine.clock().is_paused());
        assert_eq!(engine.recap_state(), RecapState::Rewinding { end_time: 10.0 });

        pump(&mut engine);
        assert!(engine.recap.is_window_open());
        engine.on_position(wall(1.0), 10.0);
        assert_eq!(engine.recap_state(), RecapState::Completed);
    }

    #[test]
    fn commit_during_rewind_keeps_the_window() {
        let mut config = vehicle_config();
        config.settings.recap.rewind_seconds = 60.0;
        let mut engine = engine_with(config);
        commit_car(&mut engine, 5.0);
        commit_car(&mut engine, 30.0);
        goto(&mut engine, 40.0);

        let start = engine.start_recap().unwrap();
        assert_eq!(start.seek_to, 0.0);
        assert_eq!(start.end_time, 30.0);
        pump(&mut engine);

        engine.clock_mut().advance(3.0);
        engine.on_click(wall(50.0), CLICK);
        engine.answer(wall(51.0), "vehicle_type", "truck");
        engine.answer(wall(52.0), "license_plate", "Z-1");
        assert_eq!(engine.recap_state(), RecapState::Rewinding { end_time: 30.0 });
        assert!(!engine.clock().is_paused());
    }

    #[test]
    fn operator_seek_past_window_abandons_recap() {
        let mut engine = engine();
        commit_car(&mut engine, 30.0);
        goto(&mut engine, 35.0);
        engine.start_recap();
        pump(&mut engine);
        assert!(engine.recap.is_window_open());

        goto(&mut engine, 50.0);
        assert_eq!(engine.recap_state(), RecapState::Inactive);
        assert_eq!(engine.take_notices()[0].level, NoticeLevel::Info);
    }

    #[test]
    fn dropped_engine_seek_does_not_swallow_a_later_operator_seek() {
        let mut engine = engine();
        commit_car(&mut engine, 50.0);
        engine.undo(wall(1.0)).unwrap();
        // the player never reports the undo seek
        engine.clock_mut().take_completed_seeks();
        assert_eq!(engine.expected_seeks, vec![50.0]);

        commit_car(&mut engine, 30.0);
        assert!(engine.expected_seeks.is_empty());
        goto(&mut engine, 35.0);
        engine.start_recap();
        pump(&mut engine);
        assert!(engine.recap.is_window_open());

        goto(&mut engine, 50.0);
        assert_eq!(engine.recap_state(), RecapState::Inactive);
    }

    #[test]
    fn unreported_engine_seeks_stay_bounded() {
        let mut engine = engine();
        commit_car(&mut engine, 30.0);
        for i in 0..20 {
            engine.undo(wall(i as f64)).unwrap();
            engine.redo().unwrap();
            engine.clock_mut().take_completed_seeks();
        }
        assert_eq!(engine.expected_seeks.len(), MAX_PENDING_SEEKS);

        goto(&mut engine, 12.0);
        assert!(engine.expected_seeks.is_empty());
    }

    /// A player that has not learned the video length yet.
    struct UnknownLength(ManualClock);

    impl ListenerRegistry for UnknownLength {
        fn subscribe(&mut self, topic: Topic) -> ListenerId {
            self.0.subscribe(topic)
        }

        fn unsubscribe(&mut self, id: ListenerId) -> bool {
            self.0.unsubscribe(id)
        }
    }

    impl PlaybackClock for UnknownLength {
        fn position(&self) -> f64 {
            self.0.position()
        }
        fn duration(&self) -> f64 {
            f64::NAN
        }
        fn rate(&self) -> f64 {
            self.0.rate()
        }
        fn is_paused(&self) -> bool {
            self.0.is_paused()
        }
        fn seek(&mut self, seconds: f64) {
            self.0.seek(seconds);
        }
        fn play(&mut self) {
            self.0.play();
        }
        fn pause(&mut self) {
            self.0.pause();
        }
        fn set_rate(&mut self, rate: f64) {
            self.0.set_rate(rate);
        }
    }

    #[test]
    fn engine_seeks_tolerate_an_unknown_duration() {
        let mut engine = SessionEngine::open(
            vehicle_config(),
            SetupMetadata::default(),
            UnknownLength(ManualClock::new(600.0)),
            ManualInput::new(),
        )
        .unwrap();
        let forward = |engine: &mut SessionEngine<UnknownLength, ManualInput>| {
            for position in engine.clock_mut().0.take_completed_seeks() {
                engine.on_seek_completed(position);
            }
        };

        assert!(engine.on_source_ready("clip.mp4"));
        assert_eq!(engine.clock().position(), PLAYBACK_ORIGIN_SECONDS);
        forward(&mut engine);
        assert!(engine.expected_seeks.is_empty());

        engine.seek(40.0);
        forward(&mut engine);
        let start = engine.start_recap().unwrap();
        assert_eq!(start.seek_to, 30.0);
        forward(&mut engine);
        assert!(engine.recap.is_window_open());
        assert!(engine.take_notices().is_empty());
    }

    #[test]
    fn commit_after_completed_recap_leaves_recap() {
        let mut engine = engine();
        commit_car(&mut engine, 30.0);
        goto(&mut engine, 35.0);
        engine.start_recap();
        pump(&mut engine);
        engine.on_position(wall(1.0), 30.0);
        assert_eq!(engine.recap_state(), RecapState::Completed);
        assert_eq!(engine.review_mode(), ReviewMode::NoPreview);

        engine.on_click(wall(2.0), CLICK);
        engine.answer(wall(2.0), "vehicle_type", "car");
        assert_eq!(engine.recap_state(), RecapState::Inactive);
        assert!(!engine.clock().is_paused());
    }

    #[test]
    fn review_dots_show_during_recap() {
        let mut engine = engine();
        let a = commit_car(&mut engine, 30.0);
        goto(&mut engine, 35.0);
        engine.start_recap();
        pump(&mut engine);

        // finalize mark long expired by wall 100
        let frame = engine.on_position(wall(100.0), 29.0);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].entry_id, a.id);
        assert_eq!(frame[0].state, IndicatorState::Preview);
    }

    #[test]
    fn exit_recap_without_recap_is_a_notice() {
        let mut engine = engine();
        assert!(!engine.exit_recap());
        assert_eq!(engine.take_notices()[0].message, "no recap is running");
    }

    #[test]
    fn duplicate_source_ready_is_ignored() {
        let mut engine = engine();
        assert!(engine.on_source_ready("clip.mp4"));
        assert_eq!(engine.clock().position(), PLAYBACK_ORIGIN_SECONDS);
        assert!(engine.clock().is_paused());
        assert!(!engine.on_source_ready("clip.mp4"));
        assert!(engine.take_notices().is_empty());
    }

    #[test]
    fn audit_export_reflects_edits() {
        let mut engine = engine();
        let row = |t: f64| {
            let mut step_values = StepValues::new();
            step_values.insert("vehicle_type".into(), "car".into());
            PriorRow {
                playback_time_seconds: t,
                derived_timestamp: String::new(),
                click_x: 0.1,
                click_y: 0.2,
                step_values,
            }
        };
        assert_eq!(engine.load_prior(vec![row(5.0), row(8.0)]), Some(2));
        assert_eq!(engine.review_mode(), ReviewMode::NoPreview);

        engine.delete_entry(EntryId(0)).unwrap();
        let z = commit_car(&mut engine, 12.0);
        assert_eq!(z.origin, Origin::New);

        let table = engine.export_table();
        let col = table.column("playback_time_seconds").unwrap();
        let times: Vec<&str> = table.rows.iter().map(|r| r[col].as_str()).collect();
        assert_eq!(times, vec!["8.000", "12.000"]);

        let snap = engine.snapshot();
        assert_eq!(snap.deleted_entry_ids, vec![EntryId(0)]);
        assert_eq!(snap.new_entry_ids, vec![z.id]);
    }

    #[test]
    fn set_rate_rejects_nonsense() {
        let mut engine = engine();
        engine.set_rate(-1.0);
        assert_eq!(engine.clock().rate(), 1.0);
        engine.set_rate(2.0);
        assert_eq!(engine.clock().rate(), 2.0);
        assert_eq!(engine.take_notices().len(), 1);
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Option<SessionSnapshot>,
    }

    impl SessionStore for MemoryStore {
        fn save(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
            self.saved = Some(snapshot.clone());
            Ok(())
        }

        fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
            Ok(self.saved.clone())
        }

        fn export(
            &self,
            table: &ExportTable,
            _format: vidmark_core::ExportFormat,
        ) -> anyhow::Result<String> {
            Ok(format!("{} rows", table.rows.len()))
        }
    }

    #[test]
    fn checkpoint_and_resume() {
        let mut engine = engine();
        commit_car(&mut engine, 5.0);
        goto(&mut engine, 7.5);
        engine.set_rate(1.5);

        let mut store = MemoryStore::default();
        engine.checkpoint(&mut store).unwrap();
        let snap = store.load().unwrap().unwrap();

        let mut resumed =
            SessionEngine::resume(snap, ManualClock::new(600.0), ManualInput::new()).unwrap();
        assert_eq!(resumed.context().log(), engine.context().log());
        assert_eq!(resumed.clock().position(), 7.5);
        assert_eq!(resumed.clock().rate(), 1.5);
        assert!(resumed.on_source_ready("clip.mp4"));
        assert_eq!(resumed.clock().position(), 7.5);

        let next = commit_car(&mut resumed, 9.0);
        assert_eq!(next.id, EntryId(1));
    }
}
