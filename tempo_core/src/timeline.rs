//! Timeline - the simulation root that owns the clock and runs the tick loop
//!
//! One call to [`Timeline::step`] processes exactly one tick, always in
//! the same order:
//!
//! 1. arbitrate pending commands
//! 2. apply the global winner, then per-player winners
//! 3. advance (Record), burst (Step) or move the cursor (Rewind)
//! 4. record and trim tracks
//!
//! A command accepted in a step is applied before that step's record pass,
//! so recorded history always reflects post-command state.

use crate::arbiter::{CommandArbiter, CommandIntake};
use crate::clock::{TickClock, TickState, MIN_SPEED};
use crate::collaborator::TimeAware;
use crate::command::{CommandKind, CommandScope, TimeControlCommand};
use crate::config::TimelineConfig;
use crate::error::TimelineError;
use crate::metrics::TimelineMetrics;
use crate::mode::{ModeController, RewindMode, RewindTarget, RewindTransition};
use crate::registry::TrackRegistry;
use crate::track::TrackRecorder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tempo_env::{PlayerId, Tick, TrackId};
use tracing::{debug, info, warn};

/// Diagnostic for an accepted command that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Tick at which the command was arbitrated
    pub tick: Tick,
    pub kind: CommandKind,
    pub scope: CommandScope,
    /// Human readable reason
    pub reason: String,
}

/// Per-player presentation state driven by per-player commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub is_paused: bool,
    pub speed_multiplier: f32,
}

impl Default for PlayerView {
    fn default() -> Self {
        Self {
            is_paused: false,
            speed_multiplier: 1.0,
        }
    }
}

/// Read-only state published to downstream subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    pub tick_state: TickState,
    pub mode: RewindMode,
    pub rewind_target: Option<RewindTarget>,
    pub last_rejection: Option<Rejection>,
}

/// What happened during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Tick after the step
    pub tick: Tick,
    /// Mode after the step
    pub mode: RewindMode,
    /// A new tick ran forward (Record or Step)
    pub advanced: bool,
    pub accepted: Vec<TimeControlCommand>,
    pub dropped: usize,
    pub rejections: Vec<Rejection>,
    pub recorded: usize,
    pub trimmed: usize,
    pub truncated: usize,
    pub loaded: usize,
    /// Ticks re-run after loads to reach the cursor
    pub replayed: usize,
    /// Tracks that failed to decode during this step
    pub corrupt: Vec<TimelineError>,
}

/// The simulation root.
pub struct Timeline {
    config: TimelineConfig,
    clock: TickClock,
    modes: ModeController,
    arbiter: CommandArbiter,
    tracks: TrackRegistry,
    players: BTreeMap<PlayerId, PlayerView>,
    metrics: TimelineMetrics,
    last_rejection: Option<Rejection>,
}

impl Timeline {
    /// Creates a timeline at tick 0 in Record mode.
    pub fn new(config: TimelineConfig) -> Result<Self, TimelineError> {
        config.validate()?;

        let mut clock = TickClock::new(config.fixed_delta_time);
        clock.set_speed(config.initial_speed);
        if config.start_paused {
            clock.pause();
        }

        Ok(Self {
            arbiter: CommandArbiter::new(config.source_ranking.clone()),
            config,
            clock,
            modes: ModeController::new(),
            tracks: TrackRegistry::new(),
            players: BTreeMap::new(),
            metrics: TimelineMetrics::default(),
            last_rejection: None,
        })
    }

    /// Registers a collaborator.
    pub fn register(&mut self, collaborator: Box<dyn TimeAware>) -> Result<TrackId, TimelineError> {
        let id = self
            .tracks
            .register(collaborator, self.clock.tick(), self.modes.mode())?;
        if let Some(recorder) = self.tracks.recorder(id) {
            self.metrics.entries_recorded += recorder.history().len() as u64;
            debug!(
                "Registered {} ({}) every {} ticks, window {}",
                recorder.definition().name,
                id,
                recorder.definition().record_every_ticks,
                recorder.definition().window_ticks
            );
        }
        Ok(id)
    }

    /// A submission handle for any number of callers.
    pub fn intake(&self) -> CommandIntake {
        self.arbiter.intake()
    }

    /// Queues a command for the next step.
    pub fn submit(&self, command: TimeControlCommand) {
        self.arbiter.intake().submit(command);
    }

    /// Runs one step with a wall-clock delta that yields exactly one fixed
    /// step of elapsed simulation time at the current speed.
    pub fn step_fixed(&mut self) -> StepReport {
        let dt = self.config.fixed_delta_time / self.clock.speed_multiplier() as f64;
        self.step(dt)
    }

    /// Processes one tick.
    pub fn step(&mut self, wall_dt: f64) -> StepReport {
        self.clock.begin_step();
        self.metrics.steps += 1;

        let mut report = StepReport::default();
        let arbitration_tick = self.clock.tick();

        // 1. Arbitrate
        let resolution = self.arbiter.resolve();
        let accepted = resolution.accepted_count() as u64;
        self.metrics.commands_seen += accepted + resolution.dropped.len() as u64;
        self.metrics.commands_accepted += accepted;
        self.metrics.commands_dropped += resolution.dropped.len() as u64;
        report.dropped = resolution.dropped.len();

        // 2. Apply
        if let Some(pending) = resolution.global {
            report.accepted.push(pending.command);
            if let Err(e) = self.apply_global(pending.command.kind, &mut report) {
                self.reject(arbitration_tick, pending.command, e, &mut report);
            }
        }
        for (player, pending) in resolution.players {
            report.accepted.push(pending.command);
            if let Err(e) = self.apply_player(player, pending.command.kind) {
                self.reject(arbitration_tick, pending.command, e, &mut report);
            }
        }

        // 3 + 4. Advance and record
        match self.modes.mode() {
            RewindMode::Record => {
                if let Some(tick) = self.clock.advance(wall_dt, RewindMode::Record) {
                    let state = self.clock.state();
                    self.tracks.on_tick_all(tick, &state);
                    let totals = self.tracks.record_and_trim(tick, true);
                    self.forget_unreachable_ticks();
                    report.advanced = true;
                    report.recorded = totals.recorded;
                    report.trimmed = totals.trimmed;
                    self.metrics.ticks_recorded += 1;
                }
            }
            RewindMode::Step => {
                if let Some(progress) = self.modes.take_step() {
                    let tick = self.clock.step_forward();
                    let state = self.clock.state();
                    self.tracks.on_tick_all(tick, &state);
                    let totals = self.tracks.record_and_trim(tick, false);
                    self.forget_unreachable_ticks();
                    report.advanced = true;
                    report.trimmed = totals.trimmed;
                    self.metrics.ticks_stepped += 1;
                    if progress.finished() {
                        info!("Step burst finished at tick {}", tick);
                    }
                }
            }
            RewindMode::Rewind => {
                if let Some(cursor) = self.modes.move_cursor(self.config.rewind_ticks_per_step) {
                    self.clock.jump_to(cursor);
                    let clock = &self.clock;
                    let outcome = self.tracks.load_at(cursor, |tick| clock.state_at(tick));
                    report.loaded = outcome.loaded;
                    report.replayed = outcome.replayed;
                    self.metrics.ticks_replayed += outcome.replayed as u64;
                    self.metrics.loads += outcome.loaded as u64;
                    self.metrics.corrupt_loads += outcome.corrupt.len() as u64;
                    report.corrupt = outcome.corrupt;
                }
            }
        }

        self.metrics.entries_recorded += report.recorded as u64;
        self.metrics.entries_trimmed += report.trimmed as u64;
        self.metrics.entries_truncated += report.truncated as u64;

        report.tick = self.clock.tick();
        report.mode = self.modes.mode();
        report
    }

    fn apply_global(&mut self, kind: CommandKind, report: &mut StepReport) -> Result<(), TimelineError> {
        match kind {
            CommandKind::Pause => self.clock.pause(),
            CommandKind::Resume => self.clock.resume(),
            CommandKind::SetSpeed(multiplier) => {
                self.clock.set_speed(multiplier);
            }
            CommandKind::StepTicks(count) => {
                self.modes.begin_step(count)?;
                self.clock.pause();
                info!("Stepping {} ticks from tick {}", count, self.clock.tick());
            }
            CommandKind::StartRewind(target) => self.start_rewind(target)?,
            CommandKind::ScrubTo(target) => {
                let origin = self
                    .modes
                    .rewind_target()
                    .map(|r| r.origin_tick)
                    .ok_or(TimelineError::NotRewinding)?;
                if target > origin {
                    return Err(TimelineError::FutureTarget {
                        target,
                        current: origin,
                    });
                }
                self.tracks.validate_target(target)?;
                self.modes.scrub_to(target)?;
                debug!("Scrubbing to tick {}", target);
            }
            CommandKind::StopRewind => {
                let cursor = self.modes.stop_rewind()?;
                self.clock.jump_to(cursor);
                self.clock.forget_after(cursor);
                report.truncated = self.tracks.truncate_after(cursor);
                self.tracks.end_session();
                info!(
                    "Rewind stopped at tick {} ({} future entries discarded)",
                    cursor, report.truncated
                );
            }
        }
        Ok(())
    }

    fn start_rewind(&mut self, target: Tick) -> Result<(), TimelineError> {
        let ceiling = self.modes.target_ceiling(self.clock.tick());
        if target > ceiling {
            return Err(TimelineError::FutureTarget {
                target,
                current: ceiling,
            });
        }
        self.tracks.validate_target(target)?;

        match self.modes.start_rewind(target, self.clock.tick())? {
            RewindTransition::Started => {
                self.tracks.begin_session();
                self.metrics.rewinds_started += 1;
                info!("Rewind started: tick {} -> {}", self.clock.tick(), target);
            }
            RewindTransition::Retargeted => {
                debug!("Rewind retargeted to tick {}", target);
            }
        }
        Ok(())
    }

    /// Keeps clock states only for ticks some track can still rewind to.
    fn forget_unreachable_ticks(&mut self) {
        let oldest = self.tracks.oldest_retained().unwrap_or(self.clock.tick());
        self.clock.forget_before(oldest);
    }

    fn apply_player(&mut self, player: PlayerId, kind: CommandKind) -> Result<(), TimelineError> {
        let view = self.players.entry(player).or_default();
        match kind {
            CommandKind::Pause => view.is_paused = true,
            CommandKind::Resume => view.is_paused = false,
            CommandKind::SetSpeed(multiplier) => {
                if multiplier.is_finite() && multiplier > 0.0 {
                    view.speed_multiplier = multiplier.max(MIN_SPEED);
                } else {
                    warn!(
                        "Rejected speed multiplier {} for player {} - keeping {}",
                        multiplier, player, view.speed_multiplier
                    );
                }
            }
            other => return Err(TimelineError::GlobalOnly(other.name())),
        }
        Ok(())
    }

    fn reject(&mut self, tick: Tick, command: TimeControlCommand, error: TimelineError, report: &mut StepReport) {
        warn!("Rejected {} from {:?} at tick {}: {}", command.kind, command.source, tick, error);
        let rejection = Rejection {
            tick,
            kind: command.kind,
            scope: command.scope,
            reason: error.to_string(),
        };
        self.metrics.commands_rejected += 1;
        self.last_rejection = Some(rejection.clone());
        report.rejections.push(rejection);
    }

    // =========================================================================
    // PUBLISHED STATE
    // =========================================================================

    pub fn tick_state(&self) -> TickState {
        self.clock.state()
    }

    pub fn tick(&self) -> Tick {
        self.clock.tick()
    }

    pub fn mode(&self) -> RewindMode {
        self.modes.mode()
    }

    pub fn rewind_target(&self) -> Option<&RewindTarget> {
        self.modes.rewind_target()
    }

    pub fn last_rejection(&self) -> Option<&Rejection> {
        self.last_rejection.as_ref()
    }

    /// A player's view; players never commanded get the default view.
    pub fn player_view(&self, player: PlayerId) -> PlayerView {
        self.players.get(&player).copied().unwrap_or_default()
    }

    pub fn published(&self) -> PublishedState {
        PublishedState {
            tick_state: self.clock.state(),
            mode: self.modes.mode(),
            rewind_target: self.modes.rewind_target().copied(),
            last_rejection: self.last_rejection.clone(),
        }
    }

    pub fn metrics(&self) -> &TimelineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Recorder (definition, history, status) for a track.
    pub fn track(&self, id: TrackId) -> Result<&TrackRecorder, TimelineError> {
        self.tracks.recorder(id).ok_or(TimelineError::UnknownTrack(id))
    }

    /// Retained ticks of a track, oldest first.
    pub fn history(&self, id: TrackId) -> Result<Vec<Tick>, TimelineError> {
        self.track(id).map(|recorder| recorder.history().ticks())
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackRecorder> {
        self.tracks.recorders()
    }

    /// Oldest tick a rewind can currently target.
    pub fn oldest_rewindable(&self) -> Option<Tick> {
        self.tracks.oldest_rewindable()
    }

    /// Downcasts a registered collaborator.
    pub fn collaborator<T: 'static>(&self, id: TrackId) -> Option<&T> {
        self.tracks.collaborator(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, SnapshotReader, SnapshotWriter};
    use crate::command::CommandSource;
    use crate::track::TrackDefinition;
    use approx::assert_relative_eq;
    use std::any::Any;

    /// Counts forward ticks; its value equals the tick it last saw.
    struct Counter {
        def: TrackDefinition,
        value: u64,
        sessions: u32,
    }

    impl Counter {
        fn boxed(id: u16, every: u32, window: u32) -> Box<dyn TimeAware> {
            Box::new(Self {
                def: TrackDefinition::new(TrackId(id), format!("counter-{id}"), every, window),
                value: 0,
                sessions: 0,
            })
        }
    }

    impl TimeAware for Counter {
        fn definition(&self) -> TrackDefinition {
            self.def.clone()
        }

        fn on_tick(&mut self, _tick: Tick, _state: &TickState) {
            self.value += 1;
        }

        fn save(&self, writer: &mut SnapshotWriter) {
            writer.begin(1);
            writer.write(&self.value);
        }

        fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
            reader.expect_version(1)?;
            self.value = reader.read()?;
            Ok(())
        }

        fn on_rewind_start(&mut self) {
            self.sessions += 1;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Writes v1 payloads but only reads v2.
    struct Drifted {
        def: TrackDefinition,
    }

    impl TimeAware for Drifted {
        fn definition(&self) -> TrackDefinition {
            self.def.clone()
        }

        fn on_tick(&mut self, _tick: Tick, _state: &TickState) {}

        fn save(&self, writer: &mut SnapshotWriter) {
            writer.begin(1);
            writer.write(&0u32);
        }

        fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
            reader.expect_version(2)?;
            reader.read::<u32>().map(|_| ())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn run(timeline: &mut Timeline, steps: usize) {
        for _ in 0..steps {
            timeline.step_fixed();
        }
    }

    fn counter_value(timeline: &Timeline, id: u16) -> u64 {
        timeline.collaborator::<Counter>(TrackId(id)).unwrap().value
    }

    /// Counter every tick with a 60-tick window, run to tick 100.
    fn recorded_timeline(config: TimelineConfig) -> Timeline {
        let mut timeline = Timeline::new(config).unwrap();
        timeline.register(Counter::boxed(1, 1, 60)).unwrap();
        run(&mut timeline, 100);
        timeline
    }

    #[test]
    fn test_record_ticks_are_monotonic() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        let mut last = timeline.tick();
        for _ in 0..25 {
            let report = timeline.step_fixed();
            assert!(report.advanced);
            assert_eq!(report.tick, last + 1);
            last = report.tick;
        }
        assert_eq!(timeline.metrics().ticks_recorded, 25);
    }

    #[test]
    fn test_registration_records_tick_zero() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        let id = timeline.register(Counter::boxed(1, 10, 50)).unwrap();
        assert_eq!(timeline.history(id).unwrap(), vec![0]);
    }

    #[test]
    fn test_duplicate_track_rejected() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 1, 10)).unwrap();
        let err = timeline.register(Counter::boxed(1, 5, 10)).unwrap_err();
        assert_eq!(err, TimelineError::DuplicateTrack(TrackId(1)));
    }

    #[test]
    fn test_cadence_and_window_trimming() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        let id = timeline.register(Counter::boxed(3, 10, 50)).unwrap();
        run(&mut timeline, 100);

        assert_eq!(timeline.tick(), 100);
        assert_eq!(timeline.history(id).unwrap(), vec![50, 60, 70, 80, 90, 100]);
        assert_eq!(timeline.metrics().entries_trimmed, 5);
    }

    #[test]
    fn test_rewind_within_window_loads_state() {
        let mut timeline = recorded_timeline(TimelineConfig::default());
        assert_eq!(timeline.oldest_rewindable(), Some(40));

        timeline.submit(TimeControlCommand::start_rewind(40, CommandSource::Ui));
        let report = timeline.step_fixed();

        assert_eq!(report.mode, RewindMode::Rewind);
        assert!(!report.advanced);
        assert_eq!(report.loaded, 1);
        let target = timeline.rewind_target().unwrap();
        assert_eq!(target.target_tick, 40);
        assert_eq!(target.cursor_tick, 40);
        assert_eq!(target.origin_tick, 100);
        assert_eq!(timeline.tick(), 40);
        assert_eq!(counter_value(&timeline, 1), 40);
        assert_eq!(timeline.collaborator::<Counter>(TrackId(1)).unwrap().sessions, 1);
    }

    #[test]
    fn test_rewind_out_of_window_rejected() {
        let mut timeline = recorded_timeline(TimelineConfig::default());

        timeline.submit(TimeControlCommand::start_rewind(10, CommandSource::Ui));
        let report = timeline.step_fixed();

        assert_eq!(report.mode, RewindMode::Record);
        assert!(timeline.rewind_target().is_none());
        assert_eq!(report.rejections.len(), 1);
        let rejection = timeline.last_rejection().unwrap();
        assert_eq!(rejection.tick, 100);
        assert_eq!(rejection.kind, CommandKind::StartRewind(10));
        assert!(rejection.reason.contains("outside the retained window"));
        // Recording carries on in the same step
        assert_eq!(timeline.tick(), 101);
        assert_eq!(timeline.metrics().commands_rejected, 1);
    }

    /// Tick 100 with a 50-tick window: the horizon entry at 50 is kept, so
    /// 50 is the oldest reachable tick and 40 lies outside the window.
    #[test]
    fn test_window_fifty_at_tick_hundred() {
        for every in [1, 10] {
            let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
            let id = timeline.register(Counter::boxed(1, every, 50)).unwrap();
            run(&mut timeline, 100);
            if every == 10 {
                assert_eq!(timeline.history(id).unwrap(), vec![50, 60, 70, 80, 90, 100]);
            }
            assert_eq!(timeline.oldest_rewindable(), Some(50));

            // Hold the clock at 100 so no further trimming happens
            timeline.submit(TimeControlCommand::pause(CommandSource::Debug));
            timeline.step_fixed();

            for target in [40, 10] {
                timeline.submit(TimeControlCommand::start_rewind(target, CommandSource::Ui));
                let report = timeline.step_fixed();
                assert_eq!(report.mode, RewindMode::Record);
                let expected = TimelineError::OutOfWindow {
                    target,
                    oldest: Some(50),
                    track: TrackId(1),
                };
                assert_eq!(timeline.last_rejection().unwrap().reason, expected.to_string());
            }

            timeline.submit(TimeControlCommand::start_rewind(50, CommandSource::Ui));
            let report = timeline.step_fixed();
            assert_eq!(report.mode, RewindMode::Rewind);
            assert_eq!(timeline.rewind_target().unwrap().target_tick, 50);
            assert_eq!(counter_value(&timeline, 1), 50);
        }
    }

    #[test]
    fn test_rewind_between_coarse_entries_replays_to_cursor() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 5, 100)).unwrap();
        run(&mut timeline, 50);

        timeline.submit(TimeControlCommand::start_rewind(43, CommandSource::Ui));
        let report = timeline.step_fixed();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.replayed, 3);
        assert_eq!(counter_value(&timeline, 1), 43);

        timeline.submit(TimeControlCommand::stop_rewind(CommandSource::Ui));
        timeline.step_fixed();
        assert_eq!(timeline.tick(), 44);
        assert_eq!(counter_value(&timeline, 1), 44);

        run(&mut timeline, 6);
        assert_eq!(timeline.tick(), 50);
        assert_eq!(counter_value(&timeline, 1), 50);
        assert_eq!(timeline.history(TrackId(1)).unwrap().last(), Some(&50));
        assert_eq!(timeline.metrics().ticks_replayed, 3);
    }

    #[test]
    fn test_rewind_into_step_burst_replays_unrecorded_ticks() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 1, 100)).unwrap();
        run(&mut timeline, 10);
        timeline.submit(TimeControlCommand::step_ticks(3, CommandSource::Debug));
        run(&mut timeline, 3);
        timeline.submit(TimeControlCommand::resume(CommandSource::Debug));
        run(&mut timeline, 7);
        assert_eq!(timeline.tick(), 20);
        assert!(!timeline.history(TrackId(1)).unwrap().contains(&12));

        timeline.submit(TimeControlCommand::start_rewind(12, CommandSource::Ui));
        let report = timeline.step_fixed();
        assert_eq!(report.replayed, 2);
        assert_eq!(counter_value(&timeline, 1), 12);
    }

    #[test]
    fn test_elapsed_never_decreases_going_forward() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 1, 100)).unwrap();
        let dt = 1.0 / 30.0;
        timeline.submit(TimeControlCommand::set_speed(2.0, CommandSource::Ui));
        for _ in 0..10 {
            timeline.step(dt);
        }
        assert_relative_eq!(timeline.tick_state().elapsed_secs, 20.0 * dt, epsilon = 1e-9);

        timeline.submit(TimeControlCommand::step_ticks(3, CommandSource::Debug));
        let mut last = timeline.tick_state().elapsed_secs;
        for _ in 0..3 {
            timeline.step(dt);
            let elapsed = timeline.tick_state().elapsed_secs;
            assert!(elapsed > last, "elapsed went from {} to {}", last, elapsed);
            last = elapsed;
        }
        assert_eq!(timeline.tick(), 13);
        assert_relative_eq!(last, 26.0 * dt, epsilon = 1e-9);

        // A rewind lands on the elapsed time each tick had going forward
        timeline.submit(TimeControlCommand::start_rewind(5, CommandSource::Ui));
        timeline.step(dt);
        assert_relative_eq!(timeline.tick_state().elapsed_secs, 10.0 * dt, epsilon = 1e-9);
        timeline.submit(TimeControlCommand::scrub_to(13, CommandSource::Ui));
        timeline.step(dt);
        assert_relative_eq!(timeline.tick_state().elapsed_secs, 26.0 * dt, epsilon = 1e-9);
    }

    #[test]
    fn test_future_target_rejected() {
        let mut timeline = recorded_timeline(TimelineConfig::default());
        timeline.submit(TimeControlCommand::start_rewind(150, CommandSource::Debug));
        let report = timeline.step_fixed();

        assert_eq!(report.mode, RewindMode::Record);
        assert!(report.rejections[0].reason.contains("150"));
    }

    #[test]
    fn test_rewind_is_idempotent() {
        let mut timeline = recorded_timeline(TimelineConfig::default());

        timeline.submit(TimeControlCommand::start_rewind(45, CommandSource::Ui));
        timeline.step_fixed();
        let first = (timeline.tick_state(), counter_value(&timeline, 1));

        timeline.submit(TimeControlCommand::scrub_to(90, CommandSource::Ui));
        timeline.step_fixed();
        assert_eq!(counter_value(&timeline, 1), 90);

        timeline.submit(TimeControlCommand::scrub_to(45, CommandSource::Ui));
        timeline.step_fixed();
        let second = (timeline.tick_state(), counter_value(&timeline, 1));

        assert_eq!(first, second);
    }

    #[test]
    fn test_history_never_grows_while_rewinding() {
        let mut timeline = recorded_timeline(TimelineConfig::default().with_rewind_rate(5));
        let before = timeline.track(TrackId(1)).unwrap().history().len();

        timeline.submit(TimeControlCommand::start_rewind(50, CommandSource::Ui));
        for _ in 0..15 {
            let report = timeline.step_fixed();
            assert_eq!(report.recorded, 0);
            assert_eq!(report.trimmed, 0);
        }
        assert_eq!(timeline.track(TrackId(1)).unwrap().history().len(), before);
    }

    #[test]
    fn test_cursor_moves_at_configured_rate() {
        let mut timeline = recorded_timeline(TimelineConfig::default().with_rewind_rate(10));

        timeline.submit(TimeControlCommand::start_rewind(40, CommandSource::Ui));
        let mut cursors = Vec::new();
        for _ in 0..7 {
            timeline.step_fixed();
            cursors.push(timeline.rewind_target().unwrap().cursor_tick);
        }

        assert_eq!(cursors, vec![90, 80, 70, 60, 50, 40, 40]);
        assert_eq!(counter_value(&timeline, 1), 40);
        assert_eq!(timeline.metrics().loads, 6);
    }

    #[test]
    fn test_stop_rewind_truncates_future() {
        let mut timeline = recorded_timeline(TimelineConfig::default());

        timeline.submit(TimeControlCommand::start_rewind(40, CommandSource::Ui));
        timeline.step_fixed();
        timeline.submit(TimeControlCommand::stop_rewind(CommandSource::Ui));
        let report = timeline.step_fixed();

        assert_eq!(report.truncated, 60);
        assert_eq!(report.mode, RewindMode::Record);
        assert!(report.advanced);
        assert_eq!(timeline.tick(), 41);
        assert_eq!(counter_value(&timeline, 1), 41);
        assert_eq!(timeline.history(TrackId(1)).unwrap(), vec![40, 41]);
        assert!(timeline.rewind_target().is_none());
    }

    #[test]
    fn test_step_burst_runs_without_appending() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 1, 1000)).unwrap();
        run(&mut timeline, 10);
        let before = timeline.history(TrackId(1)).unwrap();

        timeline.submit(TimeControlCommand::step_ticks(3, CommandSource::Debug));
        let modes: Vec<_> = (0..3).map(|_| timeline.step_fixed().mode).collect();

        assert_eq!(modes, vec![RewindMode::Step, RewindMode::Step, RewindMode::Record]);
        assert_eq!(timeline.tick(), 13);
        assert_eq!(counter_value(&timeline, 1), 13);
        assert_eq!(timeline.history(TrackId(1)).unwrap(), before);
        assert!(timeline.tick_state().is_paused);

        // Still paused after the burst
        let report = timeline.step_fixed();
        assert!(!report.advanced);
        assert_eq!(timeline.tick(), 13);
        assert_eq!(timeline.metrics().ticks_stepped, 3);
    }

    #[test]
    fn test_zero_step_rejected() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.submit(TimeControlCommand::step_ticks(0, CommandSource::Debug));
        let report = timeline.step_fixed();

        assert_eq!(report.mode, RewindMode::Record);
        assert_eq!(report.rejections[0].kind, CommandKind::StepTicks(0));
    }

    #[test]
    fn test_step_while_rewinding_rejected() {
        let mut timeline = recorded_timeline(TimelineConfig::default());
        timeline.submit(TimeControlCommand::start_rewind(50, CommandSource::Ui));
        timeline.step_fixed();

        timeline.submit(TimeControlCommand::step_ticks(2, CommandSource::Debug));
        let report = timeline.step_fixed();
        assert_eq!(report.mode, RewindMode::Rewind);
        assert_eq!(report.rejections.len(), 1);
    }

    #[test]
    fn test_scrub_outside_rewind_rejected() {
        let mut timeline = recorded_timeline(TimelineConfig::default());
        timeline.submit(TimeControlCommand::scrub_to(50, CommandSource::Ui));
        timeline.step_fixed();

        let rejection = timeline.last_rejection().unwrap();
        assert_eq!(rejection.reason, TimelineError::NotRewinding.to_string());
    }

    #[test]
    fn test_corrupt_track_isolated() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.register(Counter::boxed(1, 1, 60)).unwrap();
        timeline
            .register(Box::new(Drifted {
                def: TrackDefinition::new(TrackId(2), "drifted", 1, 60),
            }))
            .unwrap();
        run(&mut timeline, 100);

        timeline.submit(TimeControlCommand::start_rewind(50, CommandSource::Ui));
        let report = timeline.step_fixed();

        assert_eq!(report.loaded, 1);
        assert_eq!(
            report.corrupt,
            vec![TimelineError::CorruptHistory {
                track: TrackId(2),
                source: CodecError::VersionMismatch { expected: 2, found: 1 },
            }]
        );
        assert_eq!(counter_value(&timeline, 1), 50);
        assert!(!timeline.track(TrackId(2)).unwrap().status().is_usable());

        // Disabled for the rest of the session
        timeline.submit(TimeControlCommand::scrub_to(70, CommandSource::Ui));
        let report = timeline.step_fixed();
        assert!(report.corrupt.is_empty());
        assert_eq!(report.loaded, 1);

        timeline.submit(TimeControlCommand::stop_rewind(CommandSource::Ui));
        timeline.step_fixed();
        assert!(timeline.track(TrackId(2)).unwrap().status().is_usable());
        assert_eq!(timeline.metrics().corrupt_loads, 1);
    }

    #[test]
    fn test_pause_beats_lower_priority_speed_change() {
        for pause_first in [true, false] {
            let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
            let speed = TimeControlCommand::set_speed(2.0, CommandSource::Script).with_priority(5);
            let pause = TimeControlCommand::pause(CommandSource::Ui).with_priority(10);
            if pause_first {
                timeline.submit(pause);
                timeline.submit(speed);
            } else {
                timeline.submit(speed);
                timeline.submit(pause);
            }

            let report = timeline.step_fixed();
            assert_eq!(report.accepted, vec![pause]);
            assert_eq!(report.dropped, 1);
            assert!(timeline.tick_state().is_paused);
            assert_eq!(timeline.tick_state().speed_multiplier, 1.0);
            assert_eq!(timeline.tick(), 0);
        }
    }

    #[test]
    fn test_paused_timeline_still_arbitrates() {
        let mut timeline = Timeline::new(TimelineConfig::default().paused()).unwrap();
        run(&mut timeline, 3);
        assert_eq!(timeline.tick(), 0);

        timeline.submit(TimeControlCommand::resume(CommandSource::Player));
        let report = timeline.step_fixed();
        assert!(report.advanced);
        assert_eq!(timeline.tick(), 1);
    }

    #[test]
    fn test_invalid_speed_keeps_last_value() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        timeline.submit(TimeControlCommand::set_speed(4.0, CommandSource::Ui));
        timeline.step(0.1);
        timeline.submit(TimeControlCommand::set_speed(f32::NAN, CommandSource::Ui));
        timeline.step(0.1);

        assert_eq!(timeline.tick_state().speed_multiplier, 4.0);
        assert!(timeline.last_rejection().is_none());

        timeline.submit(TimeControlCommand::set_speed(1.0e-6, CommandSource::Ui));
        timeline.step(0.1);
        assert_eq!(timeline.tick_state().speed_multiplier, MIN_SPEED);
    }

    #[test]
    fn test_player_scope_changes_player_view_only() {
        let mut timeline = Timeline::new(TimelineConfig::default()).unwrap();
        let alice = PlayerId::from_seed(7);

        timeline.submit(TimeControlCommand::pause(CommandSource::Player).for_player(alice));
        timeline.submit(TimeControlCommand::start_rewind(0, CommandSource::Player).for_player(alice));
        let report = timeline.step_fixed();

        assert!(timeline.player_view(alice).is_paused);
        assert!(!timeline.tick_state().is_paused);
        assert_eq!(report.dropped, 1);
        assert_eq!(timeline.mode(), RewindMode::Record);
        assert_eq!(timeline.player_view(PlayerId::from_seed(8)), PlayerView::default());
    }

    #[test]
    fn test_published_state_serializes() {
        let mut timeline = recorded_timeline(TimelineConfig::default());
        timeline.submit(TimeControlCommand::start_rewind(60, CommandSource::Ui));
        timeline.step_fixed();

        let json = serde_json::to_string(&timeline.published()).unwrap();
        let back: PublishedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, RewindMode::Rewind);
        assert_eq!(back.rewind_target.map(|r| r.target_tick), Some(60));
    }

    #[test]
    fn test_unknown_track() {
        let timeline = Timeline::new(TimelineConfig::default()).unwrap();
        assert_eq!(
            timeline.history(TrackId(9)).unwrap_err(),
            TimelineError::UnknownTrack(TrackId(9))
        );
    }
}
