//! Scenario runner - executes timeline test scenarios.

use crate::exporter::SimExport;
use crate::issuers::{CommandIssuer, IssuerView};
use crate::oracle::ReplayOracle;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorldFingerprint, DRIFTED_TRACK};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tempo_core::{
    CommandSource, RewindMode, TimeControlCommand, TimelineConfig, TimelineError, TimelineMetrics,
};
use tempo_env::{PlayerId, StepPacer, Tick};
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Steps executed
    pub total_steps: u64,

    /// Timeline tick at the end of the run
    pub final_tick: Tick,

    /// Timeline mode at the end of the run
    pub final_mode: RewindMode,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub commands_accepted: u64,
    pub commands_dropped: u64,
    pub commands_rejected: u64,
    pub rewinds: u64,
    pub entries_recorded: u64,
    pub entries_trimmed: u64,
    pub entries_truncated: u64,
    pub loads: u64,
    pub corrupt_loads: u64,
    pub ticks_replayed: u64,
}

impl From<&TimelineMetrics> for ScenarioMetrics {
    fn from(m: &TimelineMetrics) -> Self {
        Self {
            commands_accepted: m.commands_accepted,
            commands_dropped: m.commands_dropped,
            commands_rejected: m.commands_rejected,
            rewinds: m.rewinds_started,
            entries_recorded: m.entries_recorded,
            entries_trimmed: m.entries_trimmed,
            entries_truncated: m.entries_truncated,
            loads: m.loads,
            corrupt_loads: m.corrupt_loads,
            ticks_replayed: m.ticks_replayed,
        }
    }
}

type Check = Result<(), String>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Runs timeline scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Forward ticks before the scenario acts
    ticks: Tick,

    /// Retention window for every recording subsystem
    window_ticks: u32,

    /// Base timeline configuration
    timeline: TimelineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ticks: 120,
            window_ticks: 90,
            timeline: TimelineConfig::default(),
        }
    }

    /// Sets the forward run length.
    pub fn with_ticks(mut self, ticks: Tick) -> Self {
        self.ticks = ticks;
        self
    }

    /// Sets the retention window.
    pub fn with_window(mut self, window_ticks: u32) -> Self {
        self.window_ticks = window_ticks.max(10);
        self
    }

    /// Sets the base timeline configuration.
    pub fn with_timeline_config(mut self, config: TimelineConfig) -> Self {
        self.timeline = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario collecting one frame per step.
    pub fn run_exported(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let mut export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        export.scenario = scenario.name().to_string();
        export.seed = self.seed;
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let config = SimConfig {
            export,
            ..self.config_for(scenario)
        };
        let mut world = match SimWorld::new(config) {
            Ok(world) => world,
            Err(e) => {
                let result = ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_steps: 0,
                    final_tick: 0,
                    final_mode: RewindMode::Record,
                    failure_reason: Some(format!("setup failed: {}", e)),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, None);
            }
        };

        let outcome = match scenario {
            ScenarioId::CadenceWindow => self.run_cadence_window(&mut world),
            ScenarioId::RewindInWindow => self.run_rewind_in_window(&mut world),
            ScenarioId::RewindOutOfWindow => self.run_rewind_out_of_window(&mut world),
            ScenarioId::PriorityArbitration => self.run_priority_arbitration(&mut world),
            ScenarioId::IdempotentRewind => self.run_idempotent_rewind(&mut world),
            ScenarioId::TruncateOnResume => self.run_truncate_on_resume(&mut world),
            ScenarioId::StepBurst => self.run_step_burst(&mut world),
            ScenarioId::CorruptTrack => self.run_corrupt_track(&mut world),
            ScenarioId::ScrubSweep => self.run_scrub_sweep(&mut world),
            ScenarioId::ChaosIssuers => self.run_chaos_issuers(&mut world),
            ScenarioId::PacedFrames => self.run_paced_frames(&mut world),
        };

        if let Err(reason) = &outcome {
            warn!("{} failed: {}", scenario.name(), reason);
        }

        let metrics = world.timeline.metrics().clone();
        let mut export = world.export.take();
        if let Some(export) = export.as_mut() {
            export.finalize(outcome.is_ok(), outcome.clone().err(), metrics.clone());
        }

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_steps: world.steps(),
            final_tick: world.timeline.tick(),
            final_mode: world.timeline.mode(),
            failure_reason: outcome.err(),
            metrics: ScenarioMetrics::from(&metrics),
        };
        (result, export)
    }

    fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let mut config = SimConfig {
            seed: self.seed,
            window_ticks: self.window_ticks,
            timeline: self.timeline.clone(),
            drifted_track: false,
            export: false,
        };
        // Scenarios drive pause state themselves
        config.timeline.start_paused = false;
        match scenario {
            ScenarioId::CadenceWindow => config.window_ticks = 50,
            ScenarioId::ScrubSweep => config.timeline.rewind_ticks_per_step = 3,
            ScenarioId::RewindInWindow
            | ScenarioId::IdempotentRewind
            | ScenarioId::TruncateOnResume
            | ScenarioId::CorruptTrack => config.timeline.rewind_ticks_per_step = 0,
            _ => {}
        }
        config.drifted_track = scenario == ScenarioId::CorruptTrack;
        config
    }

    /// Forward run length, long enough for trimming to have started.
    fn horizon_ticks(&self, window: u32) -> Tick {
        self.ticks.max(Tick::from(window) + 30)
    }

    /// A rewind target inside the window that falls between the coarse
    /// tracks' entries, so loading it needs a replay.
    fn unaligned_target(world: &SimWorld) -> Tick {
        let oldest = world.timeline.oldest_rewindable().unwrap_or(0);
        let newest = world.timeline.tick().saturating_sub(1);
        (oldest + 13).min(newest).max(oldest)
    }

    fn oracle(world: &SimWorld, ticks: Tick) -> Result<ReplayOracle, String> {
        ReplayOracle::record(&world.config, ticks).map_err(|e| e.to_string())
    }

    fn rewind_to(world: &mut SimWorld, target: Tick) -> Check {
        world
            .timeline
            .submit(TimeControlCommand::start_rewind(target, CommandSource::Debug));
        let report = world.step();
        ensure(report.mode == RewindMode::Rewind, || {
            format!(
                "rewind to {} refused: {}",
                target,
                world
                    .timeline
                    .last_rejection()
                    .map_or("no reason".to_string(), |r| r.reason.clone())
            )
        })
    }

    fn stop_rewind(world: &mut SimWorld) {
        world
            .timeline
            .submit(TimeControlCommand::stop_rewind(CommandSource::Debug));
        world.step();
    }

    /// TMP-001: every track keeps exactly the cadence ticks inside its window.
    fn run_cadence_window(&self, world: &mut SimWorld) -> Check {
        info!("TMP-001: CadenceWindow - retention trimming");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        world.run_until(ticks);

        for recorder in world.timeline.tracks() {
            let def = recorder.definition();
            let expected: Vec<Tick> = if def.records() {
                (def.horizon(ticks)..=ticks)
                    .filter(|t| t % Tick::from(def.record_every_ticks) == 0)
                    .collect()
            } else {
                Vec::new()
            };
            let actual = recorder.history().ticks();
            ensure(actual == expected, || {
                format!("{} retained {:?}, expected {:?}", def.name, actual, expected)
            })?;
        }
        Ok(())
    }

    /// TMP-002: a rewind inside the window reproduces the oracle state.
    fn run_rewind_in_window(&self, world: &mut SimWorld) -> Check {
        info!("TMP-002: RewindInWindow");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let oracle = Self::oracle(world, ticks)?;
        world.run_until(ticks);

        let target = Self::unaligned_target(world);
        Self::rewind_to(world, target)?;

        let session = world
            .timeline
            .rewind_target()
            .copied()
            .ok_or_else(|| "no rewind target published".to_string())?;
        ensure(session.target_tick == target && session.origin_tick == ticks, || {
            format!("unexpected session {:?}", session)
        })?;
        ensure(world.timeline.tick() == target, || {
            format!("clock at {} after rewind to {}", world.timeline.tick(), target)
        })?;
        oracle.verify(target, &world.fingerprint())
    }

    /// TMP-003: a target older than the window is refused and nothing changes.
    fn run_rewind_out_of_window(&self, world: &mut SimWorld) -> Check {
        info!("TMP-003: RewindOutOfWindow");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        world.run_until(ticks);

        let oldest = world
            .timeline
            .oldest_rewindable()
            .ok_or_else(|| "no rewindable history".to_string())?;
        ensure(oldest > 0, || "window never trimmed".to_string())?;

        world
            .timeline
            .submit(TimeControlCommand::start_rewind(oldest - 1, CommandSource::Ui));
        let report = world.step();

        ensure(report.mode == RewindMode::Record, || format!("mode {} after refused rewind", report.mode))?;
        ensure(world.timeline.rewind_target().is_none(), || "rewind target set".to_string())?;
        let rejection = world
            .timeline
            .last_rejection()
            .ok_or_else(|| "no rejection published".to_string())?;
        ensure(rejection.reason.contains("retained window"), || {
            format!("unexpected rejection: {}", rejection.reason)
        })?;
        ensure(world.timeline.tick() == ticks + 1, || "recording stalled".to_string())
    }

    /// TMP-004: priority first, then source rank, then submission order.
    fn run_priority_arbitration(&self, world: &mut SimWorld) -> Check {
        info!("TMP-004: PriorityArbitration");
        world.run(10);

        let speed = TimeControlCommand::set_speed(2.0, CommandSource::Script).with_priority(5);
        let pause = TimeControlCommand::pause(CommandSource::Ui).with_priority(10);

        for (first, second) in [(speed, pause), (pause, speed)] {
            world.timeline.submit(first);
            world.timeline.submit(second);
            let report = world.step();
            let state = world.timeline.tick_state();
            ensure(state.is_paused && state.speed_multiplier == 1.0, || {
                format!("pause lost to speed change: {:?}", state)
            })?;
            ensure(!report.advanced, || "paused step advanced".to_string())?;

            world.timeline.submit(TimeControlCommand::resume(CommandSource::Debug));
            world.step();
        }

        world.timeline.submit(TimeControlCommand::pause(CommandSource::Debug));
        world.step();

        // Equal priority: Player outranks Ui by default
        world.timeline.submit(TimeControlCommand::pause(CommandSource::Ui).with_priority(3));
        world.timeline.submit(TimeControlCommand::resume(CommandSource::Player).with_priority(3));
        world.timeline.submit(TimeControlCommand::pause(CommandSource::Ui).with_priority(3));
        world.step();
        ensure(!world.timeline.tick_state().is_paused, || "source ranking ignored".to_string())?;

        // A player's own command applies only when it outranks the global winner
        let player = PlayerId::from_seed(self.seed);
        world
            .timeline
            .submit(TimeControlCommand::pause(CommandSource::Player).with_priority(9).for_player(player));
        world.timeline.submit(TimeControlCommand::set_speed(1.5, CommandSource::Ui).with_priority(1));
        world
            .timeline
            .submit(TimeControlCommand::start_rewind(0, CommandSource::Player).with_priority(10).for_player(player));
        let report = world.step();

        ensure(report.accepted.len() == 2, || format!("accepted {:?}", report.accepted))?;
        ensure(report.dropped == 1, || format!("dropped {}", report.dropped))?;
        ensure(world.timeline.player_view(player).is_paused, || "player view not paused".to_string())?;
        ensure(world.timeline.tick_state().speed_multiplier == 1.5, || "global speed not applied".to_string())?;
        ensure(world.timeline.mode() == RewindMode::Record, || "per-player rewind leaked".to_string())
    }

    /// TMP-005: rewind, scrub away, scrub back. Same state both times.
    fn run_idempotent_rewind(&self, world: &mut SimWorld) -> Check {
        info!("TMP-005: IdempotentRewind");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let oracle = Self::oracle(world, ticks)?;
        world.run_until(ticks);

        let target = Self::unaligned_target(world);
        Self::rewind_to(world, target)?;
        let first = (world.timeline.tick_state(), world.fingerprint());

        world.timeline.submit(TimeControlCommand::scrub_to(ticks, CommandSource::Debug));
        world.step();
        oracle.verify(ticks, &world.fingerprint())?;

        world.timeline.submit(TimeControlCommand::scrub_to(target, CommandSource::Debug));
        world.step();
        let second = (world.timeline.tick_state(), world.fingerprint());

        ensure(first == second, || format!("second visit to {} differs", target))?;
        oracle.verify(target, &second.1)
    }

    /// TMP-006: StopRewind drops the abandoned future and replay is exact.
    fn run_truncate_on_resume(&self, world: &mut SimWorld) -> Check {
        info!("TMP-006: TruncateOnResume");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let oracle = Self::oracle(world, ticks)?;
        world.run_until(ticks);

        let target = Self::unaligned_target(world);
        Self::rewind_to(world, target)?;
        Self::stop_rewind(world);

        ensure(world.timeline.tick() == target + 1, || {
            format!("resumed at {} instead of {}", world.timeline.tick(), target + 1)
        })?;
        for recorder in world.timeline.tracks() {
            let newest = recorder.history().newest_tick();
            ensure(newest.map_or(true, |t| t <= target + 1), || {
                format!("{} kept future entry {:?}", recorder.definition().name, newest)
            })?;
        }
        ensure(world.timeline.metrics().entries_truncated > 0, || "nothing truncated".to_string())?;

        world.run_until(ticks);
        oracle.verify(ticks, &world.fingerprint())?;

        let audio = world.audio().ok_or_else(|| "audio missing".to_string())?;
        ensure(audio.suppressed > 0, || "replayed cues were not suppressed".to_string())
    }

    /// TMP-007: StepTicks(N) runs N ticks while paused and appends nothing.
    fn run_step_burst(&self, world: &mut SimWorld) -> Check {
        info!("TMP-007: StepBurst");
        const BURST: u32 = 5;
        let start = self.horizon_ticks(world.config.window_ticks) / 2;
        let end = start + Tick::from(BURST);
        let oracle = Self::oracle(world, end + 10)?;
        world.run_until(start);

        world.timeline.submit(TimeControlCommand::pause(CommandSource::Debug));
        world.step();
        let before = world.history_lengths();

        world
            .timeline
            .submit(TimeControlCommand::step_ticks(BURST, CommandSource::Debug));
        for i in 0..BURST {
            let report = world.step();
            ensure(report.advanced && report.recorded == 0, || {
                format!("burst tick {} advanced={} recorded={}", i, report.advanced, report.recorded)
            })?;
        }

        ensure(world.timeline.mode() == RewindMode::Record, || "burst never finished".to_string())?;
        ensure(world.timeline.tick_state().is_paused, || "burst unpaused the clock".to_string())?;
        ensure(world.timeline.tick() == end, || format!("burst ended at {}", world.timeline.tick()))?;
        let after = world.history_lengths();
        ensure(after.iter().zip(&before).all(|(a, b)| a <= b), || {
            format!("history grew during burst: {:?} -> {:?}", before, after)
        })?;
        oracle.verify(end, &world.fingerprint())?;

        // Burst ticks were never recorded; a rewind onto one replays them
        world.timeline.submit(TimeControlCommand::resume(CommandSource::Debug));
        world.run_until(end + 10);
        let inside = start + 2;
        Self::rewind_to(world, inside)?;
        oracle.verify(inside, &world.fingerprint())?;
        Self::stop_rewind(world);
        world.run_until(end + 10);
        oracle.verify(end + 10, &world.fingerprint())
    }

    /// TMP-008: a corrupt track is disabled for the session, others load.
    fn run_corrupt_track(&self, world: &mut SimWorld) -> Check {
        info!("TMP-008: CorruptTrack");
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let oracle = Self::oracle(world, ticks)?;
        world.run_until(ticks);

        let target = Self::unaligned_target(world);
        world
            .timeline
            .submit(TimeControlCommand::start_rewind(target, CommandSource::Debug));
        let report = world.step();

        ensure(
            matches!(
                report.corrupt.as_slice(),
                [TimelineError::CorruptHistory { track, .. }] if *track == DRIFTED_TRACK
            ),
            || format!("corrupt report {:?}", report.corrupt),
        )?;
        ensure(report.loaded == 3, || format!("only {} tracks loaded", report.loaded))?;
        oracle.verify(target, &world.fingerprint())?;

        world
            .timeline
            .submit(TimeControlCommand::scrub_to((target + 10).min(ticks), CommandSource::Debug));
        let report = world.step();
        ensure(report.corrupt.is_empty(), || "corrupt track retried".to_string())?;

        Self::stop_rewind(world);
        let usable = world
            .timeline
            .track(DRIFTED_TRACK)
            .map(|t| t.status().is_usable())
            .map_err(|e| e.to_string())?;
        ensure(usable, || "status not reset after rewind".to_string())
    }

    /// TMP-009: the cursor walks toward the target at a fixed rate.
    fn run_scrub_sweep(&self, world: &mut SimWorld) -> Check {
        info!("TMP-009: ScrubSweep");
        let rate = Tick::from(world.config.timeline.rewind_ticks_per_step);
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let oracle = Self::oracle(world, ticks)?;
        world.run_until(ticks);

        let target = world
            .timeline
            .oldest_rewindable()
            .ok_or_else(|| "no history".to_string())?;
        let before = world.history_lengths();
        world
            .timeline
            .submit(TimeControlCommand::start_rewind(target, CommandSource::Debug));

        let mut cursor = ticks;
        let mut moves = 0;
        while cursor != target && moves <= ticks {
            world.step();
            let next = world
                .timeline
                .rewind_target()
                .map(|r| r.cursor_tick)
                .ok_or_else(|| "rewind session lost".to_string())?;
            let expected = cursor.saturating_sub(rate).max(target);
            ensure(next == expected, || format!("cursor {} -> {}, expected {}", cursor, next, expected))?;
            ensure(world.timeline.tick() == next, || "clock does not follow cursor".to_string())?;
            oracle.verify(next, &world.fingerprint())?;
            cursor = next;
            moves += 1;
        }
        debug!("Sweep reached tick {} in {} moves", target, moves);

        ensure(world.history_lengths() == before, || "history changed during sweep".to_string())?;
        Self::stop_rewind(world);
        Ok(())
    }

    /// TMP-010: random issuers; invariants hold every step and runs replay.
    fn run_chaos_issuers(&self, world: &mut SimWorld) -> Check {
        info!("TMP-010: ChaosIssuers");
        let first = self.chaos_loop(world)?;

        let mut twin = SimWorld::new(SimConfig {
            export: false,
            ..world.config.clone()
        })
        .map_err(|e| e.to_string())?;
        let second = self.chaos_loop(&mut twin)?;

        ensure(first == second, || "same seed produced different runs".to_string())?;
        ensure(world.timeline.metrics().commands_accepted > 0, || "no command accepted".to_string())
    }

    fn chaos_loop(&self, world: &mut SimWorld) -> Result<(WorldFingerprint, TimelineMetrics), String> {
        let steps = self.horizon_ticks(world.config.window_ticks) * 2;
        let mut issuers = CommandIssuer::cast(self.seed, 0.08);
        let mut prev_tick = world.timeline.tick();
        let mut prev_mode = world.timeline.mode();

        for _ in 0..steps {
            let view = IssuerView::from_published(&world.timeline.published(), world.timeline.oldest_rewindable());
            for issuer in &mut issuers {
                if let Some(command) = issuer.issue(&view) {
                    world.timeline.submit(command);
                }
            }

            let report = world.step();

            if report.advanced && prev_mode != RewindMode::Rewind && report.mode != RewindMode::Rewind {
                ensure(report.tick == prev_tick + 1, || {
                    format!("tick jumped {} -> {} in {}", prev_tick, report.tick, report.mode)
                })?;
            }
            ensure(report.recorded == 0 || report.mode == RewindMode::Record, || {
                format!("history appended in {} at tick {}", report.mode, report.tick)
            })?;
            if let Some(session) = world.timeline.rewind_target() {
                ensure(session.target_tick <= session.origin_tick, || format!("bad session {:?}", session))?;
            }
            for recorder in world.timeline.tracks() {
                let horizon = recorder.definition().horizon(report.tick);
                let oldest = recorder.history().oldest_tick();
                ensure(oldest.map_or(true, |o| o >= horizon || report.mode == RewindMode::Rewind), || {
                    format!("{} kept {:?} past horizon {}", recorder.definition().name, oldest, horizon)
                })?;
            }

            prev_tick = report.tick;
            prev_mode = report.mode;
        }

        if world.timeline.mode() == RewindMode::Rewind {
            Self::stop_rewind(world);
        }
        Ok((world.fingerprint(), world.timeline.metrics().clone()))
    }

    /// TMP-011: jittered frames through the pacer, then one long hitch.
    fn run_paced_frames(&self, world: &mut SimWorld) -> Check {
        info!("TMP-011: PacedFrames");
        const CATCH_UP: u32 = 4;
        let ticks = self.horizon_ticks(world.config.window_ticks);
        let fixed_dt = world.config.timeline.fixed_delta_time;
        let mut pacer = StepPacer::new(fixed_dt, CATCH_UP).map_err(|e| e.to_string())?;
        let ctx = world.context.clone();
        let base = Duration::from_secs_f64(fixed_dt);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| e.to_string())?;

        let smooth = runtime.block_on(world.run_paced(&*ctx, &mut pacer, ticks, ticks * 10, || {
            ctx.jittered(base, 0.25)
        }));
        ensure(world.timeline.tick() >= ticks, || {
            format!("reached tick {} of {}", world.timeline.tick(), ticks)
        })?;
        ensure(smooth.steps == world.timeline.tick(), || {
            format!("{} steps for {} ticks", smooth.steps, world.timeline.tick())
        })?;

        let before = world.timeline.tick();
        let hitch = runtime.block_on(world.run_paced(&*ctx, &mut pacer, Tick::MAX, 1, || Duration::from_secs(1)));
        ensure(hitch.max_steps_in_frame == CATCH_UP, || {
            format!("hitch released {} steps", hitch.max_steps_in_frame)
        })?;
        ensure(hitch.dropped_secs > 0.0, || "hitch backlog not dropped".to_string())?;
        ensure(world.timeline.tick() == before + Tick::from(CATCH_UP), || "hitch steps lost".to_string())
    }
}
