//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::subsystems::{fingerprint, AudioCues, DriftedLedger, MiningRig, OrbitalBody, VegetationPlot};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tempo_core::{StepReport, Timeline, TimelineConfig};
use tempo_env::{StepPacer, Tick, TimeContext, TrackId};
use tracing::debug;

pub const ORBIT_TRACK: TrackId = TrackId(1);
pub const MINING_TRACK: TrackId = TrackId(2);
pub const VEGETATION_TRACK: TrackId = TrackId(3);
pub const AUDIO_TRACK: TrackId = TrackId(4);
pub const DRIFTED_TRACK: TrackId = TrackId(9);

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Retention window applied to every recording subsystem
    pub window_ticks: u32,

    /// Timeline configuration
    pub timeline: TimelineConfig,

    /// Register a subsystem whose history never decodes
    pub drifted_track: bool,

    /// Collect a frame per step
    pub export: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            window_ticks: 90,
            timeline: TimelineConfig::default(),
            drifted_track: false,
            export: false,
        }
    }
}

/// Per-subsystem state hashes at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldFingerprint {
    pub orbit: u64,
    pub mining: u64,
    pub vegetation: u64,
}

impl WorldFingerprint {
    /// Single hash for all recorded subsystems.
    pub fn combined(&self) -> u64 {
        self.orbit
            .rotate_left(1)
            ^ self.mining.rotate_left(17)
            ^ self.vegetation.rotate_left(33)
    }
}

/// Summary of a paced frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PacedSummary {
    pub frames: u64,
    pub steps: u64,
    /// Largest number of steps released by one frame
    pub max_steps_in_frame: u32,
    /// Simulation seconds discarded by the catch-up cap
    pub dropped_secs: f64,
}

/// The SimWorld - a timeline plus the demo subsystems registered on it.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// The timeline under test
    pub timeline: Timeline,

    /// Frames collected when `config.export` is set
    pub export: Option<SimExport>,

    /// Steps run so far
    steps: u64,
}

impl SimWorld {
    /// Creates a world with the standard subsystems registered at tick 0.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        // Separate streams so adding jitter never changes mining yields
        let context_seed = config.seed;
        let mining_seed = config.seed.wrapping_mul(0x9e37_79b9_7f4a_7c15);

        let mut timeline = Timeline::new(config.timeline.clone())?;
        let window = config.window_ticks;
        timeline.register(Box::new(OrbitalBody::new(ORBIT_TRACK, window, 1000.0)))?;
        timeline.register(Box::new(MiningRig::new(MINING_TRACK, window, mining_seed)))?;
        timeline.register(Box::new(VegetationPlot::new(VEGETATION_TRACK, window)))?;
        timeline.register(Box::new(AudioCues::new(AUDIO_TRACK, 15)))?;
        if config.drifted_track {
            timeline.register(Box::new(DriftedLedger::new(DRIFTED_TRACK, window)))?;
        }

        Ok(Self {
            context: SimContext::shared(context_seed),
            timeline,
            export: config.export.then(|| SimExport::new("adhoc", config.seed)),
            config,
            steps: 0,
        })
    }

    /// Advances virtual time by one fixed step and runs one timeline step.
    pub fn step(&mut self) -> StepReport {
        let dt = self.config.timeline.fixed_delta_time;
        self.context.advance_time(Duration::from_secs_f64(dt));
        let report = self.timeline.step_fixed();
        self.after_step(&report);
        report
    }

    /// Runs one timeline step with an externally measured wall delta.
    pub fn step_wall(&mut self, wall_dt: f64) -> StepReport {
        let report = self.timeline.step(wall_dt);
        self.after_step(&report);
        report
    }

    /// Runs `steps` fixed steps.
    pub fn run(&mut self, steps: u64) -> Vec<StepReport> {
        (0..steps).map(|_| self.step()).collect()
    }

    /// Runs fixed steps until the timeline reaches `tick`.
    ///
    /// Gives up after `tick` steps without progress (paused timeline).
    pub fn run_until(&mut self, tick: Tick) -> Tick {
        let mut idle = 0;
        while self.timeline.tick() < tick && idle <= tick {
            if !self.step().advanced {
                idle += 1;
            }
        }
        self.timeline.tick()
    }

    fn after_step(&mut self, report: &StepReport) {
        self.steps += 1;
        if self.steps % 30 == 0 {
            debug!(
                "  step={} | tick={} | mode={} | ore={}",
                self.steps,
                report.tick,
                report.mode,
                self.mining().map_or(0, |m| m.ore)
            );
        }
        if self.export.is_none() {
            return;
        }

        let mut frame = SimFrame::from_report(self.steps, &self.timeline.tick_state(), report);
        if let Some(orbit) = self.orbit() {
            frame.orbit = [orbit.position.x, orbit.position.y, orbit.position.z];
        }
        frame.ore = self.mining().map_or(0, |m| m.ore);
        frame.canopy = self.vegetation().map_or(0, |v| v.canopy());
        if let Some(export) = self.export.as_mut() {
            export.add_frame(frame);
        }
    }

    /// Drives the world from a frame loop on any time context.
    ///
    /// Each frame sleeps for `frame()` on `ctx`, measures the elapsed time
    /// and lets `pacer` decide how many fixed steps to run.
    pub async fn run_paced<C, F>(
        &mut self,
        ctx: &C,
        pacer: &mut StepPacer,
        target_tick: Tick,
        max_frames: u64,
        mut frame: F,
    ) -> PacedSummary
    where
        C: TimeContext + ?Sized,
        F: FnMut() -> Duration,
    {
        let mut summary = PacedSummary::default();

        while self.timeline.tick() < target_tick && summary.frames < max_frames {
            let before = ctx.now();
            ctx.sleep(frame()).await;
            let wall = ctx.now().saturating_sub(before);

            let paced = pacer.frame(wall, self.timeline.tick_state().speed_multiplier);
            for _ in 0..paced.steps {
                self.step_wall(paced.wall_dt_per_step);
            }

            summary.frames += 1;
            summary.steps += u64::from(paced.steps);
            summary.max_steps_in_frame = summary.max_steps_in_frame.max(paced.steps);
            summary.dropped_secs += paced.dropped_secs;
        }
        summary
    }

    pub fn orbit(&self) -> Option<&OrbitalBody> {
        self.timeline.collaborator(ORBIT_TRACK)
    }

    pub fn mining(&self) -> Option<&MiningRig> {
        self.timeline.collaborator(MINING_TRACK)
    }

    pub fn vegetation(&self) -> Option<&VegetationPlot> {
        self.timeline.collaborator(VEGETATION_TRACK)
    }

    pub fn audio(&self) -> Option<&AudioCues> {
        self.timeline.collaborator(AUDIO_TRACK)
    }

    /// Hashes of every recorded standard subsystem.
    pub fn fingerprint(&self) -> WorldFingerprint {
        WorldFingerprint {
            orbit: self.orbit().map_or(0, |c| fingerprint(c)),
            mining: self.mining().map_or(0, |c| fingerprint(c)),
            vegetation: self.vegetation().map_or(0, |c| fingerprint(c)),
        }
    }

    /// Retained entry count per track, in registration order.
    pub fn history_lengths(&self) -> Vec<usize> {
        self.timeline.tracks().map(|t| t.history().len()).collect()
    }

    /// Steps run so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempo_core::{CommandSource, TimeControlCommand};

    #[test]
    fn test_sim_world_creation() {
        let world = SimWorld::new(SimConfig::default()).unwrap();

        assert_eq!(world.timeline.tracks().count(), 4);
        // Every recording track captured tick 0, audio never records
        assert_eq!(world.history_lengths(), vec![1, 1, 1, 0]);
    }

    #[test]
    fn test_sim_world_step() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        assert_eq!(world.timeline.tick(), 0);

        world.step();

        assert_eq!(world.timeline.tick(), 1);
        assert_relative_eq!(world.context.now().as_secs_f64(), 1.0 / 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sim_world_determinism() {
        let mut a = SimWorld::new(SimConfig::default()).unwrap();
        let mut b = SimWorld::new(SimConfig::default()).unwrap();
        a.run(64);
        b.run(64);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = SimWorld::new(SimConfig {
            seed: 43,
            ..Default::default()
        })
        .unwrap();
        c.run(64);
        let (rig_a, rig_c) = (a.mining().unwrap(), c.mining().unwrap());
        assert!((1..=64).any(|tick| rig_a.yield_at(tick) != rig_c.yield_at(tick)));
        assert_eq!(a.fingerprint().orbit, c.fingerprint().orbit);
    }

    #[test]
    fn test_run_until_stops_on_pause() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.timeline.submit(TimeControlCommand::pause(CommandSource::Debug));
        assert_eq!(world.run_until(10), 0);
    }

    #[test]
    fn test_export_collects_frames() {
        let mut world = SimWorld::new(SimConfig {
            export: true,
            ..Default::default()
        })
        .unwrap();
        world.run(5);

        let export = world.export.as_ref().unwrap();
        assert_eq!(export.frames.len(), 5);
        assert_eq!(export.frames[4].tick, 5);
        assert!(export.frames[4].ore > 0);
    }

    #[tokio::test]
    async fn test_paced_run_reaches_target() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let ctx = SimContext::new(5);
        let mut pacer = StepPacer::from_rate_hz(30, 4).unwrap();

        let summary = world
            .run_paced(&ctx, &mut pacer, 30, 1_000, || Duration::from_millis(50))
            .await;

        assert!(world.timeline.tick() >= 30);
        assert_eq!(summary.steps, world.timeline.tick());
        assert!(summary.max_steps_in_frame <= 4);
    }
}
