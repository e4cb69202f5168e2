//! Replay oracle for simulation.
//!
//! The oracle runs an identical world forward only, never rewinding, and
//! keeps the fingerprint of every tick. A world that rewinds and replays
//! must match the oracle at every tick it lands on.

use crate::error::SimError;
use crate::world::{SimConfig, SimWorld, WorldFingerprint};
use tempo_env::Tick;

/// Forward-only reference run.
pub struct ReplayOracle {
    /// Fingerprint per tick, indexed by tick
    fingerprints: Vec<WorldFingerprint>,
}

impl ReplayOracle {
    /// Records `ticks` forward ticks of a world built from `config`.
    ///
    /// Export, the drifted track and any rewind settings are ignored.
    pub fn record(config: &SimConfig, ticks: Tick) -> Result<Self, SimError> {
        let mut world = SimWorld::new(SimConfig {
            drifted_track: false,
            export: false,
            ..config.clone()
        })?;
        if world.timeline.tick_state().is_paused {
            return Err(SimError::Runtime("oracle world must not start paused".to_string()));
        }

        let mut fingerprints = Vec::with_capacity(ticks as usize + 1);
        fingerprints.push(world.fingerprint());
        for _ in 0..ticks {
            world.step();
            fingerprints.push(world.fingerprint());
        }
        Ok(Self { fingerprints })
    }

    /// Fingerprint at `tick`, if recorded.
    pub fn at(&self, tick: Tick) -> Option<WorldFingerprint> {
        self.fingerprints.get(tick as usize).copied()
    }

    /// Last recorded tick.
    pub fn horizon(&self) -> Tick {
        self.fingerprints.len().saturating_sub(1) as Tick
    }

    /// Compares every subsystem against the reference at `tick`.
    pub fn verify(&self, tick: Tick, actual: &WorldFingerprint) -> Result<(), String> {
        match self.at(tick) {
            Some(expected) if expected == *actual => Ok(()),
            Some(expected) => Err(format!(
                "state diverged at tick {}: expected {:016x}, got {:016x}",
                tick,
                expected.combined(),
                actual.combined()
            )),
            None => Err(format!("oracle has no tick {} (horizon {})", tick, self.horizon())),
        }
    }
}
