//! Demo collaborators that exercise the timeline.
//!
//! Each subsystem records at a different cadence so a single world covers
//! fine, coarse and never-recorded tracks:
//!
//! | subsystem        | cadence | state                          |
//! |------------------|---------|--------------------------------|
//! | `OrbitalBody`    | 1       | position and velocity          |
//! | `MiningRig`      | 5       | ore total from seeded yields   |
//! | `VegetationPlot` | 10      | growth cells and moisture      |
//! | `AudioCues`      | 0       | nothing; side effects only     |

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use tempo_core::{CodecError, SnapshotReader, SnapshotWriter, TickState, TimeAware, TrackDefinition};
use tempo_env::{Tick, TrackId};
use tracing::debug;

pub const ORBIT_EVERY: u32 = 1;
pub const MINING_EVERY: u32 = 5;
pub const VEGETATION_EVERY: u32 = 10;

/// FNV-1a hash of a collaborator's current snapshot payload.
pub fn fingerprint(collaborator: &dyn TimeAware) -> u64 {
    let mut writer = SnapshotWriter::new();
    collaborator.save(&mut writer);
    writer
        .bytes()
        .iter()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

// =============================================================================
// ORBIT
// =============================================================================

/// A body on a Keplerian orbit around the origin.
#[derive(Debug, Clone)]
pub struct OrbitalBody {
    def: TrackDefinition,

    /// Position in metres
    pub position: Vector3<f64>,

    /// Velocity in m/s
    pub velocity: Vector3<f64>,

    /// Gravitational parameter of the central mass
    mu: f64,
}

impl OrbitalBody {
    const VERSION: u16 = 1;

    /// Circular orbit of radius `radius` in the XY plane.
    pub fn new(id: TrackId, window_ticks: u32, radius: f64) -> Self {
        let mu = 4.0e5;
        let speed = (mu / radius).sqrt();
        Self {
            def: TrackDefinition::new(id, "orbital_body", ORBIT_EVERY, window_ticks),
            position: Vector3::new(radius, 0.0, 0.0),
            velocity: Vector3::new(0.0, speed, 0.0),
            mu,
        }
    }

    pub fn radius(&self) -> f64 {
        self.position.norm()
    }
}

impl TimeAware for OrbitalBody {
    fn definition(&self) -> TrackDefinition {
        self.def.clone()
    }

    fn on_tick(&mut self, _tick: Tick, state: &TickState) {
        // Semi-implicit Euler keeps the orbit bounded
        let dt = state.fixed_delta_time;
        let r = self.position.norm();
        let accel = -self.mu * self.position / (r * r * r);
        self.velocity += accel * dt;
        self.position += self.velocity * dt;
    }

    fn save(&self, writer: &mut SnapshotWriter) {
        writer.begin(Self::VERSION);
        writer
            .write(&[self.position.x, self.position.y, self.position.z])
            .write(&[self.velocity.x, self.velocity.y, self.velocity.z]);
    }

    fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
        reader.expect_version(Self::VERSION)?;
        let [px, py, pz]: [f64; 3] = reader.read()?;
        let [vx, vy, vz]: [f64; 3] = reader.read()?;
        self.position = Vector3::new(px, py, pz);
        self.velocity = Vector3::new(vx, vy, vz);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// MINING
// =============================================================================

/// Accumulates ore with a yield drawn from a per-tick seeded stream.
///
/// The yield for a tick depends only on the seed and the tick, so a replay
/// after a rewind mines exactly what the original run mined.
#[derive(Debug, Clone)]
pub struct MiningRig {
    def: TrackDefinition,
    seed: u64,
    pub ore: u64,
    pub shifts: u32,
}

impl MiningRig {
    const VERSION: u16 = 1;

    pub fn new(id: TrackId, window_ticks: u32, seed: u64) -> Self {
        Self {
            def: TrackDefinition::new(id, "mining_rig", MINING_EVERY, window_ticks),
            seed,
            ore: 0,
            shifts: 0,
        }
    }

    /// Ore mined on `tick`.
    pub fn yield_at(&self, tick: Tick) -> u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ tick.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        rng.gen_range(1..=6)
    }
}

impl TimeAware for MiningRig {
    fn definition(&self) -> TrackDefinition {
        self.def.clone()
    }

    fn on_tick(&mut self, tick: Tick, _state: &TickState) {
        self.ore += self.yield_at(tick);
        self.shifts += 1;
    }

    fn save(&self, writer: &mut SnapshotWriter) {
        writer.begin(Self::VERSION);
        writer.write(&self.ore).write(&self.shifts);
    }

    fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
        reader.expect_version(Self::VERSION)?;
        self.ore = reader.read()?;
        self.shifts = reader.read()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// VEGETATION
// =============================================================================

/// A plot of growth cells with a slowly drifting moisture level.
#[derive(Debug, Clone)]
pub struct VegetationPlot {
    def: TrackDefinition,
    pub growth: [u32; 8],
    pub moisture: f32,
}

impl VegetationPlot {
    const VERSION: u16 = 2;

    pub fn new(id: TrackId, window_ticks: u32) -> Self {
        Self {
            def: TrackDefinition::new(id, "vegetation_plot", VEGETATION_EVERY, window_ticks),
            growth: [0; 8],
            moisture: 0.5,
        }
    }

    /// Sum of all growth cells.
    pub fn canopy(&self) -> u64 {
        self.growth.iter().map(|g| u64::from(*g)).sum()
    }
}

impl TimeAware for VegetationPlot {
    fn definition(&self) -> TrackDefinition {
        self.def.clone()
    }

    fn on_tick(&mut self, tick: Tick, _state: &TickState) {
        for (i, cell) in self.growth.iter_mut().enumerate() {
            *cell = cell.saturating_add(((tick as usize + i) % 3) as u32);
        }
        self.moisture = self.moisture * 0.99 + 0.01 * (tick % 7) as f32 / 6.0;
    }

    fn save(&self, writer: &mut SnapshotWriter) {
        writer.begin(Self::VERSION);
        writer.write(&self.growth).write(&self.moisture);
    }

    fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
        reader.expect_version(Self::VERSION)?;
        self.growth = reader.read()?;
        self.moisture = reader.read()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// AUDIO
// =============================================================================

/// Plays a cue every `cue_every` ticks. Records nothing.
///
/// Cues are muted for the duration of a rewind session, and a cue for a
/// tick that was already heard is suppressed when the timeline replays it.
#[derive(Debug, Clone)]
pub struct AudioCues {
    def: TrackDefinition,
    cue_every: Tick,
    high_water: Tick,
    muted: bool,
    pub played: u64,
    pub suppressed: u64,
}

impl AudioCues {
    pub fn new(id: TrackId, cue_every: Tick) -> Self {
        Self {
            def: TrackDefinition::new(id, "audio_cues", 0, 0),
            cue_every: cue_every.max(1),
            high_water: 0,
            muted: false,
            played: 0,
            suppressed: 0,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl TimeAware for AudioCues {
    fn definition(&self) -> TrackDefinition {
        self.def.clone()
    }

    fn on_tick(&mut self, tick: Tick, _state: &TickState) {
        if tick % self.cue_every != 0 {
            return;
        }
        if self.muted || tick <= self.high_water {
            self.suppressed += 1;
        } else {
            self.played += 1;
            self.high_water = tick;
        }
    }

    fn save(&self, writer: &mut SnapshotWriter) {
        writer.clear();
    }

    fn load(&mut self, _reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
        Ok(())
    }

    fn on_rewind_start(&mut self) {
        self.muted = true;
    }

    fn on_rewind_end(&mut self) {
        self.muted = false;
        debug!("Audio resumed; cues up to tick {} will not replay", self.high_water);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// SCHEMA DRIFT
// =============================================================================

/// A ledger whose reader was bumped to v2 while its writer still emits v1.
///
/// Every load fails, which is exactly what the corrupt-track scenario needs.
#[derive(Debug, Clone)]
pub struct DriftedLedger {
    def: TrackDefinition,
    pub entries: u64,
}

impl DriftedLedger {
    pub fn new(id: TrackId, window_ticks: u32) -> Self {
        Self {
            def: TrackDefinition::new(id, "drifted_ledger", 1, window_ticks),
            entries: 0,
        }
    }
}

impl TimeAware for DriftedLedger {
    fn definition(&self) -> TrackDefinition {
        self.def.clone()
    }

    fn on_tick(&mut self, _tick: Tick, _state: &TickState) {
        self.entries += 1;
    }

    fn save(&self, writer: &mut SnapshotWriter) {
        writer.begin(1);
        writer.write(&self.entries);
    }

    fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError> {
        reader.expect_version(2)?;
        self.entries = reader.read()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
