//! Collaborator contract for subsystems that take part in rewind.

use crate::clock::TickState;
use crate::codec::{CodecError, SnapshotReader, SnapshotWriter};
use crate::track::TrackDefinition;
use std::any::Any;
use tempo_env::Tick;

/// A subsystem whose state follows the timeline.
///
/// The timeline calls these hooks in registration order:
///
/// - `on_tick` once per forward tick (Record and Step modes), and again
///   while rewinding for each tick between a loaded entry and the cursor
/// - `save` when the track's cadence says this tick is recorded
/// - `load` whenever the rewind cursor moves, with the latest entry at or
///   before the cursor
/// - `on_rewind_start` / `on_rewind_end` around each rewind session
pub trait TimeAware: Send {
    /// Track this subsystem records into. Read once at registration.
    fn definition(&self) -> TrackDefinition;

    /// Advances subsystem state for `tick`.
    fn on_tick(&mut self, tick: Tick, state: &TickState);

    /// Serializes exactly the state needed to resume after a rewind.
    ///
    /// Start the payload with `writer.begin(VERSION)`.
    fn save(&self, writer: &mut SnapshotWriter);

    /// Restores state from a payload produced by `save`.
    fn load(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), CodecError>;

    fn on_rewind_start(&mut self) {}

    fn on_rewind_end(&mut self) {}

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}
