//! Tempo Core - Deterministic Simulation Clock with Record and Rewind
//!
//! The crate is built leaf-first from five pieces:
//! 1. **SnapshotCodec**: fixed-layout binary payloads for history entries
//! 2. **TrackRegistry**: per-subsystem history tracks with cadence and window trimming
//! 3. **TickClock**: the single authority on the current tick
//! 4. **ModeController**: Record / Rewind / Step transitions
//! 5. **CommandArbiter**: deterministic ranking of time-control requests
//!
//! [`Timeline`] owns all five and runs them in a fixed order every step.

pub mod arbiter;
pub mod clock;
pub mod codec;
pub mod collaborator;
pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mode;
pub mod registry;
pub mod timeline;
pub mod track;

// Re-export key types for convenience
pub use arbiter::{CommandArbiter, CommandIntake, PendingCommand, Resolution};
pub use clock::{SpeedChange, TickClock, TickState, MIN_SPEED};
pub use codec::{CodecError, SnapshotField, SnapshotReader, SnapshotWriter};
pub use collaborator::TimeAware;
pub use command::{CommandKind, CommandScope, CommandSource, SourceRanking, TimeControlCommand};
pub use config::TimelineConfig;
pub use error::TimelineError;
pub use metrics::TimelineMetrics;
pub use mode::{ModeController, RewindMode, RewindTarget};
pub use registry::TrackRegistry;
pub use timeline::{PlayerView, PublishedState, Rejection, StepReport, Timeline};
pub use track::{HistoryEntry, TrackDefinition, TrackRecorder, TrackStatus};

pub use tempo_env::{PlayerId, Tick, TrackId};
