//! Error types for the Tempo timeline.

use crate::codec::CodecError;
use crate::mode::RewindMode;
use tempo_env::{Tick, TrackId};
use thiserror::Error;

/// Errors raised by timeline operations.
///
/// None of these halt the simulation: a failed command leaves the clock
/// and mode untouched, a corrupt track is isolated from the rest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    /// Rewind target is older than a required track's retained history
    #[error("tick {target} is outside the retained window of {track} (oldest retained: {oldest:?})")]
    OutOfWindow {
        target: Tick,
        oldest: Option<Tick>,
        track: TrackId,
    },
    
    /// Rewind target lies after the newest simulated tick
    #[error("tick {target} is in the future (current tick {current})")]
    FutureTarget { target: Tick, current: Tick },
    
    /// A payload did not match the reader's layout
    #[error("corrupt history on {track}: {source}")]
    CorruptHistory {
        track: TrackId,
        #[source]
        source: CodecError,
    },
    
    /// `advance` called twice within one step
    #[error("clock advanced twice within one step at tick {tick}")]
    DoubleAdvance { tick: Tick },
    
    /// Operation requires Record mode
    #[error("operation requires Record mode (current mode: {mode})")]
    NotRecording { mode: RewindMode },
    
    /// Operation requires an active rewind session
    #[error("no rewind session is active")]
    NotRewinding,
    
    /// StepTicks with a zero count
    #[error("step count must be positive")]
    InvalidStep,
    
    /// Command kind not allowed in per-player scope
    #[error("{0} requires global scope")]
    GlobalOnly(&'static str),
    
    /// Track id registered twice
    #[error("duplicate track id: {0}")]
    DuplicateTrack(TrackId),
    
    /// Track id never registered
    #[error("unknown track id: {0}")]
    UnknownTrack(TrackId),
    
    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(String),
}

impl TimelineError {
    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
