//! Mode controller - Record / Rewind / Step state machine
//!
//! ```text
//!            StartRewind(t)                StopRewind
//!   Record ──────────────────► Rewind ─────────────────► Record
//!     │ ▲                        │ ▲                    (truncate > cursor)
//!     │ │ N ticks done           └─┘ StartRewind / ScrubTo
//!     ▼ │
//!    Step
//! ```
//!
//! Only Record appends history. Step runs a bounded forward burst while
//! paused. Rewind walks a cursor toward its target.

use crate::error::TimelineError;
use serde::{Deserialize, Serialize};
use tempo_env::Tick;

/// Active timeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewindMode {
    /// Forward simulation, history appended
    #[default]
    Record,
    /// Replaying recorded history
    Rewind,
    /// Bounded forward burst for frame-by-frame debugging
    Step,
}

impl RewindMode {
    /// True only in Record mode.
    pub fn may_append(&self) -> bool {
        matches!(self, RewindMode::Record)
    }
}

impl std::fmt::Display for RewindMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RewindMode::Record => "record",
            RewindMode::Rewind => "rewind",
            RewindMode::Step => "step",
        };
        f.write_str(name)
    }
}

/// Rewind session state, valid only in Rewind mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindTarget {
    /// Tick the cursor is heading to
    pub target_tick: Tick,

    /// Tick currently being viewed
    pub cursor_tick: Tick,

    /// Newest simulated tick when the session started
    pub origin_tick: Tick,
}

impl RewindTarget {
    pub fn is_settled(&self) -> bool {
        self.cursor_tick == self.target_tick
    }
}

/// How a StartRewind was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindTransition {
    /// New session opened from Record or Step
    Started,
    /// Existing session pointed at a new target
    Retargeted,
}

/// Progress of a step burst after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// Ticks still to run after this one
    pub remaining: u32,
}

impl StepProgress {
    pub fn finished(&self) -> bool {
        self.remaining == 0
    }
}

/// Record / Rewind / Step state machine.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: RewindMode,
    rewind: Option<RewindTarget>,
    step_remaining: u32,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> RewindMode {
        self.mode
    }

    pub fn rewind_target(&self) -> Option<&RewindTarget> {
        self.rewind.as_ref()
    }

    pub fn step_remaining(&self) -> u32 {
        self.step_remaining
    }

    /// Highest tick a rewind target may name.
    ///
    /// During a session this is the origin, not the cursor, so a scrub can
    /// move forward again up to where simulation stopped.
    pub fn target_ceiling(&self, current_tick: Tick) -> Tick {
        self.rewind.map_or(current_tick, |r| r.origin_tick)
    }

    /// Enters Rewind (or retargets an active session).
    ///
    /// Window validation against tracks is the caller's job; this checks
    /// only the ceiling. A Step burst in progress is abandoned.
    pub fn start_rewind(&mut self, target: Tick, current_tick: Tick) -> Result<RewindTransition, TimelineError> {
        let ceiling = self.target_ceiling(current_tick);
        if target > ceiling {
            return Err(TimelineError::FutureTarget {
                target,
                current: ceiling,
            });
        }

        match self.rewind.as_mut() {
            Some(session) => {
                session.target_tick = target;
                Ok(RewindTransition::Retargeted)
            }
            None => {
                self.mode = RewindMode::Rewind;
                self.step_remaining = 0;
                self.rewind = Some(RewindTarget {
                    target_tick: target,
                    cursor_tick: current_tick,
                    origin_tick: current_tick,
                });
                Ok(RewindTransition::Started)
            }
        }
    }

    /// Moves the target of an active session.
    pub fn scrub_to(&mut self, target: Tick) -> Result<(), TimelineError> {
        let session = self.rewind.as_mut().ok_or(TimelineError::NotRewinding)?;
        if target > session.origin_tick {
            return Err(TimelineError::FutureTarget {
                target,
                current: session.origin_tick,
            });
        }
        session.target_tick = target;
        Ok(())
    }

    /// Moves the cursor toward the target.
    ///
    /// `rate` is the maximum ticks per call; 0 jumps straight to the
    /// target. Returns the new cursor if it moved.
    pub fn move_cursor(&mut self, rate: u32) -> Option<Tick> {
        let session = self.rewind.as_mut()?;
        if session.is_settled() {
            return None;
        }

        let (cursor, target) = (session.cursor_tick, session.target_tick);
        session.cursor_tick = if rate == 0 {
            target
        } else if cursor > target {
            cursor.saturating_sub(rate as Tick).max(target)
        } else {
            cursor.saturating_add(rate as Tick).min(target)
        };
        Some(session.cursor_tick)
    }

    /// Leaves Rewind, returning the tick the cursor occupies.
    pub fn stop_rewind(&mut self) -> Result<Tick, TimelineError> {
        let session = self.rewind.take().ok_or(TimelineError::NotRewinding)?;
        self.mode = RewindMode::Record;
        Ok(session.cursor_tick)
    }

    /// Enters Step mode for `count` ticks.
    pub fn begin_step(&mut self, count: u32) -> Result<(), TimelineError> {
        if count == 0 {
            return Err(TimelineError::InvalidStep);
        }
        if self.mode != RewindMode::Record {
            return Err(TimelineError::NotRecording { mode: self.mode });
        }
        self.mode = RewindMode::Step;
        self.step_remaining = count;
        Ok(())
    }

    /// Consumes one tick of the step burst; re-enters Record after the last.
    pub fn take_step(&mut self) -> Option<StepProgress> {
        if self.mode != RewindMode::Step || self.step_remaining == 0 {
            return None;
        }
        self.step_remaining -= 1;
        if self.step_remaining == 0 {
            self.mode = RewindMode::Record;
        }
        Some(StepProgress {
            remaining: self.step_remaining,
        })
    }
}
