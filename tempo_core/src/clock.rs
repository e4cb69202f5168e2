//! The "TICK" Clock - monotonic tick counter with pause and speed control
//!
//! The clock is the single writer of [`TickState`]. Forward motion in
//! Record mode goes through [`TickClock::advance`] (exactly one tick per
//! step) and step bursts go through [`TickClock::step_forward`]. Rewinds
//! move the pointer with [`TickClock::jump_to`].
//!
//! Every tick reached going forward is journaled with the state it
//! published, so a rewind restores the elapsed time of the tick it lands
//! on and replays can feed collaborators the state they originally saw.

use crate::error::TimelineError;
use crate::mode::RewindMode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tempo_env::Tick;
use tracing::{error, warn};

/// Smallest speed multiplier ever stored.
pub const MIN_SPEED: f32 = 1.0e-3;

/// Published clock state, read by every downstream subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickState {
    /// Current tick
    pub tick: Tick,

    /// Fixed simulation step in seconds
    pub fixed_delta_time: f64,

    /// Wall-time multiplier, always > 0
    pub speed_multiplier: f32,

    /// Whether ordinary advancement is halted
    pub is_paused: bool,

    /// Speed-scaled seconds accumulated by forward ticks
    pub elapsed_secs: f64,
}

/// Outcome of a speed change request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedChange {
    /// Value stored as requested
    Applied(f32),
    /// Value was positive but below `MIN_SPEED`
    Clamped(f32),
    /// Value was non-positive or non-finite; previous value kept
    Rejected { requested: f32, kept: f32 },
}

impl SpeedChange {
    /// The multiplier in effect after the change.
    pub fn value(&self) -> f32 {
        match *self {
            SpeedChange::Applied(v) | SpeedChange::Clamped(v) => v,
            SpeedChange::Rejected { kept, .. } => kept,
        }
    }
}

/// Monotonic simulation clock.
#[derive(Debug, Clone)]
pub struct TickClock {
    tick: Tick,
    fixed_delta_time: f64,
    speed_multiplier: f32,
    is_paused: bool,
    elapsed_secs: f64,

    /// Set once `advance` ran in the current step
    advanced_this_step: bool,

    /// Published state of every retained forward tick, ascending
    journal: VecDeque<TickState>,
}

impl TickClock {
    /// Creates a clock at tick 0.
    pub fn new(fixed_delta_time: f64) -> Self {
        let mut clock = Self {
            tick: 0,
            fixed_delta_time,
            speed_multiplier: 1.0,
            is_paused: false,
            elapsed_secs: 0.0,
            advanced_this_step: false,
            journal: VecDeque::new(),
        };
        clock.journal.push_back(clock.state());
        clock
    }

    /// Re-arms the once-per-step advance guard.
    pub fn begin_step(&mut self) {
        self.advanced_this_step = false;
    }

    /// Advances one tick, reporting misuse as an error.
    ///
    /// Returns `Ok(None)` while paused.
    pub fn try_advance(&mut self, wall_dt: f64, mode: RewindMode) -> Result<Option<Tick>, TimelineError> {
        if mode != RewindMode::Record {
            return Err(TimelineError::NotRecording { mode });
        }
        if self.advanced_this_step {
            return Err(TimelineError::DoubleAdvance { tick: self.tick });
        }
        self.advanced_this_step = true;

        if self.is_paused {
            return Ok(None);
        }

        self.tick += 1;
        self.elapsed_secs += wall_dt * self.speed_multiplier as f64;
        self.remember();
        Ok(Some(self.tick))
    }

    /// Advances one tick.
    ///
    /// Misuse (second call in a step, or a call outside Record mode) panics
    /// in debug builds and is ignored in release builds.
    pub fn advance(&mut self, wall_dt: f64, mode: RewindMode) -> Option<Tick> {
        match self.try_advance(wall_dt, mode) {
            Ok(tick) => tick,
            Err(e) => {
                debug_assert!(false, "{e}");
                error!("Ignoring clock advance: {}", e);
                None
            }
        }
    }

    /// Runs one step-burst tick: one fixed step at the current speed,
    /// regardless of the pause flag.
    pub fn step_forward(&mut self) -> Tick {
        self.tick += 1;
        self.elapsed_secs += self.fixed_delta_time * self.speed_multiplier as f64;
        self.remember();
        self.tick
    }

    /// Moves the tick pointer directly (rewind cursor, resume point).
    ///
    /// Elapsed time comes from the journal. A tick that was never reached
    /// falls back to `tick * fixed_delta_time`.
    pub fn jump_to(&mut self, tick: Tick) {
        self.tick = tick;
        self.elapsed_secs = self
            .journaled(tick)
            .map_or(tick as f64 * self.fixed_delta_time, |s| s.elapsed_secs);
    }

    /// State published when `tick` was reached going forward.
    ///
    /// Falls back to the current speed and pause flag with tick-derived
    /// elapsed time when the tick is not journaled.
    pub fn state_at(&self, tick: Tick) -> TickState {
        self.journaled(tick).unwrap_or(TickState {
            tick,
            elapsed_secs: tick as f64 * self.fixed_delta_time,
            ..self.state()
        })
    }

    /// Drops journal entries older than `tick`, always keeping the newest.
    pub fn forget_before(&mut self, tick: Tick) {
        while self.journal.len() > 1 && self.journal.front().is_some_and(|s| s.tick < tick) {
            self.journal.pop_front();
        }
    }

    /// Drops journal entries newer than `tick`.
    pub fn forget_after(&mut self, tick: Tick) {
        while self.journal.back().is_some_and(|s| s.tick > tick) {
            self.journal.pop_back();
        }
    }

    /// Number of journaled ticks.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn journaled(&self, tick: Tick) -> Option<TickState> {
        let first = self.journal.front()?.tick;
        let index = usize::try_from(tick.checked_sub(first)?).ok()?;
        self.journal.get(index).filter(|s| s.tick == tick).copied()
    }

    fn remember(&mut self) {
        self.forget_after(self.tick.saturating_sub(1));
        let state = self.state();
        self.journal.push_back(state);
    }

    /// Sets the speed multiplier, fail-soft.
    pub fn set_speed(&mut self, requested: f32) -> SpeedChange {
        if !requested.is_finite() || requested <= 0.0 {
            warn!(
                "Rejected speed multiplier {} - keeping {}",
                requested, self.speed_multiplier
            );
            return SpeedChange::Rejected {
                requested,
                kept: self.speed_multiplier,
            };
        }
        if requested < MIN_SPEED {
            self.speed_multiplier = MIN_SPEED;
            return SpeedChange::Clamped(MIN_SPEED);
        }
        self.speed_multiplier = requested;
        SpeedChange::Applied(requested)
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> TickState {
        TickState {
            tick: self.tick,
            fixed_delta_time: self.fixed_delta_time,
            speed_multiplier: self.speed_multiplier,
            is_paused: self.is_paused,
            elapsed_secs: self.elapsed_secs,
        }
    }
}
