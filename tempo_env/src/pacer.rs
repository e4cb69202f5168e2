//! Fixed-step pacing for wall-clock frame loops.
//!
//! Frames arrive with arbitrary durations; the timeline only understands
//! whole fixed steps. The pacer accumulates speed-scaled frame time and
//! releases it in units of the fixed step.

use crate::error::EnvError;
use std::time::Duration;

/// Result of folding one frame into the pacer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacedFrame {
    /// Number of fixed steps to run this frame
    pub steps: u32,
    
    /// Wall-clock seconds attributed to each of those steps
    pub wall_dt_per_step: f64,
    
    /// Simulation seconds discarded because the catch-up budget was hit
    pub dropped_secs: f64,
}

/// Converts wall-clock frame durations into fixed simulation steps.
#[derive(Debug, Clone)]
pub struct StepPacer {
    /// Fixed simulation step in seconds
    fixed_dt: f64,
    
    /// Upper bound on steps released by a single frame
    max_steps_per_frame: u32,
    
    /// Simulation seconds not yet released as a step
    accumulator: f64,
}

impl StepPacer {
    /// Creates a pacer for the given fixed step and catch-up budget.
    pub fn new(fixed_dt: f64, max_steps_per_frame: u32) -> Result<Self, EnvError> {
        if !fixed_dt.is_finite() || fixed_dt <= 0.0 {
            return Err(EnvError::InvalidStepRate(fixed_dt));
        }
        if max_steps_per_frame == 0 {
            return Err(EnvError::InvalidCatchUp(max_steps_per_frame));
        }
        Ok(Self {
            fixed_dt,
            max_steps_per_frame,
            accumulator: 0.0,
        })
    }
    
    /// Creates a pacer from a tick rate in Hz.
    pub fn from_rate_hz(hz: u32, max_steps_per_frame: u32) -> Result<Self, EnvError> {
        if hz == 0 {
            return Err(EnvError::InvalidStepRate(0.0));
        }
        Self::new(1.0 / hz as f64, max_steps_per_frame)
    }
    
    /// Folds one frame of wall time into the pacer.
    ///
    /// `speed` scales the frame before accumulation. Non-positive or
    /// non-finite speeds accumulate nothing.
    pub fn frame(&mut self, wall: Duration, speed: f32) -> PacedFrame {
        let speed = speed as f64;
        if !speed.is_finite() || speed <= 0.0 {
            return PacedFrame {
                steps: 0,
                wall_dt_per_step: 0.0,
                dropped_secs: 0.0,
            };
        }
        
        self.accumulator += wall.as_secs_f64() * speed;
        
        let available = (self.accumulator / self.fixed_dt).floor();
        let steps = available.min(self.max_steps_per_frame as f64) as u32;
        self.accumulator -= steps as f64 * self.fixed_dt;
        
        let mut dropped_secs = 0.0;
        if available > self.max_steps_per_frame as f64 {
            // Keep only the sub-step remainder; the backlog is unrecoverable
            let remainder = self.accumulator % self.fixed_dt;
            dropped_secs = self.accumulator - remainder;
            self.accumulator = remainder;
        }
        
        PacedFrame {
            steps,
            wall_dt_per_step: self.fixed_dt / speed,
            dropped_secs,
        }
    }
    
    /// Returns the fixed step in seconds.
    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }
    
    /// Fraction of a step currently buffered, in `[0, 1)`.
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.fixed_dt
    }
    
    /// Discards any buffered time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
