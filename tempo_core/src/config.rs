//! Timeline configuration.

use crate::command::SourceRanking;
use crate::error::TimelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a timeline.
///
/// Every field has a default, so a JSON file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Fixed simulation step in seconds
    pub fixed_delta_time: f64,
    
    /// Speed multiplier at tick 0
    pub initial_speed: f32,
    
    /// Start with the clock paused
    pub start_paused: bool,
    
    /// Rewind cursor speed in ticks per step (0 = jump to target)
    pub rewind_ticks_per_step: u32,
    
    /// Issuer tie-break order, lowest first
    pub source_ranking: SourceRanking,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fixed_delta_time: 1.0 / 30.0,
            initial_speed: 1.0,
            start_paused: false,
            rewind_ticks_per_step: 0,
            source_ranking: SourceRanking::default(),
        }
    }
}

impl TimelineConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, TimelineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TimelineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
    
    /// Loads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TimelineError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
    
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if !self.fixed_delta_time.is_finite() || self.fixed_delta_time <= 0.0 {
            return Err(TimelineError::config(format!(
                "fixed_delta_time must be positive, got {}",
                self.fixed_delta_time
            )));
        }
        if !self.initial_speed.is_finite() || self.initial_speed <= 0.0 {
            return Err(TimelineError::config(format!(
                "initial_speed must be positive, got {}",
                self.initial_speed
            )));
        }
        Ok(())
    }
    
    /// Sets the fixed step from a tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.fixed_delta_time = 1.0 / hz.max(1) as f64;
        self
    }
    
    /// Sets the rewind cursor speed.
    pub fn with_rewind_rate(mut self, ticks_per_step: u32) -> Self {
        self.rewind_ticks_per_step = ticks_per_step;
        self
    }
    
    /// Sets the issuer ranking.
    pub fn with_source_ranking(mut self, ranking: SourceRanking) -> Self {
        self.source_ranking = ranking;
        self
    }
    
    /// Starts the clock paused.
    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }
}
