//! Timeline Metrics Module
//! =======================
//!
//! Running counters for the tick loop. Tooling reads them to spot
//! rejected rewinds, dropped commands and corrupt tracks without parsing
//! logs.

use serde::{Deserialize, Serialize};

/// Counters accumulated across the lifetime of a timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineMetrics {
    /// Steps processed (including paused and rewind steps)
    pub steps: u64,
    /// Ticks advanced in Record mode
    pub ticks_recorded: u64,
    /// Ticks run inside step bursts
    pub ticks_stepped: u64,
    /// Commands submitted to arbitration
    pub commands_seen: u64,
    /// Commands that won arbitration
    pub commands_accepted: u64,
    /// Commands that lost arbitration or were invalid for their scope
    pub commands_dropped: u64,
    /// Accepted commands that failed to apply
    pub commands_rejected: u64,
    /// History entries appended
    pub entries_recorded: u64,
    /// History entries removed by the retention window
    pub entries_trimmed: u64,
    /// History entries removed by truncate-on-resume
    pub entries_truncated: u64,
    /// Rewind sessions opened
    pub rewinds_started: u64,
    /// Track loads performed while rewinding
    pub loads: u64,
    /// Loads that failed to decode
    pub corrupt_loads: u64,
    /// Ticks re-run between a loaded entry and the rewind cursor
    pub ticks_replayed: u64,
}

impl TimelineMetrics {
    /// Ratio of accepted to seen commands, `1.0` when nothing was seen.
    pub fn acceptance_rate(&self) -> f64 {
        if self.commands_seen == 0 {
            return 1.0;
        }
        self.commands_accepted as f64 / self.commands_seen as f64
    }
}
