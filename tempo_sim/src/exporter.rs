//! JSON exporter for per-tick timeline frames.
//!
//! Exports one frame per step so a run can be inspected or diffed offline.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use tempo_core::{RewindMode, StepReport, TickState, TimelineMetrics};
use tempo_env::Tick;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Step index since the world was created
    pub step: u64,

    /// Timeline tick after the step
    pub tick: Tick,

    /// Speed-scaled simulation time in seconds
    pub elapsed_secs: f64,

    pub mode: RewindMode,
    pub speed_multiplier: f32,
    pub is_paused: bool,

    /// Orbital body position [x, y, z]
    pub orbit: [f64; 3],

    /// Mining rig ore total
    pub ore: u64,

    /// Vegetation canopy total
    pub canopy: u64,

    /// Accepted commands, by name
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub accepted: Vec<String>,

    /// Events (rejections, corrupt loads, truncation)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    /// Frame skeleton from a step report; subsystem fields start zeroed.
    pub fn from_report(step: u64, state: &TickState, report: &StepReport) -> Self {
        let mut events = Vec::new();
        for rejection in &report.rejections {
            events.push(SimEvent::warn(format!("rejected {}: {}", rejection.kind, rejection.reason)));
        }
        for corrupt in &report.corrupt {
            events.push(SimEvent::error(corrupt.to_string()));
        }
        if report.truncated > 0 {
            events.push(SimEvent::info(format!("truncated {} entries", report.truncated)));
        }

        Self {
            step,
            tick: report.tick,
            elapsed_secs: state.elapsed_secs,
            mode: report.mode,
            speed_multiplier: state.speed_multiplier,
            is_paused: state.is_paused,
            orbit: [0.0; 3],
            ore: 0,
            canopy: 0,
            accepted: report.accepted.iter().map(|c| c.kind.to_string()).collect(),
            events,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("error".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Timeline counters at the end of the run
    pub metrics: TimelineMetrics,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            metrics: TimelineMetrics::default(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, metrics: TimelineMetrics) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.metrics = metrics;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::{CommandSource, Rejection, TickClock, TimeControlCommand};

    #[test]
    fn test_frame_collects_events() {
        let state = TickClock::new(0.1).state();
        let report = StepReport {
            tick: 12,
            mode: RewindMode::Record,
            accepted: vec![TimeControlCommand::start_rewind(1, CommandSource::Debug)],
            rejections: vec![Rejection {
                tick: 11,
                kind: tempo_core::CommandKind::StartRewind(1),
                scope: tempo_core::CommandScope::Global,
                reason: "too old".to_string(),
            }],
            ..Default::default()
        };

        let frame = SimFrame::from_report(3, &state, &report);
        assert_eq!(frame.tick, 12);
        assert_eq!(frame.accepted, vec!["StartRewind(1)".to_string()]);
        assert_eq!(frame.events.len(), 1);
        assert_eq!(frame.events[0].level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_export_json_shape() {
        let mut export = SimExport::new("step_burst", 42);
        let state = TickClock::new(0.1).state();
        export.add_frame(SimFrame::from_report(0, &state, &StepReport::default()));
        export.finalize(true, None, TimelineMetrics::default());

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "step_burst");
        assert_eq!(json["frames"][0]["mode"], "Record");
        assert!(json["frames"][0].get("events").is_none());
        assert!(json.get("failure_reason").is_none());
    }
}
