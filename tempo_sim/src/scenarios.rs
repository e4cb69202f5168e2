//! Timeline scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// TMP-001: cadence and retention window trimming
    CadenceWindow,

    /// TMP-002: rewind to a tick inside the window
    RewindInWindow,

    /// TMP-003: rewind older than the window is refused
    RewindOutOfWindow,

    /// TMP-004: priority and source ranking between callers
    PriorityArbitration,

    /// TMP-005: rewinding to the same tick twice gives the same state
    IdempotentRewind,

    /// TMP-006: resuming after a rewind discards the abandoned future
    TruncateOnResume,

    /// TMP-007: bounded forward burst while paused
    StepBurst,

    /// TMP-008: one undecodable track does not stop the others
    CorruptTrack,

    /// TMP-009: cursor sweep at a fixed rate
    ScrubSweep,

    /// TMP-010: seeded uncoordinated issuers from every source
    ChaosIssuers,

    /// TMP-011: jittered wall-clock frames through the step pacer
    PacedFrames,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CadenceWindow,
            ScenarioId::RewindInWindow,
            ScenarioId::RewindOutOfWindow,
            ScenarioId::PriorityArbitration,
            ScenarioId::IdempotentRewind,
            ScenarioId::TruncateOnResume,
            ScenarioId::StepBurst,
            ScenarioId::CorruptTrack,
            ScenarioId::ScrubSweep,
            ScenarioId::ChaosIssuers,
            ScenarioId::PacedFrames,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CadenceWindow => "cadence_window",
            ScenarioId::RewindInWindow => "rewind_in_window",
            ScenarioId::RewindOutOfWindow => "rewind_out_of_window",
            ScenarioId::PriorityArbitration => "priority_arbitration",
            ScenarioId::IdempotentRewind => "idempotent_rewind",
            ScenarioId::TruncateOnResume => "truncate_on_resume",
            ScenarioId::StepBurst => "step_burst",
            ScenarioId::CorruptTrack => "corrupt_track",
            ScenarioId::ScrubSweep => "scrub_sweep",
            ScenarioId::ChaosIssuers => "chaos_issuers",
            ScenarioId::PacedFrames => "paced_frames",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CadenceWindow => "Vegetation every 10 ticks, 50-tick window: only the window survives",
            ScenarioId::RewindInWindow => "Rewind inside the window and match the forward-only oracle",
            ScenarioId::RewindOutOfWindow => "Rewind past the oldest entry is rejected, mode stays Record",
            ScenarioId::PriorityArbitration => "Pause(p=10) beats SetSpeed(p=5) in either order; ties go by source",
            ScenarioId::IdempotentRewind => "Rewind, scrub away, scrub back: identical state both times",
            ScenarioId::TruncateOnResume => "Stop a rewind, drop the future, replay deterministically",
            ScenarioId::StepBurst => "Step N ticks while paused without appending history",
            ScenarioId::CorruptTrack => "A track with schema drift is isolated during rewind",
            ScenarioId::ScrubSweep => "Cursor moves a fixed number of ticks per step",
            ScenarioId::ChaosIssuers => "Random commands from all four sources, invariants hold every step",
            ScenarioId::PacedFrames => "Jittered frames and a hitch through the step pacer",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cadence_window" | "cadence" | "tmp-001" => Ok(ScenarioId::CadenceWindow),
            "rewind_in_window" | "rewind" | "tmp-002" => Ok(ScenarioId::RewindInWindow),
            "rewind_out_of_window" | "tmp-003" => Ok(ScenarioId::RewindOutOfWindow),
            "priority_arbitration" | "priority" | "tmp-004" => Ok(ScenarioId::PriorityArbitration),
            "idempotent_rewind" | "idempotent" | "tmp-005" => Ok(ScenarioId::IdempotentRewind),
            "truncate_on_resume" | "truncate" | "tmp-006" => Ok(ScenarioId::TruncateOnResume),
            "step_burst" | "step" | "tmp-007" => Ok(ScenarioId::StepBurst),
            "corrupt_track" | "corrupt" | "tmp-008" => Ok(ScenarioId::CorruptTrack),
            "scrub_sweep" | "scrub" | "tmp-009" => Ok(ScenarioId::ScrubSweep),
            "chaos_issuers" | "chaos" | "tmp-010" => Ok(ScenarioId::ChaosIssuers),
            "paced_frames" | "paced" | "tmp-011" => Ok(ScenarioId::PacedFrames),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("TMP-007".parse::<ScenarioId>(), Ok(ScenarioId::StepBurst));
        assert!("warp".parse::<ScenarioId>().is_err());
    }
}
