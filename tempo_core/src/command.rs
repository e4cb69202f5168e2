//! Time-control commands and issuer ranking.

use crate::error::TimelineError;
use serde::{Deserialize, Serialize};
use tempo_env::{PlayerId, Tick};

/// What a command asks the timeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    Pause,
    Resume,
    /// Run exactly N ticks forward while paused
    StepTicks(u32),
    SetSpeed(f32),
    StartRewind(Tick),
    StopRewind,
    /// Move the rewind cursor of an active session
    ScrubTo(Tick),
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Pause => "Pause",
            CommandKind::Resume => "Resume",
            CommandKind::StepTicks(_) => "StepTicks",
            CommandKind::SetSpeed(_) => "SetSpeed",
            CommandKind::StartRewind(_) => "StartRewind",
            CommandKind::StopRewind => "StopRewind",
            CommandKind::ScrubTo(_) => "ScrubTo",
        }
    }

    /// Kinds that move the shared timeline and so only make sense globally.
    pub fn is_timeline_level(&self) -> bool {
        matches!(
            self,
            CommandKind::StepTicks(_)
                | CommandKind::StartRewind(_)
                | CommandKind::StopRewind
                | CommandKind::ScrubTo(_)
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::StepTicks(n) => write!(f, "StepTicks({n})"),
            CommandKind::SetSpeed(s) => write!(f, "SetSpeed({s})"),
            CommandKind::StartRewind(t) => write!(f, "StartRewind({t})"),
            CommandKind::ScrubTo(t) => write!(f, "ScrubTo({t})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Who a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandScope {
    Global,
    PerPlayer(PlayerId),
}

/// Issuer category of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Debug,
    Ui,
    Script,
    Player,
}

impl CommandSource {
    pub fn all() -> [CommandSource; 4] {
        [
            CommandSource::Debug,
            CommandSource::Ui,
            CommandSource::Script,
            CommandSource::Player,
        ]
    }
}

/// A transient request to change the clock or mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeControlCommand {
    pub kind: CommandKind,
    pub scope: CommandScope,
    pub source: CommandSource,
    pub priority: u8,
}

impl TimeControlCommand {
    /// Creates a global, priority-0 command.
    pub fn new(kind: CommandKind, source: CommandSource) -> Self {
        Self {
            kind,
            scope: CommandScope::Global,
            source,
            priority: 0,
        }
    }

    pub fn pause(source: CommandSource) -> Self {
        Self::new(CommandKind::Pause, source)
    }

    pub fn resume(source: CommandSource) -> Self {
        Self::new(CommandKind::Resume, source)
    }

    pub fn step_ticks(count: u32, source: CommandSource) -> Self {
        Self::new(CommandKind::StepTicks(count), source)
    }

    pub fn set_speed(multiplier: f32, source: CommandSource) -> Self {
        Self::new(CommandKind::SetSpeed(multiplier), source)
    }

    pub fn start_rewind(target: Tick, source: CommandSource) -> Self {
        Self::new(CommandKind::StartRewind(target), source)
    }

    pub fn stop_rewind(source: CommandSource) -> Self {
        Self::new(CommandKind::StopRewind, source)
    }

    pub fn scrub_to(target: Tick, source: CommandSource) -> Self {
        Self::new(CommandKind::ScrubTo(target), source)
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Narrows the command to one player.
    pub fn for_player(mut self, player: PlayerId) -> Self {
        self.scope = CommandScope::PerPlayer(player);
        self
    }
}

/// Total order of issuer categories, lowest rank first.
///
/// On equal priority the higher-ranked source wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CommandSource>", into = "Vec<CommandSource>")]
pub struct SourceRanking {
    order: [CommandSource; 4],
}

impl SourceRanking {
    /// Builds a ranking; every source must appear exactly once.
    pub fn new(order: Vec<CommandSource>) -> Result<Self, TimelineError> {
        let order: [CommandSource; 4] = order.try_into().map_err(|v: Vec<CommandSource>| {
            TimelineError::config(format!("source ranking needs 4 entries, got {}", v.len()))
        })?;
        for source in CommandSource::all() {
            if !order.contains(&source) {
                return Err(TimelineError::config(format!(
                    "source ranking is missing {source:?}"
                )));
            }
        }
        Ok(Self { order })
    }

    /// Rank of a source; higher wins.
    pub fn rank(&self, source: CommandSource) -> u8 {
        self.order
            .iter()
            .position(|s| *s == source)
            .map_or(0, |i| i as u8)
    }

    pub fn order(&self) -> &[CommandSource] {
        &self.order
    }
}

impl Default for SourceRanking {
    fn default() -> Self {
        Self {
            order: CommandSource::all(),
        }
    }
}

impl TryFrom<Vec<CommandSource>> for SourceRanking {
    type Error = TimelineError;

    fn try_from(order: Vec<CommandSource>) -> Result<Self, Self::Error> {
        Self::new(order)
    }
}

impl From<SourceRanking> for Vec<CommandSource> {
    fn from(ranking: SourceRanking) -> Self {
        ranking.order.to_vec()
    }
}
