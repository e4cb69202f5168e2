//! Seeded command issuers - uncoordinated callers for chaos runs.
//!
//! Each issuer plays one source category and fires at a fixed rate:
//! players toggle pause and nudge speed (sometimes in their own scope),
//! scripts change speed and request step bursts, UI pauses and resumes,
//! debug tooling starts, scrubs and stops rewinds.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempo_core::{CommandSource, PublishedState, RewindMode, TimeControlCommand};
use tempo_env::{PlayerId, Tick};

/// What an issuer can see when deciding what to send.
#[derive(Debug, Clone, Copy)]
pub struct IssuerView {
    pub tick: Tick,
    pub mode: RewindMode,
    /// Oldest tick a rewind could currently target
    pub oldest: Option<Tick>,
    /// Rewind origin while a session is active
    pub origin: Option<Tick>,
}

impl IssuerView {
    pub fn from_published(state: &PublishedState, oldest: Option<Tick>) -> Self {
        Self {
            tick: state.tick_state.tick,
            mode: state.mode,
            oldest,
            origin: state.rewind_target.map(|r| r.origin_tick),
        }
    }
}

/// A seeded random command source.
pub struct CommandIssuer {
    source: CommandSource,
    rng: ChaCha8Rng,
    rate: f64,
    player: PlayerId,
    pub issued: u64,
}

impl CommandIssuer {
    /// Creates an issuer firing with probability `rate` per tick.
    pub fn new(source: CommandSource, seed: u64, rate: f64) -> Self {
        let rng_seed = seed ^ (source as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);
        Self {
            source,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            rate: if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 },
            player: PlayerId::from_seed(seed.wrapping_add(source as u64)),
            issued: 0,
        }
    }

    /// One issuer per source category, all from the same seed.
    pub fn cast(seed: u64, rate: f64) -> Vec<Self> {
        CommandSource::all()
            .into_iter()
            .map(|source| Self::new(source, seed, rate))
            .collect()
    }

    pub fn source(&self) -> CommandSource {
        self.source
    }

    /// Maybe produces a command for this tick.
    pub fn issue(&mut self, view: &IssuerView) -> Option<TimeControlCommand> {
        if !self.rng.gen_bool(self.rate) {
            return None;
        }

        let priority = self.rng.gen_range(0..=10);
        let command = match self.source {
            CommandSource::Player => self.player_command(),
            CommandSource::Script => self.script_command(),
            CommandSource::Ui => self.ui_command(),
            CommandSource::Debug => self.debug_command(view)?,
        };
        self.issued += 1;
        Some(command.with_priority(priority))
    }

    fn player_command(&mut self) -> TimeControlCommand {
        let command = match self.rng.gen_range(0..3) {
            0 => TimeControlCommand::pause(self.source),
            1 => TimeControlCommand::resume(self.source),
            _ => TimeControlCommand::set_speed(self.rng.gen_range(0.25..4.0), self.source),
        };
        if self.rng.gen_bool(0.5) {
            command.for_player(self.player)
        } else {
            command
        }
    }

    fn script_command(&mut self) -> TimeControlCommand {
        if self.rng.gen_bool(0.3) {
            TimeControlCommand::step_ticks(self.rng.gen_range(1..=5), self.source)
        } else {
            TimeControlCommand::set_speed(self.rng.gen_range(0.5..2.0), self.source)
        }
    }

    fn ui_command(&mut self) -> TimeControlCommand {
        if self.rng.gen_bool(0.5) {
            TimeControlCommand::pause(self.source)
        } else {
            TimeControlCommand::resume(self.source)
        }
    }

    fn debug_command(&mut self, view: &IssuerView) -> Option<TimeControlCommand> {
        match view.mode {
            RewindMode::Rewind => {
                let origin = view.origin?;
                let oldest = view.oldest.unwrap_or(0).min(origin);
                if self.rng.gen_bool(0.4) {
                    Some(TimeControlCommand::stop_rewind(self.source))
                } else {
                    let target = self.rng.gen_range(oldest..=origin);
                    Some(TimeControlCommand::scrub_to(target, self.source))
                }
            }
            _ => {
                // Occasionally aim past the window to exercise rejection
                let oldest = view.oldest.unwrap_or(0);
                let low = if self.rng.gen_bool(0.2) { 0 } else { oldest.min(view.tick) };
                let target = self.rng.gen_range(low..=view.tick);
                Some(TimeControlCommand::start_rewind(target, self.source))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::CommandKind;

    fn view(tick: Tick, mode: RewindMode) -> IssuerView {
        IssuerView {
            tick,
            mode,
            oldest: Some(tick.saturating_sub(30)),
            origin: (mode == RewindMode::Rewind).then_some(tick),
        }
    }

    #[test]
    fn test_issuers_are_seeded() {
        let run = |seed| {
            let mut cast = CommandIssuer::cast(seed, 0.5);
            (0..50)
                .flat_map(|t| {
                    let v = view(t + 40, RewindMode::Record);
                    cast.iter_mut().filter_map(move |i| i.issue(&v)).collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
        assert_ne!(run(11), run(12));
    }

    #[test]
    fn test_zero_rate_never_fires() {
        let mut issuer = CommandIssuer::new(CommandSource::Ui, 1, 0.0);
        for t in 0..100 {
            assert!(issuer.issue(&view(t, RewindMode::Record)).is_none());
        }
        assert_eq!(issuer.issued, 0);
    }

    #[test]
    fn test_debug_commands_follow_mode() {
        let mut issuer = CommandIssuer::new(CommandSource::Debug, 3, 1.0);
        for _ in 0..20 {
            let kind = issuer.issue(&view(100, RewindMode::Record)).unwrap().kind;
            assert!(matches!(kind, CommandKind::StartRewind(t) if t <= 100));

            let kind = issuer.issue(&view(100, RewindMode::Rewind)).unwrap().kind;
            assert!(matches!(
                kind,
                CommandKind::StopRewind | CommandKind::ScrubTo(70..=100)
            ));
        }
    }
}
