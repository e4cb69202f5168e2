//! The "ARBITER" - deterministic resolution of concurrent time commands
//!
//! Any number of callers submit commands into a shared intake during a
//! tick. Once per tick the arbiter drains the intake and picks at most one
//! winner per scope:
//!
//! 1. highest `priority`
//! 2. highest source rank ([`SourceRanking`])
//! 3. earliest submission
//!
//! Per-player commands never compete across players; each player's best
//! command competes only with the global winner. Losers are dropped, not
//! carried to the next tick.

use crate::command::{CommandScope, SourceRanking, TimeControlCommand};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempo_env::PlayerId;
use tracing::{debug, warn};

/// A command stamped with its submission sequence number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommand {
    pub command: TimeControlCommand,
    pub seq: u64,
}

#[derive(Debug, Default)]
struct IntakeQueue {
    next_seq: u64,
    pending: Vec<PendingCommand>,
}

/// Shared submission handle for time commands.
///
/// Cloning the handle shares the queue. Submission gives no result; the
/// caller observes the outcome in the published state on the next tick.
#[derive(Debug, Clone, Default)]
pub struct CommandIntake {
    queue: Arc<Mutex<IntakeQueue>>,
}

impl CommandIntake {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IntakeQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a command for the next arbitration.
    pub fn submit(&self, command: TimeControlCommand) {
        let mut queue = self.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push(PendingCommand { command, seq });
    }

    /// Takes every pending command, leaving the queue empty.
    pub fn drain(&self) -> Vec<PendingCommand> {
        std::mem::take(&mut self.lock().pending)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Winners and losers of one arbitration round.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Accepted global command
    pub global: Option<PendingCommand>,

    /// Accepted per-player commands, ordered by player id
    pub players: BTreeMap<PlayerId, PendingCommand>,

    /// Everything else
    pub dropped: Vec<PendingCommand>,
}

impl Resolution {
    pub fn accepted_count(&self) -> usize {
        self.global.iter().count() + self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.players.is_empty() && self.dropped.is_empty()
    }
}

type RankKey = (Reverse<u8>, Reverse<u8>, u64);

/// Resolves pending commands to at most one winner per scope.
#[derive(Debug, Clone, Default)]
pub struct CommandArbiter {
    ranking: SourceRanking,
    intake: CommandIntake,
}

impl CommandArbiter {
    pub fn new(ranking: SourceRanking) -> Self {
        Self {
            ranking,
            intake: CommandIntake::new(),
        }
    }

    /// A handle callers can submit through.
    pub fn intake(&self) -> CommandIntake {
        self.intake.clone()
    }

    pub fn ranking(&self) -> &SourceRanking {
        &self.ranking
    }

    fn key(&self, pending: &PendingCommand) -> RankKey {
        (
            Reverse(pending.command.priority),
            Reverse(self.ranking.rank(pending.command.source)),
            pending.seq,
        )
    }

    /// Drains the intake and resolves it.
    pub fn resolve(&mut self) -> Resolution {
        let batch = self.intake.drain();
        self.resolve_batch(batch)
    }

    /// Resolves an explicit batch of pending commands.
    pub fn resolve_batch(&self, batch: Vec<PendingCommand>) -> Resolution {
        let mut resolution = Resolution::default();
        let mut contenders = Vec::with_capacity(batch.len());

        for pending in batch {
            if matches!(pending.command.scope, CommandScope::PerPlayer(_))
                && pending.command.kind.is_timeline_level()
            {
                warn!(
                    "Dropping per-player {} (seq={}): timeline commands require global scope",
                    pending.command.kind, pending.seq
                );
                resolution.dropped.push(pending);
            } else {
                contenders.push(pending);
            }
        }

        contenders.sort_by_key(|p| self.key(p));

        let global_key = contenders
            .iter()
            .find(|p| p.command.scope == CommandScope::Global)
            .map(|p| self.key(p));

        for pending in contenders {
            let key = self.key(&pending);
            match pending.command.scope {
                CommandScope::Global => {
                    if resolution.global.is_none() {
                        resolution.global = Some(pending);
                    } else {
                        self.note_conflict(resolution.global.as_ref(), &pending);
                        resolution.dropped.push(pending);
                    }
                }
                CommandScope::PerPlayer(player) => {
                    let outranks_global = global_key.map_or(true, |g| key < g);
                    if outranks_global && !resolution.players.contains_key(&player) {
                        resolution.players.insert(player, pending);
                    } else {
                        self.note_conflict(resolution.players.get(&player), &pending);
                        resolution.dropped.push(pending);
                    }
                }
            }
        }

        resolution
    }

    fn note_conflict(&self, winner: Option<&PendingCommand>, loser: &PendingCommand) {
        let Some(winner) = winner else { return };
        let (w, l) = (self.key(winner), self.key(loser));
        if (w.0, w.1) == (l.0, l.1) {
            debug!(
                "Command conflict: {} (seq={}) beats {} (seq={}) by submission order",
                winner.command.kind, winner.seq, loser.command.kind, loser.seq
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, CommandSource};
    use proptest::prelude::*;

    fn pending(command: TimeControlCommand, seq: u64) -> PendingCommand {
        PendingCommand { command, seq }
    }

    #[test]
    fn test_intake_assigns_submission_order() {
        let arbiter = CommandArbiter::default();
        let intake = arbiter.intake();
        let other = intake.clone();

        intake.submit(TimeControlCommand::pause(CommandSource::Ui));
        other.submit(TimeControlCommand::resume(CommandSource::Player));

        let drained = intake.drain();
        assert_eq!(drained.iter().map(|p| p.seq).collect::<Vec<_>>(), vec![0, 1]);
        assert!(other.is_empty());
    }

    #[test]
    fn test_higher_priority_wins_either_order() {
        let speed = TimeControlCommand::set_speed(2.0, CommandSource::Player).with_priority(5);
        let pause = TimeControlCommand::pause(CommandSource::Debug).with_priority(10);

        for batch in [vec![speed, pause], vec![pause, speed]] {
            let mut arbiter = CommandArbiter::default();
            let intake = arbiter.intake();
            for cmd in batch {
                intake.submit(cmd);
            }
            let resolution = arbiter.resolve();
            assert_eq!(resolution.global.unwrap().command.kind, CommandKind::Pause);
            assert_eq!(resolution.dropped.len(), 1);
        }
    }

    #[test]
    fn test_source_rank_breaks_priority_tie() {
        let arbiter = CommandArbiter::default();
        let batch = vec![
            pending(TimeControlCommand::set_speed(4.0, CommandSource::Player).with_priority(3), 0),
            pending(TimeControlCommand::pause(CommandSource::Debug).with_priority(3), 1),
            pending(TimeControlCommand::resume(CommandSource::Script).with_priority(3), 2),
        ];
        let resolution = arbiter.resolve_batch(batch);
        assert_eq!(resolution.global.unwrap().command.source, CommandSource::Player);
    }

    #[test]
    fn test_custom_ranking_changes_winner() {
        let ranking = SourceRanking::new(vec![
            CommandSource::Player,
            CommandSource::Script,
            CommandSource::Ui,
            CommandSource::Debug,
        ])
        .unwrap();
        let arbiter = CommandArbiter::new(ranking);
        let batch = vec![
            pending(TimeControlCommand::resume(CommandSource::Player), 0),
            pending(TimeControlCommand::pause(CommandSource::Debug), 1),
        ];
        let resolution = arbiter.resolve_batch(batch);
        assert_eq!(resolution.global.unwrap().command.kind, CommandKind::Pause);
    }

    #[test]
    fn test_full_tie_resolved_by_submission_order() {
        let arbiter = CommandArbiter::default();
        let batch = vec![
            pending(TimeControlCommand::resume(CommandSource::Ui), 7),
            pending(TimeControlCommand::pause(CommandSource::Ui), 3),
        ];
        let resolution = arbiter.resolve_batch(batch);
        assert_eq!(resolution.global.unwrap().seq, 3);
    }

    #[test]
    fn test_players_do_not_compete_with_each_other() {
        let arbiter = CommandArbiter::default();
        let (a, b) = (PlayerId::from_seed(1), PlayerId::from_seed(2));
        let batch = vec![
            pending(TimeControlCommand::pause(CommandSource::Player).with_priority(9).for_player(a), 0),
            pending(TimeControlCommand::set_speed(0.5, CommandSource::Player).with_priority(1).for_player(b), 1),
            pending(TimeControlCommand::resume(CommandSource::Player).with_priority(2).for_player(b), 2),
        ];
        let resolution = arbiter.resolve_batch(batch);

        assert!(resolution.global.is_none());
        assert_eq!(resolution.players[&a].command.kind, CommandKind::Pause);
        assert_eq!(resolution.players[&b].command.kind, CommandKind::Resume);
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn test_global_supersedes_weaker_player_command() {
        let arbiter = CommandArbiter::default();
        let (a, b) = (PlayerId::from_seed(1), PlayerId::from_seed(2));
        let batch = vec![
            pending(TimeControlCommand::pause(CommandSource::Script).with_priority(5), 0),
            pending(TimeControlCommand::set_speed(3.0, CommandSource::Player).with_priority(4).for_player(a), 1),
            pending(TimeControlCommand::resume(CommandSource::Player).with_priority(6).for_player(b), 2),
        ];
        let resolution = arbiter.resolve_batch(batch);

        assert_eq!(resolution.global.unwrap().command.kind, CommandKind::Pause);
        assert!(!resolution.players.contains_key(&a));
        assert_eq!(resolution.players[&b].command.kind, CommandKind::Resume);
        assert_eq!(resolution.accepted_count(), 2);
    }

    #[test]
    fn test_per_player_timeline_commands_dropped() {
        let arbiter = CommandArbiter::default();
        let player = PlayerId::from_seed(1);
        let batch = vec![pending(
            TimeControlCommand::start_rewind(10, CommandSource::Player)
                .with_priority(255)
                .for_player(player),
            0,
        )];
        let resolution = arbiter.resolve_batch(batch);
        assert_eq!(resolution.accepted_count(), 0);
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn test_resolve_clears_intake() {
        let mut arbiter = CommandArbiter::default();
        arbiter.intake().submit(TimeControlCommand::pause(CommandSource::Ui));
        assert_eq!(arbiter.resolve().accepted_count(), 1);
        assert!(arbiter.resolve().is_empty());
    }

    fn arb_command() -> impl Strategy<Value = TimeControlCommand> {
        let kind = prop_oneof![
            Just(CommandKind::Pause),
            Just(CommandKind::Resume),
            (1u32..10).prop_map(CommandKind::StepTicks),
            (1u32..8).prop_map(|s| CommandKind::SetSpeed(s as f32)),
            (0u64..100).prop_map(CommandKind::StartRewind),
            Just(CommandKind::StopRewind),
        ];
        let source = prop_oneof![
            Just(CommandSource::Debug),
            Just(CommandSource::Ui),
            Just(CommandSource::Script),
            Just(CommandSource::Player),
        ];
        (kind, source, any::<u8>()).prop_map(|(kind, source, priority)| {
            TimeControlCommand::new(kind, source).with_priority(priority)
        })
    }

    proptest! {
        #[test]
        fn prop_winner_independent_of_submission_order(
            commands in prop::collection::vec(arb_command(), 1..12),
            shuffle_seed in any::<u64>(),
        ) {
            // keep one command per (priority, source) so ranking never falls back to order
            let mut seen = std::collections::HashSet::new();
            let unique: Vec<_> = commands
                .into_iter()
                .filter(|c| seen.insert((c.priority, c.source)))
                .collect();

            let mut shuffled = unique.clone();
            let len = shuffled.len();
            for i in 0..len {
                let j = (shuffle_seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
                shuffled.swap(i, j);
            }

            let arbiter = CommandArbiter::default();
            let to_batch = |cmds: &[TimeControlCommand]| -> Vec<PendingCommand> {
                cmds.iter().enumerate().map(|(i, c)| pending(*c, i as u64)).collect()
            };
            let first = arbiter.resolve_batch(to_batch(&unique));
            let second = arbiter.resolve_batch(to_batch(&shuffled));

            prop_assert_eq!(
                first.global.map(|p| p.command),
                second.global.map(|p| p.command)
            );
        }
    }
}
