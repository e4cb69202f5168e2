//! The "HISTORY" Engine - per-subsystem tracks with cadence and retention
//!
//! A track is an independently configured history stream. The registry
//! decides *when* a track records and trims; the subsystem that owns the
//! track decides *what* the payload contains.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tempo_env::{Tick, TrackId};

/// Immutable configuration of one history track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDefinition {
    /// Unique track identifier
    pub id: TrackId,

    /// Human readable name (used in logs and diagnostics)
    pub name: String,

    /// Cadence divisor; 0 means the track never records
    pub record_every_ticks: u32,

    /// Retention horizon in ticks
    pub window_ticks: u32,

    /// Whether a rewind target must be reconstructible on this track
    pub required: bool,
}

impl TrackDefinition {
    /// Creates a required track definition.
    pub fn new(id: TrackId, name: impl Into<String>, record_every_ticks: u32, window_ticks: u32) -> Self {
        Self {
            id,
            name: name.into(),
            record_every_ticks,
            window_ticks,
            required: true,
        }
    }

    /// Marks the track as optional for rewind validation.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// True if this track ever accumulates history.
    pub fn records(&self) -> bool {
        self.record_every_ticks > 0
    }

    /// Oldest tick that must still be retained after processing `tick`.
    pub fn horizon(&self, tick: Tick) -> Tick {
        tick.saturating_sub(self.window_ticks as Tick)
    }
}

/// Cadence rule: does `def` record at `tick`?
pub fn should_record(def: &TrackDefinition, tick: Tick) -> bool {
    def.record_every_ticks > 0 && tick % def.record_every_ticks as Tick == 0
}

/// Explicit tick accessor used by trimming and lookups.
pub trait Ticked {
    fn tick(&self) -> Tick;
}

/// One recorded snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Tick the snapshot was taken at
    pub tick: Tick,

    /// Encoded subsystem state
    pub payload: Box<[u8]>,
}

impl HistoryEntry {
    pub fn new(tick: Tick, payload: Box<[u8]>) -> Self {
        Self { tick, payload }
    }
}

impl Ticked for HistoryEntry {
    fn tick(&self) -> Tick {
        self.tick
    }
}

/// Tick-ordered history buffer.
///
/// Entries are strictly increasing by tick. Trimming removes a prefix,
/// truncation removes a suffix.
#[derive(Debug, Clone)]
pub struct History<T: Ticked> {
    entries: VecDeque<T>,
}

impl<T: Ticked> Default for History<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: Ticked> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Returns false (and drops it) if it would break
    /// strict tick ordering.
    pub fn push(&mut self, entry: T) -> bool {
        if let Some(last) = self.entries.back() {
            if entry.tick() <= last.tick() {
                return false;
            }
        }
        self.entries.push_back(entry);
        true
    }

    /// Removes every entry older than `horizon`, scanning from the oldest
    /// end and stopping at the first retained entry.
    pub fn trim_before(&mut self, horizon: Tick) -> usize {
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if front.tick() >= horizon {
                break;
            }
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Removes every entry newer than `tick`.
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        let mut removed = 0;
        while let Some(back) = self.entries.back() {
            if back.tick() <= tick {
                break;
            }
            self.entries.pop_back();
            removed += 1;
        }
        removed
    }

    /// Latest entry at or before `tick`.
    pub fn latest_at_or_before(&self, tick: Tick) -> Option<&T> {
        let idx = self.entries.partition_point(|e| e.tick() <= tick);
        idx.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.entries.front().map(Ticked::tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.entries.back().map(Ticked::tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Ticks of all retained entries, oldest first.
    pub fn ticks(&self) -> Vec<Tick> {
        self.entries.iter().map(Ticked::tick).collect()
    }
}

/// Health of a track within the current rewind session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Usable,
    /// A payload failed to decode; the track is skipped until the session ends
    Corrupt { reason: String },
}

impl TrackStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, TrackStatus::Usable)
    }
}

/// Result of a record/trim pass over one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub recorded: bool,
    pub trimmed: usize,
}

/// Definition, history and status for one track.
#[derive(Debug, Clone)]
pub struct TrackRecorder {
    definition: TrackDefinition,
    history: History<HistoryEntry>,
    status: TrackStatus,
}

impl TrackRecorder {
    pub fn new(definition: TrackDefinition) -> Self {
        Self {
            definition,
            history: History::new(),
            status: TrackStatus::Usable,
        }
    }

    pub fn definition(&self) -> &TrackDefinition {
        &self.definition
    }

    pub fn history(&self) -> &History<HistoryEntry> {
        &self.history
    }

    pub fn status(&self) -> &TrackStatus {
        &self.status
    }

    pub fn should_record(&self, tick: Tick) -> bool {
        should_record(&self.definition, tick)
    }

    /// Appends a payload for `tick` if the cadence allows it.
    pub fn record(&mut self, tick: Tick, payload: impl FnOnce() -> Box<[u8]>) -> bool {
        if !self.should_record(tick) {
            return false;
        }
        self.history.push(HistoryEntry::new(tick, payload()))
    }

    /// Drops entries that fell out of the retention window at `tick`.
    pub fn trim(&mut self, tick: Tick) -> usize {
        self.history.trim_before(self.definition.horizon(tick))
    }

    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        self.history.truncate_after(tick)
    }

    pub fn mark_corrupt(&mut self, reason: impl Into<String>) {
        self.status = TrackStatus::Corrupt { reason: reason.into() };
    }

    pub fn reset_status(&mut self) {
        self.status = TrackStatus::Usable;
    }

    /// True if this track constrains rewind targets.
    pub fn constrains_rewind(&self) -> bool {
        self.definition.required && self.definition.records() && self.status.is_usable()
    }
}
