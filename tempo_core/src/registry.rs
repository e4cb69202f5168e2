//! Track registry - collaborators paired with their history tracks.
//!
//! Slots are visited in registration order for every hook, which is the
//! only dispatch order the timeline guarantees.

use crate::clock::TickState;
use crate::codec::{SnapshotReader, SnapshotWriter};
use crate::collaborator::TimeAware;
use crate::error::TimelineError;
use crate::mode::RewindMode;
use crate::track::{should_record, RecordOutcome, TrackRecorder};
use tempo_env::{Tick, TrackId};
use tracing::{debug, error};

struct TrackSlot {
    recorder: TrackRecorder,
    collaborator: Box<dyn TimeAware>,
}

/// Totals from one record/trim pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTotals {
    pub recorded: usize,
    pub trimmed: usize,
}

/// Totals from one load pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub loaded: usize,
    /// Ticks re-run to bring loaded tracks from their entry up to the cursor
    pub replayed: usize,
    /// Tracks that failed to decode during this pass
    pub corrupt: Vec<TimelineError>,
}

/// Registry of time-aware collaborators and their tracks.
pub struct TrackRegistry {
    slots: Vec<TrackSlot>,
    writer: SnapshotWriter,
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            writer: SnapshotWriter::with_capacity(256),
        }
    }

    /// Registers a collaborator and its track.
    ///
    /// In Record mode the current tick is recorded straight away when the
    /// cadence allows it.
    pub fn register(
        &mut self,
        collaborator: Box<dyn TimeAware>,
        tick: Tick,
        mode: RewindMode,
    ) -> Result<TrackId, TimelineError> {
        let definition = collaborator.definition();
        let id = definition.id;
        if self.slots.iter().any(|s| s.recorder.definition().id == id) {
            return Err(TimelineError::DuplicateTrack(id));
        }

        let mut slot = TrackSlot {
            recorder: TrackRecorder::new(definition),
            collaborator,
        };
        if mode.may_append() && should_record(slot.recorder.definition(), tick) {
            self.writer.clear();
            slot.collaborator.save(&mut self.writer);
            let writer = &self.writer;
            slot.recorder.record(tick, || writer.to_payload());
        }
        self.slots.push(slot);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Recorder for a track.
    pub fn recorder(&self, id: TrackId) -> Option<&TrackRecorder> {
        self.slots
            .iter()
            .find(|s| s.recorder.definition().id == id)
            .map(|s| &s.recorder)
    }

    /// All recorders in registration order.
    pub fn recorders(&self) -> impl Iterator<Item = &TrackRecorder> {
        self.slots.iter().map(|s| &s.recorder)
    }

    /// Downcasts a collaborator for inspection.
    pub fn collaborator<T: 'static>(&self, id: TrackId) -> Option<&T> {
        self.slots
            .iter()
            .find(|s| s.recorder.definition().id == id)
            .and_then(|s| s.collaborator.as_any().downcast_ref::<T>())
    }

    /// Checks that every constraining track can reconstruct `target`.
    pub fn validate_target(&self, target: Tick) -> Result<(), TimelineError> {
        for slot in self.slots.iter().filter(|s| s.recorder.constrains_rewind()) {
            let oldest = slot.recorder.history().oldest_tick();
            if oldest.map_or(true, |o| target < o) {
                return Err(TimelineError::OutOfWindow {
                    target,
                    oldest,
                    track: slot.recorder.definition().id,
                });
            }
        }
        Ok(())
    }

    /// Oldest tick every constraining track can reconstruct.
    pub fn oldest_rewindable(&self) -> Option<Tick> {
        self.slots
            .iter()
            .filter(|s| s.recorder.constrains_rewind())
            .map(|s| s.recorder.history().oldest_tick())
            .try_fold(0, |acc: Tick, oldest| oldest.map(|o| acc.max(o)))
    }

    /// Oldest entry held by any recording track.
    pub fn oldest_retained(&self) -> Option<Tick> {
        self.slots
            .iter()
            .filter_map(|s| s.recorder.history().oldest_tick())
            .min()
    }

    pub fn on_tick_all(&mut self, tick: Tick, state: &TickState) {
        for slot in &mut self.slots {
            slot.collaborator.on_tick(tick, state);
        }
    }

    /// Records (when `append`) and trims every track for `tick`.
    pub fn record_and_trim(&mut self, tick: Tick, append: bool) -> PassTotals {
        let Self { slots, writer } = self;
        let mut totals = PassTotals::default();

        for slot in slots.iter_mut() {
            let mut outcome = RecordOutcome::default();
            if append && slot.recorder.should_record(tick) {
                writer.clear();
                slot.collaborator.save(writer);
                let payload = &*writer;
                outcome.recorded = slot.recorder.record(tick, || payload.to_payload());
            }
            outcome.trimmed = slot.recorder.trim(tick);

            totals.recorded += usize::from(outcome.recorded);
            totals.trimmed += outcome.trimmed;
        }
        totals
    }

    /// Loads every usable track from its latest entry at or before `cursor`.
    ///
    /// A track whose entry is older than the cursor (coarse cadence, or a
    /// tick run inside a step burst) re-runs `on_tick` for every tick after
    /// the entry up to the cursor, fed with `state_at(tick)`. A track that
    /// fails to decode is marked corrupt and skipped for the rest of the
    /// session; the other tracks still load.
    pub fn load_at(&mut self, cursor: Tick, state_at: impl Fn(Tick) -> TickState) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();

        for slot in &mut self.slots {
            if !slot.recorder.definition().records() || !slot.recorder.status().is_usable() {
                continue;
            }

            let Some(entry) = slot.recorder.history().latest_at_or_before(cursor) else {
                debug!(
                    "No entry at or before tick {} on {}",
                    cursor,
                    slot.recorder.definition().name
                );
                continue;
            };
            let entry_tick = entry.tick;
            let mut reader = SnapshotReader::new(&entry.payload);
            let result = slot
                .collaborator
                .load(&mut reader)
                .and_then(|()| reader.finish());

            match result {
                Ok(()) => {
                    outcome.loaded += 1;
                    for tick in entry_tick + 1..=cursor {
                        slot.collaborator.on_tick(tick, &state_at(tick));
                        outcome.replayed += 1;
                    }
                }
                Err(source) => {
                    let track = slot.recorder.definition().id;
                    error!(
                        "Corrupt history on {} ({}) at tick {}: {} - track disabled for this rewind",
                        slot.recorder.definition().name,
                        track,
                        cursor,
                        source
                    );
                    slot.recorder.mark_corrupt(source.to_string());
                    outcome.corrupt.push(TimelineError::CorruptHistory { track, source });
                }
            }
        }
        outcome
    }

    /// Drops every entry newer than `tick` in every track.
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        self.slots
            .iter_mut()
            .map(|s| s.recorder.truncate_after(tick))
            .sum()
    }

    pub fn begin_session(&mut self) {
        for slot in &mut self.slots {
            slot.collaborator.on_rewind_start();
        }
    }

    /// Runs end hooks and clears corrupt marks.
    pub fn end_session(&mut self) {
        for slot in &mut self.slots {
            slot.collaborator.on_rewind_end();
            slot.recorder.reset_status();
        }
    }
}
