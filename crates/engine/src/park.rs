//! Park: bounded buffer for completions that arrived before their turn.
//!
//! Slots are indexed by tag. Each slot queues the beats of its transaction in
//! arrival order, and capacity is counted in beats. A slot moves through three
//! states:
//! 1. **Empty:** No queued beat and nothing reserved.
//! 2. **Occupied:** Holds beats waiting for the tag to reach the head of its row.
//! 3. **Reserved:** The front beat was handed to a consumer by `take`; it still
//!    counts toward capacity until `release`, and no further beat can be taken.
//!
//! Beats may be appended to a reserved slot. Once a slot holds the final beat
//! of its transaction, any further beat for that tag is refused as a duplicate.

use std::collections::VecDeque;

use tracing::trace;

use crate::common::error::{Backpressure, Rejection, RemapError};
use crate::common::ids::{Tag, TagLayout};

/// Lifecycle state of a park slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Free.
    #[default]
    Empty,
    /// Holding parked beats.
    Occupied,
    /// Front beat taken, not yet released.
    Reserved,
}

/// One park slot.
#[derive(Debug, Clone)]
pub struct ParkedEntry<P> {
    beats: VecDeque<(P, bool)>,
    /// `Some(final_beat)` while a taken beat awaits release.
    reserved: Option<bool>,
}

impl<P> Default for ParkedEntry<P> {
    fn default() -> Self {
        Self {
            beats: VecDeque::new(),
            reserved: None,
        }
    }
}

impl<P> ParkedEntry<P> {
    /// Current state.
    pub fn state(&self) -> SlotState {
        if self.reserved.is_some() {
            SlotState::Reserved
        } else if self.beats.is_empty() {
            SlotState::Empty
        } else {
            SlotState::Occupied
        }
    }

    /// Beats queued in the slot, not counting a reserved one.
    pub fn queued(&self) -> usize {
        self.beats.len()
    }

    /// Whether the transaction's final beat is queued or reserved.
    pub fn holds_final(&self) -> bool {
        self.reserved == Some(true) || self.beats.back().is_some_and(|&(_, last)| last)
    }
}

/// Tag-indexed early-completion buffer.
#[derive(Debug, Clone)]
pub struct Park<P> {
    layout: TagLayout,
    slots: Vec<ParkedEntry<P>>,
    /// Beats queued or reserved across all slots.
    used: usize,
    capacity: usize,
    peak: usize,
}

impl<P> Park<P> {
    /// Creates an empty park.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `capacity` is zero or exceeds the namespace.
    pub fn new(layout: TagLayout, capacity: usize) -> Result<Self, RemapError> {
        if capacity == 0 || capacity > layout.slots() {
            return Err(RemapError::InvalidConfig(format!(
                "park capacity {capacity} must be within 1..={}",
                layout.slots()
            )));
        }
        Ok(Self {
            layout,
            slots: (0..layout.slots()).map(|_| ParkedEntry::default()).collect(),
            used: 0,
            capacity,
            peak: 0,
        })
    }

    /// Maximum number of beats held at once.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Beats currently queued or reserved.
    #[inline]
    pub const fn len(&self) -> usize {
        self.used
    }

    /// Returns true if no beat is held.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns true if a `put` would be refused for lack of space.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.used >= self.capacity
    }

    /// Highest number of beats ever held at once.
    #[inline]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    /// State of the slot for `tag` (`Empty` for tags outside the namespace).
    pub fn state(&self, tag: Tag) -> SlotState {
        self.slot(tag).map_or(SlotState::Empty, ParkedEntry::state)
    }

    /// Beats queued for `tag`.
    pub fn queued(&self, tag: Tag) -> usize {
        self.slot(tag).map_or(0, ParkedEntry::queued)
    }

    /// Returns true if the slot for `tag` is occupied or reserved.
    pub fn holds(&self, tag: Tag) -> bool {
        self.state(tag) != SlotState::Empty
    }

    /// Predicts whether a `put` for `tag` would be refused.
    pub fn check_put(&self, tag: Tag) -> Result<(), Rejection> {
        if self.slot(tag).is_none_or(ParkedEntry::holds_final) {
            Err(Rejection::SlotOccupied(tag))
        } else if self.is_full() {
            Err(Rejection::ParkFull)
        } else {
            Ok(())
        }
    }

    /// Parks a beat behind any beats already queued for `tag`.
    ///
    /// # Errors
    ///
    /// Hands the payload back with `ParkFull` when at capacity, or with
    /// `SlotOccupied` when the tag's final beat is already held.
    pub fn put(&mut self, tag: Tag, payload: P, final_beat: bool) -> Result<(), Backpressure<P>> {
        if let Err(reason) = self.check_put(tag) {
            return Err(Backpressure::new(reason, payload));
        }
        let Some(idx) = self.index(tag) else {
            return Err(Backpressure::new(Rejection::SlotOccupied(tag), payload));
        };
        self.slots[idx].beats.push_back((payload, final_beat));
        self.used += 1;
        self.peak = self.peak.max(self.used);
        trace!(%tag, final_beat, used = self.used, "completion parked");
        Ok(())
    }

    /// Moves the front beat out of an occupied slot and reserves the slot.
    ///
    /// # Errors
    ///
    /// Returns `ParkState` if the slot is not occupied.
    pub fn take(&mut self, tag: Tag) -> Result<(P, bool), RemapError> {
        let entry = self
            .index(tag)
            .map(|idx| &mut self.slots[idx])
            .filter(|e| e.state() == SlotState::Occupied)
            .ok_or(RemapError::ParkState {
                tag,
                expected: "occupied",
            })?;
        let (payload, final_beat) = entry.beats.pop_front().ok_or(RemapError::ParkState {
            tag,
            expected: "holding a payload",
        })?;
        entry.reserved = Some(final_beat);
        Ok((payload, final_beat))
    }

    /// Clears the reservation on a slot, restoring one beat of capacity.
    ///
    /// # Errors
    ///
    /// Returns `DoubleRelease` for an empty slot and `ParkState` for a slot
    /// whose front beat has not been taken.
    pub fn release(&mut self, tag: Tag) -> Result<(), RemapError> {
        let Some(idx) = self.index(tag) else {
            return Err(RemapError::DoubleRelease { tag });
        };
        match self.slots[idx].state() {
            SlotState::Reserved => {
                self.slots[idx].reserved = None;
                self.used -= 1;
                Ok(())
            }
            SlotState::Empty => Err(RemapError::DoubleRelease { tag }),
            SlotState::Occupied => Err(RemapError::ParkState {
                tag,
                expected: "reserved",
            }),
        }
    }

    /// First tag among `heads` with an occupied slot.
    ///
    /// `heads` is walked in order, so passing release pointers lowest row first
    /// resolves ties between rows in favour of the lowest row.
    pub fn first_hit(&self, heads: impl IntoIterator<Item = Tag>) -> Option<Tag> {
        heads
            .into_iter()
            .find(|&tag| self.state(tag) == SlotState::Occupied)
    }

    /// Tags with an occupied or reserved slot, in slot order.
    pub fn parked_tags(&self) -> Vec<Tag> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, e)| e.state() != SlotState::Empty)
            .map(|(idx, _)| self.layout.tag_at(idx))
            .collect()
    }

    fn index(&self, tag: Tag) -> Option<usize> {
        self.layout
            .contains(tag)
            .then(|| self.layout.index(tag))
    }

    fn slot(&self, tag: Tag) -> Option<&ParkedEntry<P>> {
        self.index(tag).map(|idx| &self.slots[idx])
    }
}
