//! Transport models for the simulation harness.
//!
//! A fabric accepts tagged requests and later returns their completions. The
//! only ordering it promises is per wire tag: beats of one transaction come
//! back in order. It provides:
//! 1. **`Fabric`:** The interface the simulator drives.
//! 2. **`ShuffleFabric`:** Interleaves transactions at random, seeded.
//! 3. **`InOrderFabric`:** Completes transactions in issue order (no reordering needed).

use std::collections::VecDeque;

use crate::common::ids::WireTag;
use crate::dispatch::TaggedRequest;
use crate::reorder::Completion;

use super::rng::XorShift;

/// Request body used by the simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimRequest {
    /// Global submission sequence number.
    pub seq: u64,
    /// Beats the fabric returns for this transaction.
    pub beats: u32,
}

/// Response beat used by the simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimBeat {
    /// Submission sequence number of the owning transaction.
    pub seq: u64,
    /// Beat index within the transaction.
    pub beat: u32,
}

/// Back-end transport driven by the simulator.
pub trait Fabric {
    /// Accepts a tagged request.
    fn send(&mut self, request: TaggedRequest<SimRequest>);

    /// Returns the next completion, if any is ready.
    fn poll(&mut self) -> Option<Completion<SimBeat>>;

    /// Takes back a completion the remapper refused; it is presented again later
    /// without overtaking later beats of the same tag.
    fn retry(&mut self, completion: Completion<SimBeat>);

    /// Beats accepted but not yet returned.
    fn in_flight(&self) -> usize;
}

fn beats_of(request: &TaggedRequest<SimRequest>) -> VecDeque<Completion<SimBeat>> {
    let beats = request.payload.beats.max(1);
    (0..beats)
        .map(|beat| Completion {
            tag: request.tag,
            payload: SimBeat {
                seq: request.payload.seq,
                beat,
            },
            final_beat: beat + 1 == beats,
        })
        .collect()
}

/// Fabric that picks a random outstanding transaction for every beat.
#[derive(Debug, Clone)]
pub struct ShuffleFabric {
    rng: XorShift,
    queues: Vec<(WireTag, VecDeque<Completion<SimBeat>>)>,
    in_flight: usize,
}

impl ShuffleFabric {
    /// Creates an empty fabric.
    pub const fn new(seed: u64) -> Self {
        Self {
            rng: XorShift::new(seed),
            queues: Vec::new(),
            in_flight: 0,
        }
    }
}

impl Fabric for ShuffleFabric {
    fn send(&mut self, request: TaggedRequest<SimRequest>) {
        let beats = beats_of(&request);
        self.in_flight += beats.len();
        self.queues.push((request.tag, beats));
    }

    fn poll(&mut self) -> Option<Completion<SimBeat>> {
        if self.queues.is_empty() {
            return None;
        }
        let pick = self.rng.below(self.queues.len());
        let completion = self.queues[pick].1.pop_front()?;
        if self.queues[pick].1.is_empty() {
            let _ = self.queues.swap_remove(pick);
        }
        self.in_flight -= 1;
        Some(completion)
    }

    fn retry(&mut self, completion: Completion<SimBeat>) {
        self.in_flight += 1;
        if let Some((_, queue)) = self.queues.iter_mut().find(|(tag, _)| *tag == completion.tag) {
            queue.push_front(completion);
        } else {
            self.queues
                .push((completion.tag, VecDeque::from([completion])));
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

/// Fabric that returns every beat in the order requests were sent.
#[derive(Debug, Clone, Default)]
pub struct InOrderFabric {
    beats: VecDeque<Completion<SimBeat>>,
}

impl InOrderFabric {
    /// Creates an empty fabric.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fabric for InOrderFabric {
    fn send(&mut self, request: TaggedRequest<SimRequest>) {
        self.beats.extend(beats_of(&request));
    }

    fn poll(&mut self) -> Option<Completion<SimBeat>> {
        self.beats.pop_front()
    }

    fn retry(&mut self, completion: Completion<SimBeat>) {
        self.beats.push_front(completion);
    }

    fn in_flight(&self) -> usize {
        self.beats.len()
    }
}
