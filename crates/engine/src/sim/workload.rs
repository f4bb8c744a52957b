//! Deterministic request stream for the simulated originator.

use crate::common::ids::OriginalId;
use crate::config::SimConfig;
use crate::dispatch::Request;

use super::fabric::SimRequest;
use super::rng::XorShift;

/// Generates requests over a fixed pool of original IDs.
#[derive(Debug, Clone)]
pub struct Workload {
    rng: XorShift,
    ids: u32,
    max_beats: u32,
    remaining: u64,
    next_seq: u64,
}

impl Workload {
    /// Creates a workload of `config.transactions` requests.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            // Decorrelate from the fabric, which is seeded with the same value.
            rng: XorShift::new(config.seed.rotate_left(17) ^ 0xA5A5_A5A5_A5A5_A5A5),
            ids: config.ids.max(1),
            max_beats: config.max_beats.max(1),
            remaining: config.transactions,
            next_seq: 0,
        }
    }

    /// Requests not yet generated.
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Returns true once every request has been generated.
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl Iterator for Workload {
    type Item = Request<SimRequest>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let id = OriginalId(self.rng.below(self.ids as usize) as u32);
        let beats = 1 + self.rng.below(self.max_beats as usize) as u32;
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Request::new(id, SimRequest { seq, beats }))
    }
}
