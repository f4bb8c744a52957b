//! Per-ID delivery order checker.
//!
//! Records every request at submission and compares each delivered beat with
//! the oldest undelivered transaction of its original ID.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::common::ids::OriginalId;
use crate::reorder::Response;

use super::fabric::{SimBeat, SimRequest};

/// A delivered beat that broke per-ID order or beat framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Original ID of the delivered beat.
    pub id: OriginalId,
    /// `(seq, beat)` that should have been delivered next.
    pub expected: Option<(u64, u32)>,
    /// `(seq, beat)` that was delivered.
    pub observed: (u64, u32),
    /// Final-beat flag that was delivered.
    pub final_beat: bool,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected {
            Some((seq, beat)) => write!(
                f,
                "{}: expected txn {seq} beat {beat}, got txn {} beat {} (final={})",
                self.id, self.observed.0, self.observed.1, self.final_beat
            ),
            None => write!(
                f,
                "{}: nothing outstanding, got txn {} beat {}",
                self.id, self.observed.0, self.observed.1
            ),
        }
    }
}

/// Tracks expected delivery order per original ID.
#[derive(Debug, Clone, Default)]
pub struct OrderChecker {
    expected: BTreeMap<OriginalId, VecDeque<SimRequest>>,
    next_beat: BTreeMap<OriginalId, u32>,
    transactions: u64,
    beats: u64,
    violations: Vec<Violation>,
}

impl OrderChecker {
    /// Creates an empty checker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a submitted request.
    pub fn expect(&mut self, id: OriginalId, request: SimRequest) {
        self.expected.entry(id).or_default().push_back(request);
    }

    /// Checks a delivered beat. Returns false if it violated order.
    pub fn observe(&mut self, response: &Response<SimBeat>) -> bool {
        let id = response.id;
        let got = (response.payload.seq, response.payload.beat);
        let beat = self.next_beat.get(&id).copied().unwrap_or(0);
        let front = self.expected.get(&id).and_then(|q| q.front().copied());

        let ok = front.is_some_and(|req| {
            let last = beat + 1 == req.beats.max(1);
            req.seq == got.0 && beat == got.1 && last == response.final_beat
        });
        if !ok {
            self.violations.push(Violation {
                id,
                expected: front.map(|req| (req.seq, beat)),
                observed: got,
                final_beat: response.final_beat,
            });
            return false;
        }

        self.beats += 1;
        if response.final_beat {
            if let Some(queue) = self.expected.get_mut(&id) {
                let _ = queue.pop_front();
            }
            let _ = self.next_beat.remove(&id);
            self.transactions += 1;
        } else {
            let _ = self.next_beat.insert(id, beat + 1);
        }
        true
    }

    /// Transactions fully delivered.
    pub const fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Beats delivered in order.
    pub const fn beats(&self) -> u64 {
        self.beats
    }

    /// Transactions submitted but not fully delivered.
    pub fn outstanding(&self) -> usize {
        self.expected.values().map(VecDeque::len).sum()
    }

    /// Violations recorded so far.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}
