//! Thread-safe remapper handle.
//!
//! `Remapper` guards the tag table, park, and per-ID output queues with one
//! mutex. Request and completion handling run on independent threads and hold
//! the lock only for the O(1) table and park operations, never while waiting:
//! 1. **Issue:** Allocates a tag and stamps the request; blocks on a condition
//!    variable while the table is full.
//! 2. **Complete:** Releases or parks a completion and drains every park hit
//!    it unblocks; blocks while the park is full.
//! 3. **Receive:** Pops responses from the per-ID output queues. Each queue is
//!    bounded; while one is full, that ID's completions stay parked.
//!
//! Per-ID order holds because every ID has one FIFO output queue fed in
//! release order. Different IDs drain independently.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::error::{Backpressure, Rejection, RemapError};
use crate::common::ids::{OriginalId, Tag};
use crate::config::{Config, ReleasePolicy};
use crate::dispatch::{Request, TaggedRequest};
use crate::park::Park;
use crate::reorder::{Completion, Inbound, ReorderUnit, Response};
use crate::stats::RemapStats;
use crate::table::{Grant, TagTable};

#[derive(Debug)]
struct State<P> {
    table: TagTable,
    park: Park<P>,
    reorder: ReorderUnit,
    /// Released responses per ID, each stamped with its release sequence.
    outputs: BTreeMap<OriginalId, VecDeque<(u64, Response<P>)>>,
    queue_depth: usize,
    next_release: u64,
    /// Responses sitting in output queues.
    queued: usize,
    stats: RemapStats,
}

impl<P> State<P> {
    /// One reorder step with output-queue gating; returns (inbound fate, releases, tags freed).
    fn step(
        &mut self,
        inbound: Option<Completion<P>>,
    ) -> Result<(Option<Inbound<P>>, usize, usize), RemapError> {
        let Self {
            table,
            park,
            reorder,
            outputs,
            queue_depth,
            ..
        } = &mut *self;
        let depth = *queue_depth;
        let outcome = reorder.step_gated(table, park, inbound, |id| {
            if outputs.get(&id).map_or(0, VecDeque::len) < depth {
                Ok(())
            } else {
                Err(Rejection::OutputFull(id))
            }
        })?;

        let mut freed = 0;
        let released = outcome.releases.len();
        for release in outcome.releases {
            self.stats.record_release(&release);
            if release.freed {
                freed += 1;
            }
            self.outputs
                .entry(release.response.id)
                .or_default()
                .push_back((self.next_release, release.response));
            self.next_release += 1;
            self.queued += 1;
        }
        if let Some(inbound) = &outcome.inbound {
            self.stats.record_inbound(inbound);
        }
        self.stats.observe_park(self.park.len());
        Ok((outcome.inbound, released, freed))
    }

    fn pop(&mut self, id: Option<OriginalId>) -> Option<Response<P>> {
        let key = match id {
            Some(id) => id,
            None => *self
                .outputs
                .iter()
                .filter_map(|(id, q)| q.front().map(|(seq, _)| (*seq, id)))
                .min_by_key(|(seq, _)| *seq)
                .map(|(_, id)| id)?,
        };
        let queue = self.outputs.get_mut(&key)?;
        let (_, response) = queue.pop_front()?;
        if queue.is_empty() {
            let _ = self.outputs.remove(&key);
        }
        self.queued -= 1;
        Some(response)
    }
}

#[derive(Debug)]
struct Shared<P> {
    state: Mutex<State<P>>,
    /// Signalled when tags are freed.
    tag_freed: Condvar,
    /// Signalled when park or output space may have opened.
    space: Condvar,
    /// Signalled when responses are queued.
    delivered: Condvar,
}

/// Cloneable, thread-safe remapper.
#[derive(Debug)]
pub struct Remapper<P> {
    inner: Arc<Shared<P>>,
}

impl<P> Clone for Remapper<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Remapper<P> {
    /// Builds a remapper. The reorder unit always drains every eligible release.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: &Config) -> Result<Self, RemapError> {
        config.validate()?;
        let layout = config.layout()?;
        let state = State {
            table: TagTable::new(layout, config.table.headroom)?,
            park: Park::new(layout, config.park_capacity())?,
            reorder: ReorderUnit::new(ReleasePolicy::Drain),
            outputs: BTreeMap::new(),
            queue_depth: config.reorder.id_queue_depth,
            next_release: 0,
            queued: 0,
            stats: RemapStats::default(),
        };
        Ok(Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                tag_freed: Condvar::new(),
                space: Condvar::new(),
                delivered: Condvar::new(),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<P>>, RemapError> {
        self.inner.state.lock().map_err(|_| RemapError::Poisoned)
    }

    fn stamp<Q>(state: &mut State<P>, tag: Tag, request: Request<Q>) -> TaggedRequest<Q> {
        state.stats.accepted += 1;
        state.stats.record_grant(state.table.live_tags());
        trace!(id = %request.id, %tag, "request issued");
        TaggedRequest {
            tag: state.table.layout().encode(tag),
            payload: request.payload,
        }
    }

    /// Allocates a tag without waiting.
    ///
    /// # Errors
    ///
    /// The outer error is fatal (`Poisoned`); the inner one hands the request
    /// back with the rejection reason.
    pub fn try_issue<Q>(
        &self,
        request: Request<Q>,
    ) -> Result<Result<TaggedRequest<Q>, Backpressure<Request<Q>>>, RemapError> {
        let mut state = self.lock()?;
        Ok(match state.table.allocate(request.id) {
            Grant::Granted(tag) => Ok(Self::stamp(&mut state, tag, request)),
            Grant::Rejected(reason) => {
                state.stats.record_rejection(reason);
                Err(Backpressure::new(reason, request))
            }
        })
    }

    /// Allocates a tag, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if another thread panicked while holding the lock.
    pub fn issue<Q>(&self, request: Request<Q>) -> Result<TaggedRequest<Q>, RemapError> {
        let mut state = self.lock()?;
        loop {
            match state.table.allocate(request.id) {
                Grant::Granted(tag) => return Ok(Self::stamp(&mut state, tag, request)),
                Grant::Rejected(reason) => {
                    state.stats.record_rejection(reason);
                    state = self
                        .inner
                        .tag_freed
                        .wait(state)
                        .map_err(|_| RemapError::Poisoned)?;
                }
            }
        }
    }

    /// Allocates a tag, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// As for [`Remapper::try_issue`]; the inner error carries the last
    /// rejection seen when the wait expired.
    pub fn issue_timeout<Q>(
        &self,
        request: Request<Q>,
        timeout: Duration,
    ) -> Result<Result<TaggedRequest<Q>, Backpressure<Request<Q>>>, RemapError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            match state.table.allocate(request.id) {
                Grant::Granted(tag) => return Ok(Ok(Self::stamp(&mut state, tag, request))),
                Grant::Rejected(reason) => {
                    state.stats.record_rejection(reason);
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Err(Backpressure::new(reason, request)));
                    }
                    state = self
                        .inner
                        .tag_freed
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| RemapError::Poisoned)?
                        .0;
                }
            }
        }
    }

    fn notify(&self, released: usize, freed: usize) {
        if released > 0 {
            self.inner.delivered.notify_all();
            self.inner.space.notify_all();
        }
        if freed > 0 {
            self.inner.tag_freed.notify_all();
        }
    }

    /// Presents a completion without waiting.
    ///
    /// Returns the number of responses released into the output queues.
    ///
    /// # Errors
    ///
    /// The outer error is fatal (unknown tag, bookkeeping failure, poisoning);
    /// the inner one hands the completion back when the park refused it.
    pub fn try_complete(
        &self,
        completion: Completion<P>,
    ) -> Result<Result<usize, Backpressure<Completion<P>>>, RemapError> {
        let (inbound, released, freed) = {
            let mut state = self.lock()?;
            state.step(Some(completion))?
        };
        self.notify(released, freed);
        Ok(match inbound {
            Some(Inbound::Backpressured(refused)) => Err(refused),
            _ => Ok(released),
        })
    }

    /// Presents a completion, blocking while the park has no room for it.
    ///
    /// # Errors
    ///
    /// Returns fatal protocol errors and `Poisoned`.
    pub fn complete(&self, completion: Completion<P>) -> Result<usize, RemapError> {
        let mut state = self.lock()?;
        let mut pending = completion;
        let mut total = 0;
        loop {
            let (inbound, released, freed) = state.step(Some(pending))?;
            total += released;
            self.notify(released, freed);
            match inbound {
                Some(Inbound::Backpressured(refused)) => {
                    debug!(reason = %refused.reason, "completion waiting for park space");
                    pending = refused.item;
                    state = self
                        .inner
                        .space
                        .wait(state)
                        .map_err(|_| RemapError::Poisoned)?;
                }
                _ => return Ok(total),
            }
        }
    }

    /// Pops the earliest released response still queued, of any ID, without waiting.
    ///
    /// # Errors
    ///
    /// Returns fatal errors raised while draining unblocked park hits.
    pub fn try_recv(&self) -> Result<Option<Response<P>>, RemapError> {
        self.pop_and_refill(None)
    }

    /// Pops the next queued response for `id` without waiting.
    ///
    /// # Errors
    ///
    /// As for [`Remapper::try_recv`].
    pub fn try_recv_for(&self, id: OriginalId) -> Result<Option<Response<P>>, RemapError> {
        self.pop_and_refill(Some(id))
    }

    /// Pops a response, waiting at most `timeout` for one to be released.
    ///
    /// # Errors
    ///
    /// As for [`Remapper::try_recv`].
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Response<P>>, RemapError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if state.queued > 0 {
                drop(state);
                return self.pop_and_refill(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .inner
                .delivered
                .wait_timeout(state, deadline - now)
                .map_err(|_| RemapError::Poisoned)?
                .0;
        }
    }

    fn pop_and_refill(&self, id: Option<OriginalId>) -> Result<Option<Response<P>>, RemapError> {
        let (response, released, freed) = {
            let mut state = self.lock()?;
            let Some(response) = state.pop(id) else {
                return Ok(None);
            };
            // The popped queue has room again: release anything it was holding back.
            let (_, released, freed) = state.step(None)?;
            (response, released, freed)
        };
        self.inner.space.notify_all();
        self.notify(released, freed);
        Ok(Some(response))
    }

    /// Number of live tags.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the lock is poisoned.
    pub fn live_tags(&self) -> Result<usize, RemapError> {
        Ok(self.lock()?.table.live_tags())
    }

    /// Number of parked completions.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the lock is poisoned.
    pub fn parked(&self) -> Result<usize, RemapError> {
        Ok(self.lock()?.park.len())
    }

    /// Snapshot of the accumulated statistics.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the lock is poisoned.
    pub fn stats(&self) -> Result<RemapStats, RemapError> {
        Ok(self.lock()?.stats.clone())
    }

    /// Verifies the table invariants under the lock.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` on inconsistency, or `Poisoned`.
    pub fn check_invariants(&self) -> Result<(), RemapError> {
        self.lock()?.table.check_invariants()
    }
}
