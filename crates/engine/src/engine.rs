//! Turn-based remapping engine.
//!
//! The engine wires the dispatch channels, tag table, park, and reorder unit
//! together and advances them one serialized turn at a time. It provides:
//! 1. **Admission:** `submit` latches a request into an idle dispatch channel.
//! 2. **Turn:** `tick` runs the reorder step first, so frees made this turn are
//!    visible to the allocation attempts that follow, then steps every waiting
//!    channel, oldest submission first.
//! 3. **Forwarding:** `take_outgoing` hands stamped requests to the transport.
//!
//! Channels are scheduled by submission age rather than index, so two requests
//! under the same original ID on different channels are granted (and therefore
//! released) in the order they were submitted.

use tracing::{debug, trace};

use crate::common::error::{Rejection, RemapError};
use crate::common::ids::{OriginalId, Tag};
use crate::config::Config;
use crate::dispatch::{DispatchEvent, DispatchState, DispatchUnit, Request, TaggedRequest};
use crate::park::Park;
use crate::reorder::{Completion, Inbound, Release, ReorderUnit};
use crate::stats::RemapStats;
use crate::table::TagTable;

/// Everything that happened during one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn<P> {
    /// Turn number (starting at 1).
    pub number: u64,
    /// Fate of the inbound completion, if one was presented.
    pub inbound: Option<Inbound<P>>,
    /// Releases in delivery order.
    pub releases: Vec<Release<P>>,
    /// Tags granted this turn, with the channel that received each.
    pub grants: Vec<(usize, Tag)>,
    /// Channels whose allocation was refused this turn.
    pub stalls: Vec<(usize, Rejection)>,
}

#[derive(Debug, Clone)]
struct Channel<Q> {
    unit: DispatchUnit<Q>,
    /// Submission sequence of the latched request.
    seq: u64,
}

/// Single-threaded remapping engine.
#[derive(Debug, Clone)]
pub struct Engine<Q, P> {
    table: TagTable,
    park: Park<P>,
    reorder: ReorderUnit,
    channels: Vec<Channel<Q>>,
    stats: RemapStats,
    next_seq: u64,
}

impl<Q, P> Engine<Q, P> {
    /// Builds an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: &Config) -> Result<Self, RemapError> {
        config.validate()?;
        let layout = config.layout()?;
        debug!(
            rows = layout.num_rows(),
            cols = layout.num_cols(),
            park = config.park_capacity(),
            channels = config.dispatch.channels,
            "engine configured"
        );
        Ok(Self {
            table: TagTable::new(layout, config.table.headroom)?,
            park: Park::new(layout, config.park_capacity())?,
            reorder: ReorderUnit::new(config.reorder.release),
            channels: (0..config.dispatch.channels)
                .map(|_| Channel {
                    unit: DispatchUnit::new(),
                    seq: 0,
                })
                .collect(),
            stats: RemapStats::default(),
            next_seq: 0,
        })
    }

    /// Tag table.
    pub const fn table(&self) -> &TagTable {
        &self.table
    }

    /// Park.
    pub const fn park(&self) -> &Park<P> {
        &self.park
    }

    /// Accumulated statistics.
    pub const fn stats(&self) -> &RemapStats {
        &self.stats
    }

    /// Number of dispatch channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// State of dispatch channel `channel`.
    pub fn channel_state(&self, channel: usize) -> Option<DispatchState> {
        self.channels.get(channel).map(|c| c.unit.state())
    }

    /// Returns true if some channel would accept a request.
    pub fn is_accepting(&self) -> bool {
        self.channels.iter().any(|c| c.unit.is_ready())
    }

    /// Returns true if no request is latched, no tag is live, and nothing is parked.
    pub fn is_quiescent(&self) -> bool {
        self.table.is_empty()
            && self.park.is_empty()
            && self.channels.iter().all(|c| c.unit.is_ready())
    }

    /// Offers a request from upstream to the lowest idle channel.
    ///
    /// # Errors
    ///
    /// Hands the request back if every channel is busy.
    pub fn submit(&mut self, request: Request<Q>) -> Result<usize, Request<Q>> {
        let Some(channel) = self.channels.iter().position(|c| c.unit.is_ready()) else {
            return Err(request);
        };
        let slot = &mut self.channels[channel];
        slot.unit.offer(request)?;
        slot.seq = self.next_seq;
        self.next_seq += 1;
        self.stats.accepted += 1;
        Ok(channel)
    }

    /// Withdraws a request that has not yet been granted a tag.
    pub fn withdraw(&mut self, channel: usize) -> Option<Request<Q>> {
        self.channels.get_mut(channel)?.unit.withdraw()
    }

    /// Runs one turn.
    ///
    /// # Errors
    ///
    /// Propagates fatal protocol errors from the reorder step; the engine
    /// should be considered unusable afterwards.
    pub fn tick(&mut self, inbound: Option<Completion<P>>) -> Result<Turn<P>, RemapError> {
        self.stats.turns += 1;
        let outcome = self.reorder.step(&mut self.table, &mut self.park, inbound)?;
        if let Some(inbound) = &outcome.inbound {
            self.stats.record_inbound(inbound);
        }
        for release in &outcome.releases {
            self.stats.record_release(release);
        }
        self.stats.observe_park(self.park.len());

        let (grants, stalls) = self.dispatch_step();

        Ok(Turn {
            number: self.stats.turns,
            inbound: outcome.inbound,
            releases: outcome.releases,
            grants,
            stalls,
        })
    }

    /// Steps every allocating channel, oldest submission first.
    #[allow(clippy::type_complexity)]
    fn dispatch_step(&mut self) -> (Vec<(usize, Tag)>, Vec<(usize, Rejection)>) {
        let mut order: Vec<usize> = (0..self.channels.len())
            .filter(|&c| self.channels[c].unit.state() == DispatchState::Allocating)
            .collect();
        order.sort_by_key(|&c| self.channels[c].seq);

        let mut grants = Vec::new();
        let mut stalls = Vec::new();
        let mut blocked: Vec<OriginalId> = Vec::new();
        for channel in order {
            let unit = &mut self.channels[channel].unit;
            let Some(id) = unit.pending_id() else {
                continue;
            };
            // A younger request must not overtake a stalled older one for the same ID.
            if blocked.contains(&id) {
                stalls.push((channel, Rejection::RowFull(id)));
                continue;
            }
            if !self.table.has_spare() {
                self.stats.record_rejection(Rejection::TableFull);
                stalls.push((channel, Rejection::TableFull));
                blocked.push(id);
                continue;
            }
            match unit.step(&mut self.table) {
                DispatchEvent::Granted(tag) => {
                    self.stats.record_grant(self.table.live_tags());
                    grants.push((channel, tag));
                }
                DispatchEvent::Stalled(reason) => {
                    trace!(channel, %id, %reason, "dispatch stalled");
                    self.stats.record_rejection(reason);
                    stalls.push((channel, reason));
                    blocked.push(id);
                }
                DispatchEvent::Idle | DispatchEvent::Holding => {}
            }
        }
        (grants, stalls)
    }

    /// Stamped request of `channel` awaiting downstream, if any.
    pub fn outgoing(&self, channel: usize) -> Option<&TaggedRequest<Q>> {
        self.channels.get(channel)?.unit.outgoing()
    }

    /// Downstream accepts the oldest forwarding request.
    pub fn take_outgoing(&mut self) -> Option<TaggedRequest<Q>> {
        let channel = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.unit.state() == DispatchState::Forwarding)
            .min_by_key(|(_, c)| c.seq)
            .map(|(idx, _)| idx)?;
        self.channels[channel].unit.take_outgoing()
    }

    /// Runs turns with no inbound completion until nothing more is released.
    ///
    /// Useful under the `Single` policy to flush park hits that became
    /// eligible during the last turn.
    ///
    /// # Errors
    ///
    /// As for [`Engine::tick`].
    pub fn settle(&mut self) -> Result<Vec<Release<P>>, RemapError> {
        let mut released = Vec::new();
        loop {
            let turn = self.tick(None)?;
            if turn.releases.is_empty() {
                return Ok(released);
            }
            released.extend(turn.releases);
        }
    }
}
