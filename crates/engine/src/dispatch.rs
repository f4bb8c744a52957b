//! Admission/Dispatch Unit.
//!
//! Each unit carries one request at a time through three states:
//! 1. **Idle:** Accepts a request from upstream and latches it.
//! 2. **Allocating:** Requests a tag every step until the table grants one, then
//!    stamps the tag into the outgoing request.
//! 3. **Forwarding:** Holds the stamped request until downstream accepts it.
//!
//! Upstream is only told "accepted" while the unit is idle, so a unit never has
//! more than one allocation request outstanding.

use tracing::trace;

use crate::common::error::Rejection;
use crate::common::ids::{OriginalId, Tag, WireTag};
use crate::table::{Grant, TagTable};

/// Request as issued by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<Q> {
    /// Caller correlation key.
    pub id: OriginalId,
    /// Opaque request body (address, length, ...).
    pub payload: Q,
}

impl<Q> Request<Q> {
    /// Creates a request.
    pub const fn new(id: OriginalId, payload: Q) -> Self {
        Self { id, payload }
    }
}

/// Request as seen by the transport: the original ID replaced by a wire tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRequest<Q> {
    /// Allocated transport tag.
    pub tag: WireTag,
    /// Opaque request body.
    pub payload: Q,
}

/// Dispatch unit state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// Ready to accept a request.
    #[default]
    Idle,
    /// Holding a request, waiting for a tag.
    Allocating,
    /// Holding a stamped request, waiting for downstream.
    Forwarding,
}

/// What one dispatch step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Nothing latched.
    Idle,
    /// A tag was granted and stamped.
    Granted(Tag),
    /// Allocation refused; the request stays latched.
    Stalled(Rejection),
    /// Stamped request still waiting for downstream.
    Holding,
}

/// One admission channel.
#[derive(Debug, Clone)]
pub struct DispatchUnit<Q> {
    state: DispatchState,
    latched: Option<Request<Q>>,
    outgoing: Option<TaggedRequest<Q>>,
    granted: Option<Tag>,
}

impl<Q> Default for DispatchUnit<Q> {
    fn default() -> Self {
        Self {
            state: DispatchState::Idle,
            latched: None,
            outgoing: None,
            granted: None,
        }
    }
}

impl<Q> DispatchUnit<Q> {
    /// Creates an idle unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// Returns true if the unit would accept a request.
    #[inline]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, DispatchState::Idle)
    }

    /// Original ID of the latched request while allocating.
    pub fn pending_id(&self) -> Option<OriginalId> {
        self.latched.as_ref().map(|r| r.id)
    }

    /// Tag granted to the request currently being forwarded.
    pub const fn granted(&self) -> Option<Tag> {
        self.granted
    }

    /// Offers a request from upstream.
    ///
    /// # Errors
    ///
    /// Hands the request back unless the unit is idle.
    pub fn offer(&mut self, request: Request<Q>) -> Result<(), Request<Q>> {
        if !self.is_ready() {
            return Err(request);
        }
        trace!(id = %request.id, "request latched");
        self.latched = Some(request);
        self.state = DispatchState::Allocating;
        Ok(())
    }

    /// Advances the unit by one step against `table`.
    pub fn step(&mut self, table: &mut TagTable) -> DispatchEvent {
        match self.state {
            DispatchState::Idle => DispatchEvent::Idle,
            DispatchState::Forwarding => DispatchEvent::Holding,
            DispatchState::Allocating => {
                let Some(id) = self.pending_id() else {
                    self.state = DispatchState::Idle;
                    return DispatchEvent::Idle;
                };
                match table.allocate(id) {
                    Grant::Rejected(reason) => DispatchEvent::Stalled(reason),
                    Grant::Granted(tag) => {
                        if let Some(request) = self.latched.take() {
                            self.outgoing = Some(TaggedRequest {
                                tag: table.layout().encode(tag),
                                payload: request.payload,
                            });
                        }
                        self.granted = Some(tag);
                        self.state = DispatchState::Forwarding;
                        DispatchEvent::Granted(tag)
                    }
                }
            }
        }
    }

    /// The stamped request awaiting downstream, if any.
    pub const fn outgoing(&self) -> Option<&TaggedRequest<Q>> {
        self.outgoing.as_ref()
    }

    /// Downstream accepts the stamped request; the unit returns to idle.
    pub fn take_outgoing(&mut self) -> Option<TaggedRequest<Q>> {
        if self.state != DispatchState::Forwarding {
            return None;
        }
        let request = self.outgoing.take()?;
        self.granted = None;
        self.state = DispatchState::Idle;
        Some(request)
    }

    /// Withdraws the latched request before a tag has been granted.
    ///
    /// Returns `None` once a tag is allocated: from then on the transaction
    /// must complete through the reorder unit before its tag is recycled.
    pub fn withdraw(&mut self) -> Option<Request<Q>> {
        if self.state != DispatchState::Allocating {
            return None;
        }
        self.state = DispatchState::Idle;
        self.latched.take()
    }
}
