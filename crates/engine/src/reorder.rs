//! Completion/Reorder Unit.
//!
//! The release pointer of each row is the head of its issue order in the tag
//! table. For every inbound completion the unit:
//! 1. **Decodes** the wire tag and checks that it is allocated.
//! 2. **Direct hit:** Releases the completion at once if its tag is the row's
//!    release pointer and nothing for that tag is parked.
//! 3. **Parks** it otherwise, behind earlier beats of the same tag; a refused
//!    park hands the completion back to the transport as backpressure.
//!
//! Independently of the inbound completion, a step releases a parked entry
//! whose tag has become a release pointer (park hit). A direct hit takes
//! priority; ties between park hits on different rows go to the lowest row.
//!
//! Only the final beat of a transaction frees its tag, which is what advances
//! the row's release pointer. Earlier beats are released in place.

use tracing::{debug, trace};

use crate::common::error::{Backpressure, Rejection, RemapError};
use crate::common::ids::{OriginalId, Tag, WireTag};
use crate::config::ReleasePolicy;
use crate::park::Park;
use crate::table::TagTable;

/// Completion as returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<P> {
    /// Transport tag the request was issued with.
    pub tag: WireTag,
    /// Opaque response body.
    pub payload: P,
    /// Whether this is the transaction's last beat.
    pub final_beat: bool,
}

/// Response delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<P> {
    /// Caller correlation key restored from the tag.
    pub id: OriginalId,
    /// Opaque response body.
    pub payload: P,
    /// Whether this is the transaction's last beat.
    pub final_beat: bool,
}

/// Which eligibility condition released a completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseKind {
    /// Released on arrival.
    DirectHit,
    /// Released from the park.
    ParkHit,
}

/// A completion released to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release<P> {
    /// Tag the completion arrived on.
    pub tag: Tag,
    /// Eligibility condition.
    pub kind: ReleaseKind,
    /// Whether this release freed the tag.
    pub freed: bool,
    /// The caller-facing response.
    pub response: Response<P>,
}

/// What happened to the inbound completion of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<P> {
    /// Released immediately.
    DirectHit(Tag),
    /// Parked until its turn.
    Parked(Tag),
    /// Refused; the transport must present it again later.
    Backpressured(Backpressure<Completion<P>>),
}

/// Result of one reorder step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome<P> {
    /// Fate of the inbound completion, if one was presented.
    pub inbound: Option<Inbound<P>>,
    /// Releases in delivery order.
    pub releases: Vec<Release<P>>,
}

impl<P> Default for StepOutcome<P> {
    fn default() -> Self {
        Self {
            inbound: None,
            releases: Vec::new(),
        }
    }
}

/// Reorder unit. All ordering state lives in the tag table and the park.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorderUnit {
    policy: ReleasePolicy,
}

impl ReorderUnit {
    /// Creates a unit with the given release policy.
    pub const fn new(policy: ReleasePolicy) -> Self {
        Self { policy }
    }

    /// Release policy in effect.
    pub const fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Processes one step with every row free to emit.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the completion's tag does not decode or is not
    /// allocated, or if table/park bookkeeping fails during a release.
    pub fn step<P>(
        &self,
        table: &mut TagTable,
        park: &mut Park<P>,
        inbound: Option<Completion<P>>,
    ) -> Result<StepOutcome<P>, RemapError> {
        self.step_gated(table, park, inbound, |_| Ok(()))
    }

    /// Processes one step, consulting `gate` before every release.
    ///
    /// `gate` receives the original ID about to be released and may refuse it
    /// (for example because that ID's output queue is full). A refused direct
    /// hit is parked instead; a refused park hit stays parked.
    ///
    /// # Errors
    ///
    /// As for [`ReorderUnit::step`].
    pub fn step_gated<P, G>(
        &self,
        table: &mut TagTable,
        park: &mut Park<P>,
        inbound: Option<Completion<P>>,
        mut gate: G,
    ) -> Result<StepOutcome<P>, RemapError>
    where
        G: FnMut(OriginalId) -> Result<(), Rejection>,
    {
        // Park hits are judged on the state at the start of the step.
        let snapshot_hit = Self::find_park_hit(table, park, &mut gate);
        let mut out = StepOutcome::default();

        if let Some(completion) = inbound {
            let tag = table.layout().decode(completion.tag)?;
            let id = table.restore(tag)?;
            let at_head = table.head(tag.row_index()) == Some(tag) && !park.holds(tag);
            if at_head && gate(id).is_ok() {
                let release = Self::release(
                    table,
                    tag,
                    completion.payload,
                    completion.final_beat,
                    ReleaseKind::DirectHit,
                )?;
                out.releases.push(release);
                out.inbound = Some(Inbound::DirectHit(tag));
            } else {
                let wire = completion.tag;
                let final_beat = completion.final_beat;
                out.inbound = Some(match park.put(tag, completion.payload, final_beat) {
                    Ok(()) => Inbound::Parked(tag),
                    Err(refused) => {
                        debug!(%tag, reason = %refused.reason, "completion backpressured");
                        Inbound::Backpressured(Backpressure::new(
                            refused.reason,
                            Completion {
                                tag: wire,
                                payload: refused.item,
                                final_beat,
                            },
                        ))
                    }
                });
            }
        }

        match self.policy {
            ReleasePolicy::Single => {
                if out.releases.is_empty()
                    && let Some(tag) = snapshot_hit
                {
                    out.releases.push(Self::release_parked(table, park, tag)?);
                }
            }
            ReleasePolicy::Drain => {
                while let Some(tag) = Self::find_park_hit(table, park, &mut gate) {
                    out.releases.push(Self::release_parked(table, park, tag)?);
                }
            }
        }
        Ok(out)
    }

    /// Lowest-row parked entry at its row's release pointer that `gate` admits.
    fn find_park_hit<P, G>(table: &TagTable, park: &Park<P>, gate: &mut G) -> Option<Tag>
    where
        G: FnMut(OriginalId) -> Result<(), Rejection>,
    {
        park.first_hit(table.heads().filter(|&tag| {
            table
                .restore(tag)
                .is_ok_and(|id| gate(id).is_ok())
        }))
    }

    fn release_parked<P>(
        table: &mut TagTable,
        park: &mut Park<P>,
        tag: Tag,
    ) -> Result<Release<P>, RemapError> {
        let (payload, final_beat) = park.take(tag)?;
        let release = Self::release(table, tag, payload, final_beat, ReleaseKind::ParkHit)?;
        park.release(tag)?;
        Ok(release)
    }

    fn release<P>(
        table: &mut TagTable,
        tag: Tag,
        payload: P,
        final_beat: bool,
        kind: ReleaseKind,
    ) -> Result<Release<P>, RemapError> {
        let id = table.restore(tag)?;
        if final_beat {
            let _ = table.free(tag)?;
        }
        trace!(%tag, %id, ?kind, final_beat, "completion released");
        Ok(Release {
            tag,
            kind,
            freed: final_beat,
            response: Response {
                id,
                payload,
                final_beat,
            },
        })
    }
}
