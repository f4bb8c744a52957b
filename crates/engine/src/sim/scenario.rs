//! Scripted replays.
//!
//! A script is a list of issue and complete steps run against a
//! single-channel engine, one turn per step. A completion the engine refuses
//! is presented again on the turns that follow, ahead of the next step. Every
//! grant, stall, park, refusal and release is recorded in a [`Trace`].

use std::collections::VecDeque;
use std::fmt;

use crate::common::error::{Rejection, RemapError};
use crate::common::ids::{OriginalId, Tag, WireTag};
use crate::config::Config;
use crate::dispatch::Request;
use crate::engine::{Engine, Turn};
use crate::reorder::{Completion, Inbound, ReleaseKind};

/// One step of a script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Issues a single-beat request under the given ID.
    Issue(OriginalId),
    /// Completes the n-th issued request (0-based).
    Complete(usize),
}

/// Something observable that happened during a replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// Request `request` was granted `tag`.
    Granted {
        /// Index of the request.
        request: usize,
        /// Tag granted.
        tag: Tag,
    },
    /// Request `request` could not be granted this turn.
    Stalled {
        /// Index of the request.
        request: usize,
        /// Refusal reason.
        reason: Rejection,
    },
    /// The completion of `request` was parked.
    Parked {
        /// Index of the request.
        request: usize,
        /// Tag it arrived on.
        tag: Tag,
    },
    /// The completion of `request` was refused.
    Backpressured {
        /// Index of the request.
        request: usize,
        /// Refusal reason.
        reason: Rejection,
    },
    /// The completion of `request` was delivered.
    Released {
        /// Index of the request.
        request: usize,
        /// Original ID it was delivered under.
        id: OriginalId,
        /// Eligibility condition.
        kind: ReleaseKind,
    },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted { request, tag } => write!(f, "req#{} granted {tag}", request + 1),
            Self::Stalled { request, reason } => write!(f, "req#{} stalled: {reason}", request + 1),
            Self::Parked { request, tag } => write!(f, "req#{} parked at {tag}", request + 1),
            Self::Backpressured { request, reason } => {
                write!(f, "req#{} backpressured: {reason}", request + 1)
            }
            Self::Released { request, id, kind } => {
                write!(f, "req#{} released to {id} ({kind:?})", request + 1)
            }
        }
    }
}

/// Outcome of a replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    /// Events in the order they happened.
    pub events: Vec<TraceEvent>,
    /// Highest park occupancy reached.
    pub peak_parked: usize,
}

impl Trace {
    /// Delivered `(id, request)` pairs in delivery order.
    pub fn released(&self) -> Vec<(OriginalId, usize)> {
        self.events
            .iter()
            .filter_map(|event| match *event {
                TraceEvent::Released { request, id, .. } => Some((id, request)),
                _ => None,
            })
            .collect()
    }

    /// Count of completions that went through the park.
    pub fn parked(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, TraceEvent::Parked { .. }))
            .count()
    }
}

struct Replay {
    engine: Engine<usize, usize>,
    tags: Vec<Option<WireTag>>,
    pending: Option<usize>,
    /// Refused completions, oldest first.
    retry: VecDeque<Completion<usize>>,
    trace: Trace,
}

impl Replay {
    /// Folds a turn into the trace. `completing` is the request whose
    /// completion was presented this turn.
    fn record(&mut self, turn: Turn<usize>, completing: Option<usize>) -> Result<(), RemapError> {
        if let Some(inbound) = turn.inbound {
            let event = match inbound {
                Inbound::DirectHit(_) => None,
                Inbound::Parked(tag) => completing.map(|request| TraceEvent::Parked { request, tag }),
                Inbound::Backpressured(refused) => {
                    let event = TraceEvent::Backpressured {
                        request: refused.item.payload,
                        reason: refused.reason,
                    };
                    self.retry.push_back(refused.item);
                    Some(event)
                }
            };
            self.trace.events.extend(event);
        }
        for release in turn.releases {
            self.trace.events.push(TraceEvent::Released {
                request: release.response.payload,
                id: release.response.id,
                kind: release.kind,
            });
        }
        for (_, reason) in turn.stalls {
            if let Some(request) = self.pending {
                self.trace.events.push(TraceEvent::Stalled { request, reason });
            }
        }
        for (_, tag) in turn.grants {
            let request = self.pending.take().ok_or_else(|| {
                RemapError::Invariant(format!("grant of {tag} with no pending request"))
            })?;
            let outgoing = self.engine.take_outgoing().ok_or_else(|| {
                RemapError::Invariant(format!("grant of {tag} produced no outgoing request"))
            })?;
            self.tags[request] = Some(outgoing.tag);
            self.trace.events.push(TraceEvent::Granted { request, tag });
        }
        self.trace.peak_parked = self.trace.peak_parked.max(self.engine.park().len());
        Ok(())
    }

    /// Presents refused completions again, one per turn. Returns false, leaving
    /// the rest queued, once a completion is refused on a turn that released
    /// nothing.
    fn redeliver(&mut self) -> Result<bool, RemapError> {
        while let Some(completion) = self.retry.pop_front() {
            let request = completion.payload;
            let turn = self.engine.tick(Some(completion))?;
            let stuck = turn.releases.is_empty()
                && matches!(turn.inbound, Some(Inbound::Backpressured(_)));
            self.record(turn, Some(request))?;
            if stuck {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Runs `script` against a single-channel engine built from `config`.
///
/// # Errors
///
/// Returns `InvalidConfig` for a bad configuration, `Invariant` if the script
/// issues while a request is still stalled, completes a request that holds no
/// tag, or ends with a refused completion that can never be accepted, and any
/// fatal error raised by the engine.
pub fn replay(config: &Config, script: &[Step]) -> Result<Trace, RemapError> {
    let mut config = config.clone();
    config.dispatch.channels = 1;
    let mut replay = Replay {
        engine: Engine::new(&config)?,
        tags: Vec::new(),
        pending: None,
        retry: VecDeque::new(),
        trace: Trace::default(),
    };

    for step in script {
        let _ = replay.redeliver()?;
        let mut completing = None;
        let inbound = match *step {
            Step::Issue(id) => {
                if replay.pending.is_some() {
                    return Err(RemapError::Invariant(
                        "issue while an earlier request is still stalled".into(),
                    ));
                }
                let request = replay.tags.len();
                replay.tags.push(None);
                if replay.engine.submit(Request::new(id, request)).is_err() {
                    return Err(RemapError::Invariant("dispatch channel busy".into()));
                }
                replay.pending = Some(request);
                None
            }
            Step::Complete(request) => {
                let tag = replay.tags.get(request).copied().flatten().ok_or_else(|| {
                    RemapError::Invariant(format!("request #{} holds no tag", request + 1))
                })?;
                completing = Some(request);
                Some(Completion {
                    tag,
                    payload: request,
                    final_beat: true,
                })
            }
        };
        let turn = replay.engine.tick(inbound)?;
        replay.record(turn, completing)?;
    }

    if !replay.redeliver()? {
        let request = replay.retry.front().map_or(0, |c| c.payload);
        return Err(RemapError::Invariant(format!(
            "completion of req#{} refused with nothing left to release",
            request + 1
        )));
    }
    for release in replay.engine.settle()? {
        replay.trace.events.push(TraceEvent::Released {
            request: release.response.payload,
            id: release.response.id,
            kind: release.kind,
        });
    }
    Ok(replay.trace)
}

/// Four requests under one ID on a 1×4 namespace, completed 3,1,4,2.
///
/// # Errors
///
/// As for [`replay`].
pub fn scenario_a() -> Result<Trace, RemapError> {
    let id = OriginalId(7);
    replay(
        &Config::with_shape(1, 4),
        &[
            Step::Issue(id),
            Step::Issue(id),
            Step::Issue(id),
            Step::Issue(id),
            Step::Complete(2),
            Step::Complete(0),
            Step::Complete(3),
            Step::Complete(1),
        ],
    )
}

/// One request each under IDs 3 and 5, with 5 completing first.
///
/// # Errors
///
/// As for [`replay`].
pub fn scenario_b() -> Result<Trace, RemapError> {
    replay(
        &Config::with_shape(2, 2),
        &[
            Step::Issue(OriginalId(3)),
            Step::Issue(OriginalId(5)),
            Step::Complete(1),
            Step::Complete(0),
        ],
    )
}

/// A third request under an ID that holds both columns of a 1×2 namespace
/// stalls until the first completion frees a column.
///
/// # Errors
///
/// As for [`replay`].
pub fn scenario_c() -> Result<Trace, RemapError> {
    let id = OriginalId(9);
    replay(
        &Config::with_shape(1, 2),
        &[
            Step::Issue(id),
            Step::Issue(id),
            Step::Issue(id),
            Step::Complete(0),
            Step::Complete(1),
            Step::Complete(2),
        ],
    )
}
