//! Rejections and protocol errors.
//!
//! Two classes of failure exist and they never mix:
//! 1. **Rejections:** Capacity refusals (tag table or park full). They are plain
//!    values that the caller turns into backpressure and retries later.
//! 2. **Errors:** Protocol violations (unknown tags, double frees, double releases)
//!    and broken internal invariants. They mean the contract between dispatch,
//!    reorder, and the transport is already broken, so they are fatal.

use thiserror::Error;

use super::ids::{OriginalId, Tag};

/// Recoverable capacity refusal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Every allocatable tag is in flight.
    #[error("tag table full")]
    TableFull,
    /// The row bound to this ID has no spare column.
    #[error("row bound to {0} has no spare column")]
    RowFull(OriginalId),
    /// The ID is unbound and every row is bound to another ID.
    #[error("no unbound row available for {0}")]
    NoFreeRow(OriginalId),
    /// The park holds as many beats as it can.
    #[error("park full")]
    ParkFull,
    /// The park already holds the final beat for this tag.
    #[error("park slot {0} already holds its final beat")]
    SlotOccupied(Tag),
    /// The caller-facing output queue for this ID is full.
    #[error("output queue for {0} full")]
    OutputFull(OriginalId),
}

/// A refused item handed back to its producer together with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backpressure<T> {
    /// Why the item was refused.
    pub reason: Rejection,
    /// The refused item, to be retried.
    pub item: T,
}

impl<T> Backpressure<T> {
    /// Wraps a refused item.
    pub const fn new(reason: Rejection, item: T) -> Self {
        Self { reason, item }
    }
}

/// Fatal protocol or invariant violation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RemapError {
    /// A completion or lookup referenced a tag that is not allocated.
    #[error("tag {tag} is not allocated")]
    TagMismatch {
        /// The offending tag.
        tag: Tag,
    },
    /// A free targeted a tag that is not allocated.
    #[error("free of unallocated tag {tag}")]
    Underflow {
        /// The offending tag.
        tag: Tag,
    },
    /// A wire tag does not decode into the configured namespace.
    #[error("wire tag {raw:#x} is outside the tag namespace")]
    TagOutOfRange {
        /// Raw wire value.
        raw: u32,
    },
    /// A park slot was released without an intervening put.
    #[error("park slot {tag} released twice")]
    DoubleRelease {
        /// The offending tag.
        tag: Tag,
    },
    /// A park slot was taken or released in the wrong state.
    #[error("park slot {tag} is not {expected}")]
    ParkState {
        /// The offending tag.
        tag: Tag,
        /// The state the operation required.
        expected: &'static str,
    },
    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal bookkeeping no longer adds up.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// A thread panicked while holding the shared state.
    #[error("shared remapper state poisoned")]
    Poisoned,
}
