//! Common types shared by every unit of the remapper.
//!
//! This module provides the building blocks used by the tag table, the park,
//! and the dispatch and reorder units. It includes:
//! 1. **Identifiers:** Strong types for caller IDs, internal tags, and wire tags.
//! 2. **Tag Layout:** Packing of `(row, column)` tags into transport-visible integers.
//! 3. **Rings:** Fixed-capacity circular queues backing the per-row free lists and issue orders.
//! 4. **Error Handling:** Recoverable rejections and fatal protocol errors.

/// Recoverable rejections and fatal protocol errors.
pub mod error;

/// Identifier types and the wire tag layout.
pub mod ids;

/// Fixed-capacity circular queue.
pub mod ring;

pub use error::{Backpressure, RemapError, Rejection};
pub use ids::{OriginalId, Tag, TagLayout, WireTag};
pub use ring::Ring;
