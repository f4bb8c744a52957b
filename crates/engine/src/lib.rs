//! Tag remapping and response reordering engine.
//!
//! This crate lets callers keep their own correlation IDs while a transport
//! runs on a small, recyclable tag namespace, and restores per-ID completion
//! order on the way back. It provides:
//! 1. **Tag Table:** Row-per-ID binding, per-row column free lists, and issue order.
//! 2. **Dispatch:** Admission channels that stamp requests with a wire tag.
//! 3. **Reorder:** Direct hits, park hits, and tag recycling.
//! 4. **Park:** Bounded storage for completions that arrive early.
//! 5. **Runtime:** A turn-based [`Engine`] and a thread-safe [`Remapper`].
//! 6. **Simulation:** Transport models, workloads, and an order checker.

/// Common types (IDs, tags, wire layout, errors, fixed-capacity rings).
pub mod common;
/// Engine configuration (defaults, enums, section structures).
pub mod config;
/// Admission/dispatch unit.
pub mod dispatch;
/// Turn-based engine combining every unit.
pub mod engine;
/// Park for early completions.
pub mod park;
/// Completion/reorder unit.
pub mod reorder;
/// Thread-safe remapper handle.
pub mod shared;
/// Simulation harness (fabrics, workload, checker, scenarios).
pub mod sim;
/// Statistics collection and reporting.
pub mod stats;
/// Tag table (allocator and ordering state).
pub mod table;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Single-threaded engine; advance it with `Engine::tick`.
pub use crate::engine::Engine;
/// Thread-safe handle over one guarded engine state.
pub use crate::shared::Remapper;

pub use crate::common::{Backpressure, OriginalId, Rejection, RemapError, Tag, TagLayout, WireTag};
pub use crate::dispatch::{Request, TaggedRequest};
pub use crate::reorder::{Completion, Release, ReleaseKind, Response};
pub use crate::stats::RemapStats;
