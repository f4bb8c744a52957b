//! Statistics Tests.
//!
//! Verifies that engine counters track admission, release, and park
//! occupancy, and that the report serializes.

use pretty_assertions::assert_eq;
use tagremap_core::stats::RemapStats;
use tagremap_core::{OriginalId, Rejection};

use crate::common::harness::TestContext;

#[test]
fn counters_follow_a_reordered_exchange() {
    let mut ctx = TestContext::new(1, 2);
    let a = ctx.issue(1);
    let b = ctx.issue(1);
    let _ = ctx.complete(b, 2);
    let _ = ctx.complete(a, 1);
    ctx.settle();

    let stats = ctx.engine.stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.grants, 2);
    assert_eq!(stats.parked, 1);
    assert_eq!(stats.direct_hits, 1);
    assert_eq!(stats.park_hits, 1);
    assert_eq!(stats.released, 2);
    assert_eq!(stats.freed, 2);
    assert_eq!(stats.peak_parked, 1);
    assert_eq!(stats.peak_live, 2);
    assert!((stats.direct_ratio() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn completion_side_rejections_are_not_allocation_rejections() {
    let mut stats = RemapStats::default();
    stats.record_rejection(Rejection::TableFull);
    stats.record_rejection(Rejection::RowFull(OriginalId(1)));
    stats.record_rejection(Rejection::NoFreeRow(OriginalId(2)));
    stats.record_rejection(Rejection::ParkFull);
    stats.record_rejection(Rejection::OutputFull(OriginalId(1)));
    assert_eq!(stats.rejections(), 3);
}

#[test]
fn empty_stats_ratio_is_zero() {
    assert!(RemapStats::default().direct_ratio().abs() < f64::EPSILON);
}

#[test]
fn stats_serialize_to_json() {
    let mut stats = RemapStats::default();
    stats.record_grant(3);
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["grants"], 1);
    assert_eq!(json["peak_live"], 3);
}
