//! Simulation Harness Tests.
//!
//! Runs generated workloads through shuffling, in-order, and mocked fabrics
//! and checks that every delivered beat respects per-ID order. Also replays
//! the scripted scenarios.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use tagremap_core::config::{Config, ReleasePolicy};
use tagremap_core::sim::scenario::{self, Step, TraceEvent};
use tagremap_core::sim::{
    InOrderFabric, OrderChecker, ShuffleFabric, SimBeat, SimRequest, Simulator, Workload,
};
use tagremap_core::{OriginalId, Rejection, ReleaseKind, RemapError, Response};

use crate::common::harness::init_tracing;
use crate::common::mocks::fabric::{in_order_mock, MockTransport};

fn sim_config(rows: usize, cols: usize, transactions: u64, seed: u64) -> Config {
    let mut config = Config::with_shape(rows, cols);
    config.sim.transactions = transactions;
    config.sim.seed = seed;
    config
}

// ══════════════════════════════════════════════════════════
// 1. Randomized runs
// ══════════════════════════════════════════════════════════

#[test]
fn shuffle_run_default_shape_is_clean() {
    init_tracing();
    let config = sim_config(8, 4, 2_000, 0xC0FFEE);
    let simulator = Simulator::new(config).unwrap();
    let report = simulator.run(&mut ShuffleFabric::new(0xC0FFEE)).unwrap();

    assert!(report.is_clean(), "violations: {:?}", report.violations);
    assert_eq!(report.delivered, 2_000);
    assert_eq!(report.stats.freed, 2_000);
    assert_eq!(report.stats.grants, 2_000);
    assert!(report.stats.park_hits > 0);
}

#[rstest]
#[case(ReleasePolicy::Single, 1)]
#[case(ReleasePolicy::Drain, 1)]
#[case(ReleasePolicy::Single, 3)]
#[case(ReleasePolicy::Drain, 4)]
fn small_namespace_under_pressure(#[case] policy: ReleasePolicy, #[case] channels: usize) {
    init_tracing();
    let mut config = sim_config(2, 2, 500, 77);
    config.reorder.release = policy;
    config.dispatch.channels = channels;
    config.sim.ids = 5;
    config.sim.max_beats = 3;

    let report = Simulator::new(config)
        .unwrap()
        .run(&mut ShuffleFabric::new(77))
        .unwrap();
    assert!(report.is_clean(), "violations: {:?}", report.violations);
    assert_eq!(report.delivered, 500);
    assert!(report.stats.rejections() > 0);
    assert!(report.stats.peak_live <= 4);
}

#[test]
fn in_order_fabric_never_parks() {
    let config = sim_config(4, 4, 300, 5);
    let report = Simulator::new(config)
        .unwrap()
        .run(&mut InOrderFabric::new())
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.stats.parked, 0);
    assert_eq!(report.stats.direct_hits, report.beats);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_seed_preserves_per_id_order(seed in any::<u64>(), rows in 1usize..4, cols in 1usize..4) {
        let mut config = sim_config(rows, cols, 150, seed);
        config.sim.ids = 4;
        let report = Simulator::new(config).unwrap().run(&mut ShuffleFabric::new(seed)).unwrap();
        prop_assert!(report.is_clean(), "violations: {:?}", report.violations);
        prop_assert_eq!(report.delivered, 150);
    }
}

// ══════════════════════════════════════════════════════════
// 2. Mocked fabrics
// ══════════════════════════════════════════════════════════

#[test]
fn mocked_in_order_fabric_completes() {
    let (mut fabric, queue) = in_order_mock();
    let config = sim_config(2, 2, 40, 3);
    let report = Simulator::new(config).unwrap().run(&mut fabric).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.delivered, 40);
    assert!(queue.lock().unwrap().is_empty());
}

#[test]
fn silent_fabric_hits_turn_limit() {
    let mut fabric = MockTransport::new();
    let _ = fabric.expect_send().times(3).return_const(());
    let _ = fabric.expect_poll().returning(|| None);
    let _ = fabric.expect_in_flight().return_const(3usize);
    let _ = fabric.expect_retry().never();

    let mut config = sim_config(8, 4, 3, 1);
    config.sim.max_turns = 50;
    let report = Simulator::new(config).unwrap().run(&mut fabric).unwrap();
    assert!(!report.completed);
    assert!(!report.is_clean());
    assert_eq!(report.turns, 50);
    assert_eq!(report.delivered, 0);
}

// ══════════════════════════════════════════════════════════
// 3. Workload and checker
// ══════════════════════════════════════════════════════════

#[test]
fn workload_is_deterministic_and_bounded() {
    let config = sim_config(4, 4, 64, 11).sim;
    let a: Vec<_> = Workload::new(&config).collect();
    let b: Vec<_> = Workload::new(&config).collect();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    for (seq, request) in a.iter().enumerate() {
        assert_eq!(request.payload.seq, seq as u64);
        assert!(request.id.0 < config.ids);
        assert!((1..=config.max_beats).contains(&request.payload.beats));
    }
}

fn beat(id: u32, seq: u64, beat: u32, final_beat: bool) -> Response<SimBeat> {
    Response {
        id: OriginalId(id),
        payload: SimBeat { seq, beat },
        final_beat,
    }
}

#[test]
fn checker_accepts_framed_in_order_beats() {
    let mut checker = OrderChecker::new();
    checker.expect(OriginalId(1), SimRequest { seq: 0, beats: 2 });
    checker.expect(OriginalId(1), SimRequest { seq: 3, beats: 1 });
    checker.expect(OriginalId(2), SimRequest { seq: 1, beats: 1 });

    assert!(checker.observe(&beat(2, 1, 0, true)));
    assert!(checker.observe(&beat(1, 0, 0, false)));
    assert!(checker.observe(&beat(1, 0, 1, true)));
    assert!(checker.observe(&beat(1, 3, 0, true)));
    assert_eq!(checker.transactions(), 3);
    assert_eq!(checker.beats(), 4);
    assert_eq!(checker.outstanding(), 0);
}

#[test]
fn checker_flags_overtaking_and_bad_framing() {
    let mut checker = OrderChecker::new();
    checker.expect(OriginalId(1), SimRequest { seq: 0, beats: 1 });
    checker.expect(OriginalId(1), SimRequest { seq: 1, beats: 2 });

    assert!(!checker.observe(&beat(1, 1, 0, false)));
    assert!(checker.observe(&beat(1, 0, 0, true)));
    // Final flag on the first of two beats.
    assert!(!checker.observe(&beat(1, 1, 0, true)));
    // Nothing outstanding for id9.
    assert!(!checker.observe(&beat(9, 0, 0, true)));

    let violations = checker.violations();
    assert_eq!(violations.len(), 3);
    assert_eq!(violations[0].expected, Some((0, 0)));
    assert_eq!(violations[0].observed, (1, 0));
    assert_eq!(violations[2].expected, None);
}

// ══════════════════════════════════════════════════════════
// 4. Scripted scenarios
// ══════════════════════════════════════════════════════════

#[test]
fn scenario_a_restores_issue_order() {
    let trace = scenario::scenario_a().unwrap();
    let id = OriginalId(7);
    assert_eq!(trace.released(), vec![(id, 0), (id, 1), (id, 2), (id, 3)]);
    assert_eq!(trace.parked(), 2);
    assert_eq!(trace.peak_parked, 2);
}

#[test]
fn scenario_b_needs_no_parking() {
    let trace = scenario::scenario_b().unwrap();
    assert_eq!(trace.released(), vec![(OriginalId(5), 1), (OriginalId(3), 0)]);
    assert_eq!(trace.parked(), 0);
    assert!(trace.events.iter().all(|event| !matches!(
        event,
        TraceEvent::Released {
            kind: ReleaseKind::ParkHit,
            ..
        }
    )));
}

#[test]
fn scenario_c_stalls_until_free() {
    let trace = scenario::scenario_c().unwrap();
    let stalled = trace
        .events
        .iter()
        .position(|e| matches!(e, TraceEvent::Stalled { request: 2, .. }))
        .unwrap();
    let freed = trace
        .events
        .iter()
        .position(|e| matches!(e, TraceEvent::Released { request: 0, .. }))
        .unwrap();
    let granted = trace
        .events
        .iter()
        .position(|e| matches!(e, TraceEvent::Granted { request: 2, .. }))
        .unwrap();
    assert!(stalled < freed && freed < granted);
    assert!(trace.events.contains(&TraceEvent::Stalled {
        request: 2,
        reason: Rejection::TableFull,
    }));

    let id = OriginalId(9);
    assert_eq!(trace.released(), vec![(id, 0), (id, 1), (id, 2)]);
}

#[test]
fn replay_rejects_completing_unissued_request() {
    let result = scenario::replay(&Config::with_shape(1, 1), &[Step::Complete(0)]);
    assert!(result.is_err());
}

#[test]
fn replay_presents_refused_completion_again() {
    let mut config = Config::with_shape(1, 3);
    config.park.capacity = Some(1);
    let id = OriginalId(1);
    let trace = scenario::replay(
        &config,
        &[
            Step::Issue(id),
            Step::Issue(id),
            Step::Issue(id),
            Step::Complete(2),
            Step::Complete(1),
            Step::Complete(0),
        ],
    )
    .unwrap();

    assert!(trace.events.contains(&TraceEvent::Backpressured {
        request: 1,
        reason: Rejection::ParkFull,
    }));
    assert_eq!(trace.released(), vec![(id, 0), (id, 1), (id, 2)]);
    assert_eq!(trace.peak_parked, 1);
}

#[test]
fn replay_fails_when_refused_completion_can_never_land() {
    let mut config = Config::with_shape(1, 3);
    config.park.capacity = Some(1);
    let id = OriginalId(1);
    let result = scenario::replay(
        &config,
        &[
            Step::Issue(id),
            Step::Issue(id),
            Step::Issue(id),
            Step::Complete(2),
            Step::Complete(1),
        ],
    );
    assert!(matches!(result, Err(RemapError::Invariant(_))));
}

#[test]
fn trace_events_render() {
    let trace = scenario::scenario_a().unwrap();
    let lines: Vec<String> = trace.events.iter().map(ToString::to_string).collect();
    assert_eq!(lines[0], "req#1 granted r0c0");
    assert!(lines.contains(&"req#3 parked at r0c2".to_string()));
}
