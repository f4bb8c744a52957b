//! Engine Tests.
//!
//! Verifies channel admission, submission-age scheduling across channels,
//! forwarding order, withdrawal, and quiescence.

use pretty_assertions::assert_eq;
use tagremap_core::config::Config;
use tagremap_core::dispatch::DispatchState;
use tagremap_core::{Completion, Engine, OriginalId, Rejection, Request, Tag};

use crate::common::harness::init_tracing;

fn engine(rows: usize, cols: usize, channels: usize) -> Engine<&'static str, &'static str> {
    init_tracing();
    let mut config = Config::with_shape(rows, cols);
    config.dispatch.channels = channels;
    Engine::new(&config).unwrap()
}

#[test]
fn submit_fills_lowest_idle_channel() {
    let mut e = engine(2, 2, 2);
    assert_eq!(e.submit(Request::new(OriginalId(1), "a")), Ok(0));
    assert_eq!(e.submit(Request::new(OriginalId(1), "b")), Ok(1));
    assert!(!e.is_accepting());

    let back = e.submit(Request::new(OriginalId(1), "c")).unwrap_err();
    assert_eq!(back.payload, "c");
    assert_eq!(e.stats().accepted, 2);
}

#[test]
fn grants_follow_submission_order() {
    let mut e = engine(2, 2, 3);
    for payload in ["a", "b", "c"] {
        let _ = e.submit(Request::new(OriginalId(1), payload)).unwrap();
    }
    let turn = e.tick(None).unwrap();
    assert_eq!(turn.grants, vec![(0, Tag::new(0, 0)), (1, Tag::new(0, 1))]);
    assert_eq!(turn.stalls, vec![(2, Rejection::RowFull(OriginalId(1)))]);

    assert_eq!(e.take_outgoing().map(|r| r.payload), Some("a"));
    assert_eq!(e.take_outgoing().map(|r| r.payload), Some("b"));
    assert!(e.take_outgoing().is_none());
    assert_eq!(e.channel_state(2), Some(DispatchState::Allocating));
}

#[test]
fn older_request_on_higher_channel_is_granted_first() {
    let mut e = engine(1, 1, 2);
    let _ = e.submit(Request::new(OriginalId(1), "A")).unwrap();
    let _ = e.tick(None).unwrap();

    // B lands on channel 1 while A is still forwarding on channel 0.
    assert_eq!(e.submit(Request::new(OriginalId(1), "B")), Ok(1));
    let turn = e.tick(None).unwrap();
    assert_eq!(turn.stalls, vec![(1, Rejection::TableFull)]);

    let a = e.take_outgoing().unwrap();
    assert_eq!(a.payload, "A");
    // C is younger than B but sits on the lower channel.
    assert_eq!(e.submit(Request::new(OriginalId(1), "C")), Ok(0));

    let turn = e
        .tick(Some(Completion {
            tag: a.tag,
            payload: "A-resp",
            final_beat: true,
        }))
        .unwrap();
    assert_eq!(turn.releases.len(), 1);
    assert_eq!(turn.grants, vec![(1, Tag::new(0, 0))]);
    assert_eq!(turn.stalls, vec![(0, Rejection::TableFull)]);
    assert_eq!(e.take_outgoing().map(|r| r.payload), Some("B"));
}

#[test]
fn stalled_id_does_not_hold_back_other_ids() {
    let mut e = engine(2, 1, 2);
    let _ = e.submit(Request::new(OriginalId(1), "a")).unwrap();
    let _ = e.tick(None).unwrap();
    let _ = e.take_outgoing().unwrap();

    let _ = e.submit(Request::new(OriginalId(1), "b")).unwrap();
    let _ = e.submit(Request::new(OriginalId(2), "c")).unwrap();
    let turn = e.tick(None).unwrap();
    assert_eq!(turn.stalls, vec![(0, Rejection::RowFull(OriginalId(1)))]);
    // A different ID is not held back.
    assert_eq!(turn.grants, vec![(1, Tag::new(1, 0))]);
}

#[test]
fn withdraw_frees_stalled_channel() {
    let mut e = engine(1, 1, 1);
    let _ = e.submit(Request::new(OriginalId(1), "a")).unwrap();
    let _ = e.tick(None).unwrap();
    let _ = e.take_outgoing().unwrap();
    let _ = e.submit(Request::new(OriginalId(1), "b")).unwrap();
    let _ = e.tick(None).unwrap();

    let back = e.withdraw(0).unwrap();
    assert_eq!(back.payload, "b");
    assert_eq!(e.channel_state(0), Some(DispatchState::Idle));
    assert!(e.withdraw(5).is_none());
    // The granted tag of "a" is still live.
    assert_eq!(e.table().live_tags(), 1);
}

#[test]
fn quiescent_after_round_trip() {
    let mut e = engine(4, 4, 2);
    assert!(e.is_quiescent());
    let _ = e.submit(Request::new(OriginalId(9), "q")).unwrap();
    assert!(!e.is_quiescent());
    let _ = e.tick(None).unwrap();
    let sent = e.take_outgoing().unwrap();
    let turn = e
        .tick(Some(Completion {
            tag: sent.tag,
            payload: "r",
            final_beat: true,
        }))
        .unwrap();
    assert_eq!(turn.releases[0].response.id, OriginalId(9));
    assert!(e.is_quiescent());
    assert!(e.settle().unwrap().is_empty());
    assert_eq!(e.stats().grants, 1);
    assert_eq!(e.stats().freed, 1);
}

#[test]
fn invalid_config_is_refused() {
    let mut config = Config::with_shape(2, 2);
    config.dispatch.channels = 0;
    assert!(Engine::<(), ()>::new(&config).is_err());
}
