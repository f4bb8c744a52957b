//! Ring Buffer Tests.
//!
//! Verifies FIFO order, wrap-around, capacity limits, and in-place removal.

use pretty_assertions::assert_eq;
use tagremap_core::common::Ring;

#[test]
fn fifo_order_with_wraparound() {
    let mut ring: Ring<u16> = Ring::new(3);
    assert!(ring.push_back(1));
    assert!(ring.push_back(2));
    assert_eq!(ring.pop_front(), Some(1));
    assert!(ring.push_back(3));
    assert!(ring.push_back(4));
    // Tail wrapped to slot 0.
    assert!(ring.is_full());
    assert_eq!(ring.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
}

#[test]
fn push_refused_when_full() {
    let mut ring: Ring<u16> = Ring::filled(2, [7, 8, 9]);
    assert_eq!(ring.len(), 2);
    assert!(!ring.push_back(10));
    assert_eq!(ring.front(), Some(7));
}

#[test]
fn pop_empty_is_none() {
    let mut ring: Ring<u16> = Ring::new(2);
    assert!(ring.is_empty());
    assert_eq!(ring.pop_front(), None);
    assert_eq!(ring.front(), None);
}

#[test]
fn remove_middle_keeps_order() {
    let mut ring: Ring<u16> = Ring::new(4);
    let _ = ring.pop_front();
    // Shift head so removal crosses the wrap point.
    assert!(ring.push_back(0));
    assert_eq!(ring.pop_front(), Some(0));
    for v in [1, 2, 3, 4] {
        assert!(ring.push_back(v));
    }
    assert!(ring.remove(2));
    assert_eq!(ring.iter().collect::<Vec<_>>(), vec![1, 3, 4]);
    assert!(ring.push_back(5));
    assert_eq!(ring.iter().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
}

#[test]
fn remove_head_and_missing() {
    let mut ring: Ring<u16> = Ring::filled(3, [4, 5, 6]);
    assert!(ring.remove(4));
    assert_eq!(ring.front(), Some(5));
    assert!(!ring.remove(9));
    assert!(ring.contains(6));
    assert!(!ring.contains(4));
}
