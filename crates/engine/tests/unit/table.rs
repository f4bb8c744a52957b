//! Tag Table Tests.
//!
//! Verifies row binding, per-row column recycling, release pointers, the
//! restore map lifetime, and the global headroom limit.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tagremap_core::table::{Grant, RowBinding, TagTable};
use tagremap_core::{OriginalId, Rejection, RemapError, Tag, TagLayout};

fn table(rows: usize, cols: usize) -> TagTable {
    TagTable::new(TagLayout::new(rows, cols).unwrap(), 0).unwrap()
}

fn grant(table: &mut TagTable, id: u32) -> Tag {
    table
        .allocate(OriginalId(id))
        .tag()
        .unwrap_or_else(|| panic!("allocation for id{id} refused"))
}

// ══════════════════════════════════════════════════════════
// 1. Allocation and binding
// ══════════════════════════════════════════════════════════

#[test]
fn same_id_shares_a_row() {
    let mut t = table(2, 2);
    assert_eq!(grant(&mut t, 5), Tag::new(0, 0));
    assert_eq!(grant(&mut t, 5), Tag::new(0, 1));
    assert_eq!(t.row_of(OriginalId(5)), Some(0));
    assert_eq!(
        t.binding(0),
        Some(RowBinding {
            bound: true,
            original_id: OriginalId(5),
            outstanding: 2,
        })
    );
}

#[test]
fn distinct_ids_take_lowest_unbound_row() {
    let mut t = table(3, 2);
    assert_eq!(grant(&mut t, 1), Tag::new(0, 0));
    assert_eq!(grant(&mut t, 2), Tag::new(1, 0));
    assert_eq!(grant(&mut t, 3), Tag::new(2, 0));
}

#[test]
fn full_row_rejects_with_row_full() {
    let mut t = table(2, 2);
    let _ = grant(&mut t, 5);
    let _ = grant(&mut t, 5);
    assert_eq!(
        t.allocate(OriginalId(5)),
        Grant::Rejected(Rejection::RowFull(OriginalId(5)))
    );
    // Other IDs are unaffected.
    assert_eq!(grant(&mut t, 6), Tag::new(1, 0));
}

#[test]
fn no_unbound_row_rejects_new_id() {
    let mut t = table(2, 2);
    let _ = grant(&mut t, 1);
    let _ = grant(&mut t, 2);
    assert_eq!(
        t.allocate(OriginalId(3)),
        Grant::Rejected(Rejection::NoFreeRow(OriginalId(3)))
    );
    assert_eq!(t.check_allocate(OriginalId(1)), Ok(0));
}

/// Scenario C: a third request for an ID holding both columns is refused until a free.
#[test]
fn third_request_waits_for_free() {
    let mut t = table(1, 2);
    let first = grant(&mut t, 9);
    let _ = grant(&mut t, 9);

    let refused = t.allocate(OriginalId(9));
    assert!(!refused.is_granted());
    assert_eq!(t.live_tags(), 2);
    t.check_invariants().unwrap();

    assert_eq!(t.free(first).unwrap(), OriginalId(9));
    assert_eq!(grant(&mut t, 9), first);
}

#[test]
fn headroom_caps_live_tags() {
    let mut t = TagTable::new(TagLayout::new(2, 2).unwrap(), 1).unwrap();
    assert_eq!(t.capacity(), 3);
    let _ = grant(&mut t, 1);
    let _ = grant(&mut t, 1);
    let _ = grant(&mut t, 2);
    assert!(!t.has_spare());
    assert_eq!(
        t.allocate(OriginalId(2)),
        Grant::Rejected(Rejection::TableFull)
    );
}

#[test]
fn headroom_covering_namespace_is_invalid() {
    let layout = TagLayout::new(1, 2).unwrap();
    assert!(matches!(
        TagTable::new(layout, 2),
        Err(RemapError::InvalidConfig(_))
    ));
}

// ══════════════════════════════════════════════════════════
// 2. Release pointer and recycling
// ══════════════════════════════════════════════════════════

#[test]
fn head_follows_issue_order() {
    let mut t = table(1, 4);
    let a = grant(&mut t, 7);
    let b = grant(&mut t, 7);
    let c = grant(&mut t, 7);
    assert_eq!(t.head(0), Some(a));
    assert_eq!(t.issue_order(0), vec![a, b, c]);

    let _ = t.free(a).unwrap();
    assert_eq!(t.head(0), Some(b));
}

#[test]
fn freed_column_is_reissued_last() {
    let mut t = table(1, 4);
    let a = grant(&mut t, 7);
    let _ = grant(&mut t, 7);
    let _ = t.free(a).unwrap();
    assert_eq!(t.free_columns(0), vec![2, 3, 0]);
    assert_eq!(grant(&mut t, 7), Tag::new(0, 2));
    assert_eq!(grant(&mut t, 7), Tag::new(0, 3));
    assert_eq!(grant(&mut t, 7), Tag::new(0, 0));
}

#[test]
fn out_of_order_free_keeps_remaining_order() {
    let mut t = table(1, 4);
    let a = grant(&mut t, 7);
    let b = grant(&mut t, 7);
    let c = grant(&mut t, 7);
    let _ = t.free(b).unwrap();
    assert_eq!(t.issue_order(0), vec![a, c]);
    t.check_invariants().unwrap();
}

#[test]
fn row_unbinds_and_rebinds_to_new_id() {
    let mut t = table(1, 2);
    let a = grant(&mut t, 1);
    let _ = t.free(a).unwrap();
    assert_eq!(t.binding(0), Some(RowBinding::default()));
    assert_eq!(t.row_of(OriginalId(1)), None);
    assert!(t.is_empty());

    let b = grant(&mut t, 2);
    assert_eq!(b.row, 0);
    assert_eq!(t.restore(b).unwrap(), OriginalId(2));
}

#[test]
fn heads_are_lowest_row_first() {
    let mut t = table(3, 2);
    let _ = grant(&mut t, 1);
    let b = grant(&mut t, 2);
    let c = grant(&mut t, 3);
    let _ = t.free(Tag::new(0, 0)).unwrap();
    assert_eq!(t.heads().collect::<Vec<_>>(), vec![b, c]);
}

// ══════════════════════════════════════════════════════════
// 3. Restore map
// ══════════════════════════════════════════════════════════

#[test]
fn restore_valid_until_free() {
    let mut t = table(2, 2);
    let tag = grant(&mut t, 11);
    assert_eq!(t.restore(tag).unwrap(), OriginalId(11));
    let _ = t.free(tag).unwrap();
    assert_eq!(t.restore(tag), Err(RemapError::TagMismatch { tag }));
}

#[test]
fn double_free_underflows() {
    let mut t = table(2, 2);
    let tag = grant(&mut t, 11);
    let _ = t.free(tag).unwrap();
    assert_eq!(t.free(tag), Err(RemapError::Underflow { tag }));
    assert_eq!(t.live_tags(), 0);
}

#[test]
fn out_of_namespace_tag_is_mismatch() {
    let t = table(2, 2);
    let tag = Tag::new(5, 0);
    assert_eq!(t.restore(tag), Err(RemapError::TagMismatch { tag }));
    assert!(!t.is_allocated(tag));
}

// ══════════════════════════════════════════════════════════
// 4. Properties
// ══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Op {
    Alloc(u32),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..6).prop_map(Op::Alloc),
        (0usize..16).prop_map(Op::Free),
    ]
}

proptest! {
    #[test]
    fn invariants_hold_under_random_traffic(ops in prop::collection::vec(op(), 1..200)) {
        let mut t = table(3, 3);
        let mut live: Vec<(Tag, OriginalId)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(raw) => {
                    let id = OriginalId(raw);
                    let predicted = t.check_allocate(id);
                    match t.allocate(id) {
                        Grant::Granted(tag) => {
                            prop_assert_eq!(predicted, Ok(tag.row_index()));
                            prop_assert!(live.iter().all(|&(other, _)| other != tag));
                            for &(other, owner) in &live {
                                if owner == id {
                                    prop_assert_eq!(other.row, tag.row);
                                }
                            }
                            live.push((tag, id));
                        }
                        Grant::Rejected(reason) => prop_assert_eq!(predicted, Err(reason)),
                    }
                }
                Op::Free(pick) => {
                    if !live.is_empty() {
                        let (tag, id) = live.remove(pick % live.len());
                        prop_assert_eq!(t.free(tag), Ok(id));
                    }
                }
            }
            prop_assert_eq!(t.live_tags(), live.len());
            prop_assert!(t.check_invariants().is_ok());
        }
    }
}
