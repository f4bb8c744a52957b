//! Tag Table: namespace ownership, ID binding, and recycling.
//!
//! The table is an arena of fixed-size rows indexed by row number. Each row
//! owns two fixed-capacity rings over its columns:
//! 1. **Free list:** Columns available for allocation. Allocation pops the head,
//!    free pushes the tail, so a just-freed column is reissued last.
//! 2. **Issue order:** Columns in dispatch order. Its head is the row's release
//!    pointer, the next completion the caller may observe for the bound ID.
//!
//! A row is bound to one original ID while it has outstanding transactions and
//! unbound as soon as the count returns to zero. The restore map records the
//! original ID for every allocated tag until that tag is freed.

use tracing::{debug, trace, warn};

use crate::common::error::{Rejection, RemapError};
use crate::common::ids::{OriginalId, Tag, TagLayout};
use crate::common::ring::Ring;

/// Outcome of an allocation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Grant {
    /// A tag was allocated.
    Granted(Tag),
    /// No tag is available; retry after a free.
    Rejected(Rejection),
}

impl Grant {
    /// Returns the granted tag, if any.
    pub const fn tag(self) -> Option<Tag> {
        match self {
            Self::Granted(tag) => Some(tag),
            Self::Rejected(_) => None,
        }
    }

    /// Returns true if a tag was granted.
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Binding state of one row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowBinding {
    /// Whether the row currently belongs to an original ID.
    pub bound: bool,
    /// The bound ID (meaningful only while `bound`).
    pub original_id: OriginalId,
    /// Transactions allocated in this row and not yet freed.
    pub outstanding: usize,
}

#[derive(Clone, Debug)]
struct Row {
    binding: RowBinding,
    free: Ring<u16>,
    issue: Ring<u16>,
}

impl Row {
    fn new(num_cols: usize) -> Self {
        Self {
            binding: RowBinding::default(),
            free: Ring::filled(num_cols, 0..num_cols as u16),
            issue: Ring::new(num_cols),
        }
    }
}

/// Tag allocator and tag-to-ID restore map.
#[derive(Clone, Debug)]
pub struct TagTable {
    layout: TagLayout,
    rows: Vec<Row>,
    /// Original ID per allocated tag, indexed by `TagLayout::index`.
    restore: Vec<Option<OriginalId>>,
    live: usize,
    limit: usize,
}

impl TagTable {
    /// Creates an empty table.
    ///
    /// # Arguments
    ///
    /// * `layout` - Namespace shape.
    /// * `headroom` - Tags held back, so at most `slots - headroom` are ever live.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the headroom consumes the whole namespace.
    pub fn new(layout: TagLayout, headroom: usize) -> Result<Self, RemapError> {
        let slots = layout.slots();
        if headroom >= slots {
            return Err(RemapError::InvalidConfig(format!(
                "headroom {headroom} leaves no allocatable tags out of {slots}"
            )));
        }
        Ok(Self {
            layout,
            rows: (0..layout.num_rows())
                .map(|_| Row::new(layout.num_cols()))
                .collect(),
            restore: vec![None; slots],
            live: 0,
            limit: slots - headroom,
        })
    }

    /// Namespace shape.
    #[inline]
    pub const fn layout(&self) -> TagLayout {
        self.layout
    }

    /// Maximum number of simultaneously live tags.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.limit
    }

    /// Number of allocated tags.
    #[inline]
    pub const fn live_tags(&self) -> usize {
        self.live
    }

    /// Returns true if the global limit still allows an allocation.
    #[inline]
    pub const fn has_spare(&self) -> bool {
        self.live < self.limit
    }

    /// Returns true if nothing is allocated.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Binding state of `row`.
    pub fn binding(&self, row: usize) -> Option<RowBinding> {
        self.rows.get(row).map(|r| r.binding)
    }

    /// Row currently bound to `id`.
    pub fn row_of(&self, id: OriginalId) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.binding.bound && r.binding.original_id == id)
    }

    /// Release pointer of `row`: the oldest outstanding tag in issue order.
    pub fn head(&self, row: usize) -> Option<Tag> {
        let r = self.rows.get(row)?;
        r.issue.front().map(|col| Tag::new(row as u16, col))
    }

    /// Release pointers of every row with outstanding work, lowest row first.
    pub fn heads(&self) -> impl Iterator<Item = Tag> + '_ {
        self.rows.iter().enumerate().filter_map(|(row, r)| {
            r.issue.front().map(|col| Tag::new(row as u16, col))
        })
    }

    /// Outstanding tags of `row` in issue order.
    pub fn issue_order(&self, row: usize) -> Vec<Tag> {
        self.rows.get(row).map_or_else(Vec::new, |r| {
            r.issue.iter().map(|col| Tag::new(row as u16, col)).collect()
        })
    }

    /// Free columns of `row` in reuse order.
    pub fn free_columns(&self, row: usize) -> Vec<u16> {
        self.rows
            .get(row)
            .map_or_else(Vec::new, |r| r.free.iter().collect())
    }

    /// Returns true if `tag` is currently allocated.
    pub fn is_allocated(&self, tag: Tag) -> bool {
        self.layout.contains(tag) && self.restore[self.layout.index(tag)].is_some()
    }

    /// Predicts the outcome of [`TagTable::allocate`] without changing state.
    pub fn check_allocate(&self, id: OriginalId) -> Result<usize, Rejection> {
        if !self.has_spare() {
            return Err(Rejection::TableFull);
        }
        match self.row_of(id) {
            Some(row) if self.rows[row].free.is_empty() => Err(Rejection::RowFull(id)),
            Some(row) => Ok(row),
            None => self
                .rows
                .iter()
                .position(|r| !r.binding.bound)
                .ok_or(Rejection::NoFreeRow(id)),
        }
    }

    /// Allocates a tag for `id`.
    ///
    /// Prefers the row already bound to `id`, so all of the ID's outstanding
    /// transactions share one issue order; otherwise binds the lowest unbound
    /// row. Rejection is the backpressure signal and leaves the table untouched.
    pub fn allocate(&mut self, id: OriginalId) -> Grant {
        let row_idx = match self.check_allocate(id) {
            Ok(row) => row,
            Err(reason) => {
                trace!(%id, %reason, "allocation rejected");
                return Grant::Rejected(reason);
            }
        };

        let row = &mut self.rows[row_idx];
        let Some(col) = row.free.pop_front() else {
            return Grant::Rejected(Rejection::RowFull(id));
        };
        let queued = row.issue.push_back(col);
        debug_assert!(queued, "issue order overflow in row {row_idx}");

        if !row.binding.bound {
            row.binding.bound = true;
            row.binding.original_id = id;
            debug!(%id, row = row_idx, "row bound");
        }
        row.binding.outstanding += 1;

        let tag = Tag::new(row_idx as u16, col);
        self.restore[self.layout.index(tag)] = Some(id);
        self.live += 1;
        trace!(%id, %tag, live = self.live, "tag allocated");
        Grant::Granted(tag)
    }

    /// Original ID of an allocated tag.
    ///
    /// Valid from the allocation until the matching free. After the free the
    /// tag is unowned and the lookup fails rather than returning a stale ID.
    ///
    /// # Errors
    ///
    /// Returns `TagMismatch` if `tag` is not allocated.
    pub fn restore(&self, tag: Tag) -> Result<OriginalId, RemapError> {
        if !self.layout.contains(tag) {
            return Err(RemapError::TagMismatch { tag });
        }
        self.restore[self.layout.index(tag)].ok_or(RemapError::TagMismatch { tag })
    }

    /// Returns an allocated tag to its row's free list.
    ///
    /// The column leaves the issue order (normally from its head, which
    /// advances the release pointer) and joins the tail of the free list. The
    /// row unbinds when its last outstanding transaction is freed.
    ///
    /// # Errors
    ///
    /// Returns `Underflow` if `tag` is not allocated, or `Invariant` if the
    /// row's bookkeeping disagrees with the restore map.
    pub fn free(&mut self, tag: Tag) -> Result<OriginalId, RemapError> {
        if !self.layout.contains(tag) {
            return Err(RemapError::Underflow { tag });
        }
        let idx = self.layout.index(tag);
        let Some(id) = self.restore[idx] else {
            return Err(RemapError::Underflow { tag });
        };

        let row = &mut self.rows[tag.row_index()];
        if row.binding.outstanding == 0 || !row.binding.bound || row.binding.original_id != id {
            return Err(RemapError::Invariant(format!(
                "row {} binding {:?} disagrees with allocated tag {tag} of {id}",
                tag.row, row.binding
            )));
        }
        if row.issue.front() != Some(tag.col) {
            warn!(%tag, %id, "freeing tag ahead of its release turn");
        }
        if !row.issue.remove(tag.col) {
            return Err(RemapError::Invariant(format!(
                "tag {tag} allocated but missing from issue order"
            )));
        }
        if !row.free.push_back(tag.col) {
            return Err(RemapError::Invariant(format!(
                "free list of row {} overflowed",
                tag.row
            )));
        }

        row.binding.outstanding -= 1;
        if row.binding.outstanding == 0 {
            row.binding = RowBinding::default();
            debug!(%id, row = tag.row, "row unbound");
        }
        self.restore[idx] = None;
        self.live -= 1;
        trace!(%id, %tag, live = self.live, "tag freed");
        Ok(id)
    }

    /// Verifies every structural invariant of the table.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` describing the first inconsistency found.
    pub fn check_invariants(&self) -> Result<(), RemapError> {
        let cols = self.layout.num_cols();
        let mut total = 0;
        let mut bound_ids = Vec::new();
        for (row_idx, row) in self.rows.iter().enumerate() {
            let b = row.binding;
            if b.outstanding != row.issue.len() {
                return Err(RemapError::Invariant(format!(
                    "row {row_idx}: outstanding {} but {} columns in issue order",
                    b.outstanding,
                    row.issue.len()
                )));
            }
            if b.bound != (b.outstanding > 0) {
                return Err(RemapError::Invariant(format!(
                    "row {row_idx}: bound={} with {} outstanding",
                    b.bound, b.outstanding
                )));
            }
            if row.free.len() + row.issue.len() != cols {
                return Err(RemapError::Invariant(format!(
                    "row {row_idx}: {} free + {} issued != {cols} columns",
                    row.free.len(),
                    row.issue.len()
                )));
            }
            if b.bound {
                if bound_ids.contains(&b.original_id) {
                    return Err(RemapError::Invariant(format!(
                        "{} bound to more than one row",
                        b.original_id
                    )));
                }
                bound_ids.push(b.original_id);
            }
            for col in 0..cols as u16 {
                let tag = Tag::new(row_idx as u16, col);
                let issued = row.issue.contains(col);
                let free = row.free.contains(col);
                if issued == free {
                    return Err(RemapError::Invariant(format!(
                        "tag {tag}: issued={issued} free={free}"
                    )));
                }
                match self.restore[self.layout.index(tag)] {
                    Some(id) if issued && id == b.original_id => {}
                    None if free => {}
                    other => {
                        return Err(RemapError::Invariant(format!(
                            "tag {tag}: restore entry {other:?} inconsistent with row binding"
                        )));
                    }
                }
            }
            total += b.outstanding;
        }
        if total != self.live || self.live > self.limit {
            return Err(RemapError::Invariant(format!(
                "live count {} vs {total} outstanding, limit {}",
                self.live, self.limit
            )));
        }
        Ok(())
    }
}
