//! Identifier types and tag packing.
//!
//! This module defines the three identifiers that flow through the remapper:
//! 1. **Original IDs:** The caller's correlation key, ordered per key.
//! 2. **Tags:** The internal `(row, column)` slot owned by one in-flight transaction.
//! 3. **Wire Tags:** The packed integer the transport carries instead of the original ID.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::RemapError;

/// Caller-visible correlation key.
///
/// Responses sharing an original ID are delivered in submission order.
/// An ID may be reused freely once all of its transactions have completed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct OriginalId(pub u32);

impl fmt::Display for OriginalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id{}", self.0)
    }
}

/// Internal transaction tag: a column slot within a row.
///
/// A row is bound to at most one original ID at a time; the column
/// distinguishes that ID's concurrently outstanding transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tag {
    /// Row index (tag namespace partition).
    pub row: u16,
    /// Column index within the row.
    pub col: u16,
}

impl Tag {
    /// Creates a tag from its row and column.
    #[inline]
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }

    /// Returns the row as an index.
    #[inline]
    pub const fn row_index(self) -> usize {
        self.row as usize
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.row, self.col)
    }
}

/// Packed tag as carried by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct WireTag(pub u32);

impl fmt::Display for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Shape of the tag namespace and its wire encoding.
///
/// The wire form is `(row << col_bits) | col`, where `col_bits` is the
/// smallest width (at least one bit) that holds every column index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagLayout {
    num_rows: u16,
    num_cols: u16,
    col_bits: u32,
}

/// Number of bits needed to encode indices `0..count` (at least one).
fn index_bits(count: usize) -> u32 {
    let max_index = count.saturating_sub(1);
    (usize::BITS - max_index.leading_zeros()).max(1)
}

impl TagLayout {
    /// Creates a layout for `num_rows × num_cols` tags.
    ///
    /// # Arguments
    ///
    /// * `num_rows` - Maximum number of concurrently distinct original IDs.
    /// * `num_cols` - Maximum in-flight transactions per original ID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if either dimension is zero, exceeds `u16`, or the
    /// packed tag would not fit in 32 bits.
    pub fn new(num_rows: usize, num_cols: usize) -> Result<Self, RemapError> {
        if num_rows == 0 || num_cols == 0 {
            return Err(RemapError::InvalidConfig(format!(
                "tag namespace must be non-empty (rows={num_rows}, cols={num_cols})"
            )));
        }
        let (Ok(rows), Ok(cols)) = (u16::try_from(num_rows), u16::try_from(num_cols)) else {
            return Err(RemapError::InvalidConfig(format!(
                "tag namespace {num_rows}x{num_cols} exceeds 16-bit row/column indices"
            )));
        };
        let col_bits = index_bits(num_cols);
        if col_bits + index_bits(num_rows) > u32::BITS {
            return Err(RemapError::InvalidConfig(format!(
                "tag namespace {num_rows}x{num_cols} does not fit a 32-bit wire tag"
            )));
        }
        Ok(Self {
            num_rows: rows,
            num_cols: cols,
            col_bits,
        })
    }

    /// Number of rows.
    #[inline]
    pub const fn num_rows(&self) -> usize {
        self.num_rows as usize
    }

    /// Number of columns per row.
    #[inline]
    pub const fn num_cols(&self) -> usize {
        self.num_cols as usize
    }

    /// Total number of tags in the namespace.
    #[inline]
    pub const fn slots(&self) -> usize {
        self.num_rows() * self.num_cols()
    }

    /// Width of the column field in the wire encoding.
    #[inline]
    pub const fn col_bits(&self) -> u32 {
        self.col_bits
    }

    /// Returns true if `tag` lies inside the namespace.
    #[inline]
    pub const fn contains(&self, tag: Tag) -> bool {
        tag.row < self.num_rows && tag.col < self.num_cols
    }

    /// Packs a tag into its wire form.
    #[inline]
    pub const fn encode(&self, tag: Tag) -> WireTag {
        WireTag(((tag.row as u32) << self.col_bits) | tag.col as u32)
    }

    /// Unpacks a wire tag.
    ///
    /// # Errors
    ///
    /// Returns `TagOutOfRange` if the row or column falls outside the namespace.
    pub fn decode(&self, wire: WireTag) -> Result<Tag, RemapError> {
        let col = wire.0 & ((1u32 << self.col_bits) - 1);
        let row = wire.0 >> self.col_bits;
        if row >= u32::from(self.num_rows) || col >= u32::from(self.num_cols) {
            return Err(RemapError::TagOutOfRange { raw: wire.0 });
        }
        Ok(Tag::new(row as u16, col as u16))
    }

    /// Flat slot index of a tag (row-major), used to key per-tag storage.
    #[inline]
    pub const fn index(&self, tag: Tag) -> usize {
        tag.row as usize * self.num_cols() + tag.col as usize
    }

    /// Inverse of [`TagLayout::index`].
    #[inline]
    pub const fn tag_at(&self, index: usize) -> Tag {
        let cols = self.num_cols();
        Tag::new((index / cols) as u16, (index % cols) as u16)
    }
}
