//! Offsets of variable-length items.

use std::ops::Range;

use strata_common::{Error, Result, verify_arg};

use crate::buffer::{PartId, SharedBuffer, exact_vec};

/// A view of `item_count + 1` monotonically non-decreasing `u32` offsets.
///
/// Item `i` spans `offsets[i]..offsets[i + 1]` of the child storage (bytes of a
/// variable-width block, positions of the element block of an array or map).
/// Region views keep the original offsets, so the first offset of a view is
/// not necessarily zero.
#[derive(Debug, Clone)]
pub struct Offsets(SharedBuffer<u32>);

impl Offsets {
    /// Wraps a buffer of offsets, validating that it is non-empty, monotonic,
    /// and does not address past `child_len`.
    pub fn from_buffer(offsets: SharedBuffer<u32>, child_len: usize) -> Result<Offsets> {
        verify_arg!(offsets, !offsets.is_empty());
        verify_arg!(offsets, offsets.windows(2).all(|w| w[0] <= w[1]));
        let last = offsets[offsets.len() - 1] as usize;
        if last > child_len {
            return Err(Error::invalid_arg(
                "offsets",
                format!("last offset {last} exceeds child length {child_len}"),
            ));
        }
        Ok(Offsets(offsets))
    }

    /// Offsets of `count` empty items.
    pub fn zeroed(count: usize) -> Offsets {
        Offsets(SharedBuffer::from_vec(vec![0; count + 1]))
    }

    /// Wraps a buffer already known to satisfy the offsets invariants.
    pub(crate) fn from_buffer_unchecked(offsets: SharedBuffer<u32>) -> Offsets {
        debug_assert!(!offsets.is_empty());
        Offsets(offsets)
    }

    #[inline]
    pub fn item_count(&self) -> usize {
        self.0.len() - 1
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        self.0.as_slice()
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.0[0] as usize
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.0[self.0.len() - 1] as usize
    }

    /// Total length of the addressed child range.
    #[inline]
    pub fn span(&self) -> usize {
        self.last() - self.first()
    }

    #[inline]
    pub fn range_at(&self, index: usize) -> Range<usize> {
        self.0[index] as usize..self.0[index + 1] as usize
    }

    #[inline]
    pub fn length_at(&self, index: usize) -> usize {
        (self.0[index + 1] - self.0[index]) as usize
    }

    /// Child range spanned by items `[start, start + len)`.
    #[inline]
    pub fn child_range(&self, start: usize, len: usize) -> Range<usize> {
        self.0[start] as usize..self.0[start + len] as usize
    }

    /// Zero-copy view of the offsets of items `[start, start + len)`.
    pub fn region(&self, start: usize, len: usize) -> Offsets {
        Offsets(self.0.slice(start..start + len + 1))
    }

    /// Compact offsets of items `[start, start + len)` rebased to zero.
    ///
    /// Returns the offsets themselves when they are already compact and the
    /// range covers them.
    pub fn compact_region(&self, start: usize, len: usize) -> Offsets {
        if start == 0 && len == self.item_count() && self.is_compact() {
            return self.clone();
        }
        let slice = &self.0[start..start + len + 1];
        let base = slice[0];
        Offsets(SharedBuffer::from_vec(exact_vec(
            slice.iter().map(|&o| o - base),
            slice.len(),
        )))
    }

    /// Compact offsets of the selected items, along with the list of child
    /// positions they cover (in order).
    pub fn gather(&self, positions: &[u32]) -> Result<(Offsets, Vec<u32>)> {
        gather_children(self.as_slice(), positions)
    }

    /// Compact offsets extended with one empty trailing item.
    pub fn with_appended_empty(&self) -> Offsets {
        Offsets(self.0.with_appended(self.last() as u32))
    }

    /// Marks every child position covered by the selected items.
    ///
    /// Returns the number of marked child positions.
    pub fn mark_children(&self, selected: &[bool], child_selected: &mut [bool]) -> usize {
        mark_children(self.as_slice(), selected, child_selected)
    }

    /// `true` if the offsets start at zero and the buffer is compact.
    #[inline]
    pub fn is_compact(&self) -> bool {
        self.0[0] == 0 && self.0.is_compact()
    }

    #[inline]
    pub fn retained_size_in_bytes(&self) -> usize {
        self.0.retained_size_in_bytes()
    }

    #[inline]
    pub fn part_id(&self) -> PartId {
        self.0.part_id()
    }
}

/// Converts a child length to a stored offset.
#[inline]
pub(crate) fn to_offset(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::invalid_arg("offsets", format!("offset {value} exceeds the u32 offset range")))
}

/// [`Offsets::gather`] over raw offsets.
pub(crate) fn gather_children(offsets: &[u32], positions: &[u32]) -> Result<(Offsets, Vec<u32>)> {
    let range_at = |p: u32| offsets[p as usize]..offsets[p as usize + 1];
    let total: usize = positions.iter().map(|&p| range_at(p).len()).sum();
    to_offset(total)?;
    let mut gathered = Vec::with_capacity(positions.len() + 1);
    let mut child_positions = Vec::with_capacity(total);
    gathered.push(0u32);
    for &position in positions {
        child_positions.extend(range_at(position));
        gathered.push(to_offset(child_positions.len())?);
    }
    Ok((Offsets(SharedBuffer::from_vec(gathered)), child_positions))
}

/// [`Offsets::mark_children`] over raw offsets.
pub(crate) fn mark_children(offsets: &[u32], selected: &[bool], child_selected: &mut [bool]) -> usize {
    let mut count = 0;
    for (index, _) in selected.iter().enumerate().filter(|(_, s)| **s) {
        let range = offsets[index] as usize..offsets[index + 1] as usize;
        count += range.len();
        child_selected[range].fill(true);
    }
    count
}
