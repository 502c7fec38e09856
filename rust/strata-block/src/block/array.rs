//! Arrays over a flattened element block.

use strata_common::{Error, Result, verify_arg};

use crate::block::{Block, BlockOps, instance_part_id};
use crate::buffer::{PartId, SharedBuffer};
use crate::nulls::{self, NullMask};
use crate::offsets::Offsets;
use crate::size::{SIZE_OF_OFFSET, instance_size, null_mask_size};

/// Position `i` holds the elements `offsets[i]..offsets[i + 1]` of the
/// element block. Null arrays have no elements.
pub struct ArrayBlock {
    offsets: Offsets,
    values: Block,
    nulls: NullMask,
}

impl ArrayBlock {
    /// Creates an array block of `position_count` arrays over `values`.
    pub fn from_element_block(
        position_count: usize,
        nulls: Option<Vec<bool>>,
        offsets: impl Into<SharedBuffer<u32>>,
        values: Block,
    ) -> Result<Block> {
        let offsets = Offsets::from_buffer(offsets.into(), values.position_count())?;
        verify_arg!(offsets, offsets.item_count() == position_count);
        let nulls = nulls::mask_from_vec(nulls, position_count)?;
        verify_null_entries_empty(&offsets, &nulls)?;
        Ok(ArrayBlock { offsets, values, nulls }.into())
    }

    pub(crate) fn from_parts(offsets: Offsets, values: Block, nulls: NullMask) -> ArrayBlock {
        ArrayBlock { offsets, values, nulls }
    }

    #[inline]
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    /// The element block, including elements outside of this view.
    #[inline]
    pub fn raw_values(&self) -> &Block {
        &self.values
    }

    #[inline]
    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    pub(crate) fn elements_at(&self, position: usize) -> Block {
        let range = self.offsets.range_at(position);
        self.values.region_unchecked(range.start, range.len())
    }

    fn child_selection(&self, selected: &[bool]) -> (Vec<bool>, usize) {
        let mut child = vec![false; self.values.position_count()];
        let count = self.offsets.mark_children(selected, &mut child);
        (child, count)
    }
}

/// Fails when a null position of a nested block spans child positions.
pub(crate) fn verify_null_entries_empty(offsets: &Offsets, nulls: &NullMask) -> Result<()> {
    if let Some(flags) = nulls {
        if let Some(position) = (0..offsets.item_count()).find(|&i| flags[i] && offsets.length_at(i) != 0) {
            return Err(Error::invalid_arg(
                "offsets",
                format!("null entry at position {position} is not empty"),
            ));
        }
    }
    Ok(())
}

#[inline]
pub(crate) fn nested_overhead(has_mask: bool, count: usize) -> usize {
    count * SIZE_OF_OFFSET + null_mask_size(has_mask, count)
}

impl BlockOps for ArrayBlock {
    #[inline]
    fn position_count(&self) -> usize {
        self.offsets.item_count()
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null_unchecked(&self, position: usize) -> bool {
        nulls::is_null(&self.nulls, position)
    }

    fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes(0, self.position_count())
    }

    fn region_size_in_bytes(&self, start: usize, len: usize) -> usize {
        let range = self.offsets.child_range(start, len);
        self.values.ops().region_size_in_bytes(range.start, range.len())
            + nested_overhead(self.nulls.is_some(), len)
    }

    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let (child, child_count) = self.child_selection(selected);
        self.values.ops().positions_size_in_bytes(&child, child_count)
            + nested_overhead(self.nulls.is_some(), selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.retained_size_in_bytes()
            + nulls::retained_size(&self.nulls)
            + self.values.retained_size_in_bytes()
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        consumer(self.offsets.part_id(), self.offsets.retained_size_in_bytes());
        nulls::report_part(&self.nulls, consumer);
        self.values.for_each_retained_part(consumer);
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null_unchecked(position) {
            return 0;
        }
        self.offsets
            .range_at(position)
            .map(|p| self.values.ops().estimated_data_size_for_stats(p))
            .sum()
    }

    fn is_compact(&self) -> bool {
        self.offsets.is_compact()
            && self.offsets.last() == self.values.position_count()
            && self.values.is_compact()
            && nulls::is_compact(&self.nulls)
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        ArrayBlock {
            offsets: self.offsets.region(start, len),
            values: self.values.clone(),
            nulls: nulls::region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        let range = self.offsets.child_range(start, len);
        ArrayBlock {
            offsets: self.offsets.compact_region(start, len),
            values: self.values.copy_region_unchecked(range.start, range.len()),
            nulls: nulls::compact_region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let (offsets, child_positions) = self.offsets.gather(positions)?;
        Ok(ArrayBlock {
            offsets,
            values: self.values.ops().copy_positions(&child_positions)?,
            nulls: nulls::copy_positions(&self.nulls, positions),
        }
        .into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        self.copy_region(position, 1)
    }

    fn copy_with_appended_null(&self) -> Block {
        ArrayBlock {
            offsets: self.offsets.with_appended_empty(),
            values: self.values.clone(),
            nulls: Some(nulls::with_appended_null(&self.nulls, self.position_count())),
        }
        .into()
    }

    fn children(&self) -> Vec<Block> {
        vec![self.values.clone()]
    }

    fn encoding_name(&self) -> &'static str {
        "ARRAY"
    }
}
