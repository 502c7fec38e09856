//! Builder of array values.

use strata_common::{Error, Result};

use crate::block::array::nested_overhead;
use crate::block::{ArrayBlock, Block};
use crate::buffer::{SharedBuffer, exact_vec};
use crate::builder::{BlockBuilder, calculate_block_reset_size};
use crate::nulls::NullsBuilder;
use crate::offsets::{self, Offsets, to_offset};
use crate::size::{SIZE_OF_OFFSET, instance_size};

/// Each entry is the run of elements appended to the element builder
/// between `begin_entry` and `close_entry`.
#[derive(Debug)]
pub struct ArrayBlockBuilder {
    offsets: Vec<u32>,
    values: Box<BlockBuilder>,
    nulls: NullsBuilder,
    entry_open: bool,
}

impl ArrayBlockBuilder {
    pub fn new(values: BlockBuilder, expected_entries: usize) -> ArrayBlockBuilder {
        let mut offsets = Vec::with_capacity(expected_entries + 1);
        offsets.push(0);
        ArrayBlockBuilder {
            offsets,
            values: Box::new(values),
            nulls: NullsBuilder::with_capacity(expected_entries),
            entry_open: false,
        }
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    pub fn has_open_entry(&self) -> bool {
        self.entry_open
    }

    /// The element builder. Elements appended outside an open entry are
    /// rejected when the entry is closed or the block is built.
    #[inline]
    pub fn elements(&mut self) -> &mut BlockBuilder {
        &mut self.values
    }

    pub fn begin_entry(&mut self) -> Result<&mut BlockBuilder> {
        if self.entry_open {
            return Err(Error::invalid_operation("begin_block_entry with an open entry"));
        }
        self.verify_elements_committed()?;
        self.entry_open = true;
        Ok(&mut self.values)
    }

    pub fn close_entry(&mut self) -> Result<()> {
        if !self.entry_open {
            return Err(Error::invalid_operation("close_entry without an open entry"));
        }
        if self.values.has_open_entry() {
            return Err(Error::invalid_operation("close_entry with an open element entry"));
        }
        self.offsets.push(to_offset(self.values.position_count())?);
        self.nulls.push(false);
        self.entry_open = false;
        Ok(())
    }

    pub fn append_null(&mut self) -> Result<()> {
        if self.entry_open {
            return Err(Error::invalid_operation("append_null with an open entry"));
        }
        self.verify_elements_committed()?;
        self.offsets.push(self.offsets[self.offsets.len() - 1]);
        self.nulls.push(true);
        Ok(())
    }

    pub(crate) fn append_from(&mut self, source: &ArrayBlock, position: usize) -> Result<()> {
        self.verify_elements_committed()?;
        let range = source.offsets().range_at(position);
        let end = to_offset(self.values.position_count() + range.len())?;
        self.values.append_range(source.raw_values(), range.start, range.len())?;
        self.offsets.push(end);
        self.nulls.push(false);
        Ok(())
    }

    #[inline]
    fn committed_elements(&self) -> usize {
        self.offsets[self.offsets.len() - 1] as usize
    }

    fn verify_elements_committed(&self) -> Result<()> {
        if self.values.position_count() != self.committed_elements() {
            return Err(Error::invalid_operation("elements appended outside of an array entry"));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn nulls(&self) -> &NullsBuilder {
        &self.nulls
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.nulls.is_null(position)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes(0, self.position_count())
    }

    pub fn region_size_in_bytes(&self, start: usize, len: usize) -> usize {
        let child_start = self.offsets[start] as usize;
        let child_len = self.offsets[start + len] as usize - child_start;
        self.values.region_size_in_bytes_unchecked(child_start, child_len)
            + nested_overhead(self.nulls.has_null(), len)
    }

    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let mut children = vec![false; self.committed_elements()];
        let child_count = offsets::mark_children(&self.offsets, selected, &mut children);
        self.values.positions_size_in_bytes_unchecked(&children, child_count)
            + nested_overhead(self.nulls.has_null(), selected_count)
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.capacity() * SIZE_OF_OFFSET
            + self.nulls.retained_size_in_bytes()
            + self.values.retained_size_in_bytes()
    }

    pub fn copy_region(&self, start: usize, len: usize) -> Block {
        let offsets = &self.offsets[start..start + len + 1];
        let base = offsets[0];
        ArrayBlock::from_parts(
            rebased_offsets(offsets),
            self.values
                .copy_region_unchecked(base as usize, (offsets[len] - base) as usize),
            self.nulls.copy_region(start, len),
        )
        .into()
    }

    pub fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let (offsets, child_positions) = offsets::gather_children(&self.offsets, positions)?;
        Ok(ArrayBlock::from_parts(
            offsets,
            self.values.copy_positions_unchecked(&child_positions)?,
            self.nulls.copy_positions(positions),
        )
        .into())
    }

    pub(crate) fn verify_buildable(&self) -> Result<()> {
        self.verify_elements_committed()?;
        self.values.verify_buildable()
    }

    pub fn build(&mut self) -> Result<Block> {
        self.verify_elements_committed()?;
        let values = self.values.build()?;
        let offsets = std::mem::replace(&mut self.offsets, vec![0]);
        Ok(ArrayBlock::from_parts(
            Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            values,
            self.nulls.take_mask(),
        )
        .into())
    }

    pub fn reset(&mut self) {
        self.offsets.truncate(1);
        self.values.reset();
        self.nulls.clear();
        self.entry_open = false;
    }

    pub fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
        self.nulls.reserve(additional);
    }

    pub fn new_like(&self) -> ArrayBlockBuilder {
        ArrayBlockBuilder::new(
            self.values.new_block_builder_like(),
            calculate_block_reset_size(self.position_count()),
        )
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.offsets.truncate(len + 1);
        let committed = self.committed_elements();
        self.values.truncate(committed);
        self.nulls.truncate(len);
        self.entry_open = false;
    }
}

/// Offsets of `[offsets[0], offsets[len]]` rebased to start at zero, in an
/// exact allocation.
pub(crate) fn rebased_offsets(offsets: &[u32]) -> Offsets {
    let base = offsets[0];
    Offsets::from_buffer_unchecked(SharedBuffer::from_vec(exact_vec(
        offsets.iter().map(|&o| o - base),
        offsets.len(),
    )))
}
