//! Builder of variable-length byte payloads.

use std::ops::Range;

use strata_common::{Error, Result};

use crate::block::{Block, VariableWidthBlock};
use crate::buffer::{SharedBuffer, exact_vec};
use crate::builder::calculate_block_reset_size;
use crate::nulls::NullsBuilder;
use crate::offsets::{Offsets, to_offset};
use crate::size::{SIZE_OF_OFFSET, instance_size, null_mask_size};

/// Accumulates payload bytes for the current entry until it is closed.
#[derive(Debug)]
pub struct VariableWidthBlockBuilder {
    offsets: Vec<u32>,
    bytes: Vec<u8>,
    nulls: NullsBuilder,
}

impl VariableWidthBlockBuilder {
    pub fn new(expected_entries: usize, expected_bytes: usize) -> VariableWidthBlockBuilder {
        let mut offsets = Vec::with_capacity(expected_entries + 1);
        offsets.push(0);
        VariableWidthBlockBuilder {
            offsets,
            bytes: Vec::with_capacity(expected_bytes),
            nulls: NullsBuilder::with_capacity(expected_entries),
        }
    }

    /// Number of closed entries.
    #[inline]
    pub fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    fn committed_offset(&self) -> u32 {
        self.offsets[self.offsets.len() - 1]
    }

    #[inline]
    fn committed_bytes(&self) -> usize {
        self.committed_offset() as usize
    }

    /// `true` while bytes were written since the last closed entry.
    #[inline]
    pub fn has_open_entry(&self) -> bool {
        self.bytes.len() != self.committed_bytes()
    }

    /// Appends bytes to the current entry.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.bytes.len() + bytes.len() > u32::MAX as usize {
            return Err(Error::invalid_operation("variable-width builder exceeds 4 GiB"));
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    /// Commits the bytes written since the last closed entry as one value.
    pub fn close_entry(&mut self) -> Result<()> {
        self.offsets.push(to_offset(self.bytes.len())?);
        self.nulls.push(false);
        Ok(())
    }

    pub fn append_null(&mut self) -> Result<()> {
        if self.has_open_entry() {
            return Err(Error::invalid_operation("append_null with an open entry"));
        }
        self.offsets.push(self.committed_offset());
        self.nulls.push(true);
        Ok(())
    }

    /// Appends a complete value.
    pub(crate) fn append_value(&mut self, value: &[u8]) -> Result<()> {
        self.write_bytes(value)?;
        self.close_entry()
    }

    pub(crate) fn append_range_from(&mut self, source: &VariableWidthBlock, start: usize, len: usize) -> Result<()> {
        let range = source.offsets().child_range(start, len);
        self.write_bytes(&source.raw_bytes()[range])?;
        let base = self.committed_offset();
        let source_offsets = &source.offsets().as_slice()[start..start + len + 1];
        let source_base = source_offsets[0];
        self.offsets
            .extend(source_offsets[1..].iter().map(|&o| o - source_base + base));
        match source.nulls() {
            Some(flags) => flags[start..start + len].iter().for_each(|&f| self.nulls.push(f)),
            None => self.nulls.push_n(false, len),
        }
        Ok(())
    }

    pub(crate) fn append_nulls(&mut self, count: usize) {
        let end = self.committed_offset();
        self.offsets.resize(self.offsets.len() + count, end);
        self.nulls.push_n(true, count);
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
        (self.offsets[start + len] - self.offsets[start]) as usize
            + len * SIZE_OF_OFFSET
            + null_mask_size(self.nulls.has_null(), len)
    }

    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let bytes: usize = selected
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| self.entry_range(i).len())
            .sum();
        bytes + selected_count * SIZE_OF_OFFSET + null_mask_size(self.nulls.has_null(), selected_count)
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.capacity() * SIZE_OF_OFFSET
            + self.bytes.capacity()
            + self.nulls.retained_size_in_bytes()
    }

    pub fn copy_region(&self, start: usize, len: usize) -> Block {
        let offsets = &self.offsets[start..start + len + 1];
        let base = offsets[0];
        let bytes = &self.bytes[base as usize..offsets[len] as usize];
        VariableWidthBlock::from_parts(
            Offsets::from_buffer_unchecked(SharedBuffer::from_vec(exact_vec(
                offsets.iter().map(|&o| o - base),
                offsets.len(),
            ))),
            SharedBuffer::copy_from_slice(bytes),
            self.nulls.copy_region(start, len),
        )
        .into()
    }

    /// Compact block of the listed entries. Fails if their bytes add up to
    /// more than `u32::MAX`.
    pub fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let total: usize = positions.iter().map(|&p| self.entry_range(p as usize).len()).sum();
        to_offset(total)?;
        let mut bytes = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(positions.len() + 1);
        offsets.push(0u32);
        for &p in positions {
            bytes.extend_from_slice(&self.bytes[self.entry_range(p as usize)]);
            offsets.push(to_offset(bytes.len())?);
        }
        Ok(VariableWidthBlock::from_parts(
            Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            SharedBuffer::from_vec(bytes),
            self.nulls.copy_positions(positions),
        )
        .into())
    }

    #[inline]
    fn entry_range(&self, position: usize) -> Range<usize> {
        self.offsets[position] as usize..self.offsets[position + 1] as usize
    }

    /// Moves the closed entries into a block, leaving the builder empty.
    pub fn build(&mut self) -> Block {
        let mut offsets = std::mem::take(&mut self.offsets);
        let bytes = std::mem::take(&mut self.bytes);
        let nulls = self.nulls.take_mask();
        self.offsets.push(0);
        if offsets.is_empty() {
            offsets.push(0);
        }
        VariableWidthBlock::from_parts(
            Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            SharedBuffer::from_vec(bytes),
            nulls,
        )
        .into()
    }

    pub fn reset(&mut self) {
        self.offsets.truncate(1);
        self.bytes.clear();
        self.nulls.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
        self.nulls.reserve(additional);
    }

    pub fn new_like(&self) -> VariableWidthBlockBuilder {
        VariableWidthBlockBuilder::new(
            calculate_block_reset_size(self.position_count()),
            calculate_block_reset_size(self.committed_bytes()),
        )
    }

    /// Keeps the first `len` entries, discarding any open entry.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.offsets.truncate(len + 1);
        self.bytes.truncate(self.committed_bytes());
        self.nulls.truncate(len);
    }
}
