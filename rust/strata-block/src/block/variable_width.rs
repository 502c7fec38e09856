//! Variable-length byte payloads.

use strata_common::Result;

use crate::block::{Block, BlockOps, instance_part_id};
use crate::buffer::{PartId, SharedBuffer};
use crate::nulls::{self, NullMask};
use crate::offsets::{Offsets, to_offset};
use crate::size::{SIZE_OF_OFFSET, instance_size, null_mask_size};

/// Payloads addressed by offsets into a shared byte buffer.
///
/// Region views share both the offsets and the bytes with the block they
/// were cut from; only the bytes referenced by the view count towards its
/// logical size.
pub struct VariableWidthBlock {
    offsets: Offsets,
    bytes: SharedBuffer<u8>,
    nulls: NullMask,
}

impl VariableWidthBlock {
    /// Creates a block of `offsets.len() - 1` values over `bytes`.
    pub fn new(
        bytes: impl Into<SharedBuffer<u8>>,
        offsets: impl Into<SharedBuffer<u32>>,
        nulls: Option<Vec<bool>>,
    ) -> Result<VariableWidthBlock> {
        let bytes = bytes.into();
        let offsets = Offsets::from_buffer(offsets.into(), bytes.len())?;
        let nulls = nulls::mask_from_vec(nulls, offsets.item_count())?;
        Ok(VariableWidthBlock { offsets, bytes, nulls })
    }

    /// Builds a block from optional payloads.
    ///
    /// Fails if the payloads add up to more than `u32::MAX` bytes.
    pub fn from_slices<'a>(values: impl IntoIterator<Item = Option<&'a [u8]>>) -> Result<VariableWidthBlock> {
        let mut bytes = Vec::new();
        let mut offsets = vec![0u32];
        let mut flags = Vec::new();
        for value in values {
            if let Some(value) = value {
                bytes.extend_from_slice(value);
            }
            flags.push(value.is_none());
            offsets.push(to_offset(bytes.len())?);
        }
        let nulls = flags.iter().any(|&f| f).then(|| SharedBuffer::from_vec(flags));
        Ok(VariableWidthBlock {
            offsets: Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            bytes: SharedBuffer::from_vec(bytes),
            nulls,
        })
    }

    pub(crate) fn from_parts(offsets: Offsets, bytes: SharedBuffer<u8>, nulls: NullMask) -> VariableWidthBlock {
        VariableWidthBlock { offsets, bytes, nulls }
    }

    #[inline]
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    /// The whole shared byte buffer, including bytes outside of this view.
    #[inline]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    #[inline]
    pub(crate) fn slice(&self, position: usize) -> &[u8] {
        &self.bytes[self.offsets.range_at(position)]
    }

    fn gather(&self, positions: &[u32]) -> Result<(Vec<u32>, Vec<u8>)> {
        let total = positions.iter().map(|&p| self.offsets.length_at(p as usize)).sum();
        to_offset(total)?;
        let mut bytes = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(positions.len() + 1);
        offsets.push(0u32);
        for &p in positions {
            bytes.extend_from_slice(self.slice(p as usize));
            offsets.push(to_offset(bytes.len())?);
        }
        Ok((offsets, bytes))
    }
}

impl BlockOps for VariableWidthBlock {
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
        self.offsets.child_range(start, len).len()
            + len * SIZE_OF_OFFSET
            + null_mask_size(self.nulls.is_some(), len)
    }

    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let bytes: usize = selected
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| self.offsets.length_at(i))
            .sum();
        bytes + selected_count * SIZE_OF_OFFSET + null_mask_size(self.nulls.is_some(), selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.retained_size_in_bytes()
            + self.bytes.retained_size_in_bytes()
            + nulls::retained_size(&self.nulls)
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        consumer(self.offsets.part_id(), self.offsets.retained_size_in_bytes());
        consumer(self.bytes.part_id(), self.bytes.retained_size_in_bytes());
        nulls::report_part(&self.nulls, consumer);
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null_unchecked(position) {
            0
        } else {
            self.offsets.length_at(position)
        }
    }

    fn is_compact(&self) -> bool {
        self.offsets.is_compact()
            && self.bytes.is_compact()
            && self.bytes.len() == self.offsets.last()
            && nulls::is_compact(&self.nulls)
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        VariableWidthBlock {
            offsets: self.offsets.region(start, len),
            bytes: self.bytes.clone(),
            nulls: nulls::region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        let range = self.offsets.child_range(start, len);
        VariableWidthBlock {
            offsets: self.offsets.compact_region(start, len),
            bytes: self.bytes.compact_range(range),
            nulls: nulls::compact_region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let (offsets, bytes) = self.gather(positions)?;
        Ok(VariableWidthBlock {
            offsets: Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            bytes: SharedBuffer::from_vec(bytes),
            nulls: nulls::copy_positions(&self.nulls, positions),
        }
        .into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        let value = self.slice(position);
        let bounds = &self.offsets.as_slice()[position..position + 2];
        VariableWidthBlock {
            offsets: Offsets::from_buffer_unchecked(SharedBuffer::copy_from_slice(&[0, bounds[1] - bounds[0]])),
            bytes: SharedBuffer::copy_from_slice(value),
            nulls: nulls::single(self.is_null_unchecked(position)),
        }
        .into()
    }

    fn copy_with_appended_null(&self) -> Block {
        VariableWidthBlock {
            offsets: self.offsets.with_appended_empty(),
            bytes: self.bytes.clone(),
            nulls: Some(nulls::with_appended_null(&self.nulls, self.position_count())),
        }
        .into()
    }

    fn children(&self) -> Vec<Block> {
        Vec::new()
    }

    fn encoding_name(&self) -> &'static str {
        "VARIABLE_WIDTH"
    }
}
