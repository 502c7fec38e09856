//! Run-length encoded blocks.

use strata_common::{Result, verify_arg};

use crate::block::{Block, BlockKind, BlockOps, DictionaryBlock, DictionaryId, instance_part_id};
use crate::buffer::{PartId, SharedBuffer};
use crate::size::instance_size;

/// A single value repeated `position_count` times.
pub struct RunLengthBlock {
    value: Block,
    position_count: usize,
}

impl RunLengthBlock {
    /// Repeats the single position of `value` `position_count` times.
    ///
    /// No positions yield an empty block and a single position yields
    /// `value` itself.
    pub fn create(value: Block, position_count: usize) -> Result<Block> {
        verify_arg!(value, value.position_count() == 1);
        Ok(RunLengthBlock::create_unchecked(value, position_count))
    }

    pub(crate) fn create_unchecked(value: Block, position_count: usize) -> Block {
        debug_assert_eq!(value.position_count(), 1);
        match position_count {
            0 => value.copy_region_unchecked(0, 0),
            1 => value,
            _ => RunLengthBlock::new_unchecked(value, position_count).into(),
        }
    }

    pub(crate) fn new_unchecked(value: Block, position_count: usize) -> RunLengthBlock {
        // The repeated value is kept flat.
        let value = match value.kind() {
            BlockKind::Rle(_) | BlockKind::Dictionary(_) => value.ops().single_value_block(0),
            _ => value,
        };
        RunLengthBlock { value, position_count }
    }

    /// The single-position repeated value.
    #[inline]
    pub fn value(&self) -> &Block {
        &self.value
    }

    #[inline]
    fn is_null_value(&self) -> bool {
        self.value.ops().is_null_unchecked(0)
    }
}

impl BlockOps for RunLengthBlock {
    #[inline]
    fn position_count(&self) -> usize {
        self.position_count
    }

    fn may_have_null(&self) -> bool {
        self.position_count > 0 && self.is_null_value()
    }

    fn is_null_unchecked(&self, _position: usize) -> bool {
        self.is_null_value()
    }

    fn size_in_bytes(&self) -> usize {
        self.value.size_in_bytes()
    }

    fn region_size_in_bytes(&self, _start: usize, len: usize) -> usize {
        if len == 0 { 0 } else { self.value.size_in_bytes() }
    }

    fn positions_size_in_bytes(&self, _selected: &[bool], selected_count: usize) -> usize {
        self.region_size_in_bytes(0, selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>() + self.value.retained_size_in_bytes()
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        self.value.for_each_retained_part(consumer);
    }

    fn estimated_data_size_for_stats(&self, _position: usize) -> usize {
        self.value.ops().estimated_data_size_for_stats(0)
    }

    fn is_compact(&self) -> bool {
        self.value.is_compact()
    }

    fn get_region(&self, _start: usize, len: usize) -> Block {
        RunLengthBlock::create_unchecked(self.value.clone(), len)
    }

    fn copy_region(&self, _start: usize, len: usize) -> Block {
        RunLengthBlock::create_unchecked(self.value.copy_region_unchecked(0, 1), len)
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        Ok(RunLengthBlock::create_unchecked(
            self.value.copy_region_unchecked(0, 1),
            positions.len(),
        ))
    }

    fn single_value_block(&self, _position: usize) -> Block {
        self.value.clone()
    }

    fn copy_with_appended_null(&self) -> Block {
        if self.is_null_value() {
            return RunLengthBlock::new_unchecked(self.value.clone(), self.position_count + 1).into();
        }
        let dictionary = self.value.copy_with_appended_null();
        let mut ids = vec![0u32; self.position_count + 1];
        ids[self.position_count] = 1;
        DictionaryBlock::new_unchecked(SharedBuffer::from_vec(ids), dictionary, DictionaryId::random()).into()
    }

    fn children(&self) -> Vec<Block> {
        vec![self.value.clone()]
    }

    fn encoding_name(&self) -> &'static str {
        "RLE"
    }
}
