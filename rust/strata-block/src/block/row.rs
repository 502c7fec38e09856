//! Rows over parallel field blocks.

use strata_common::{Result, verify_arg};

use crate::block::{Block, BlockOps, instance_part_id};
use crate::buffer::PartId;
use crate::nulls::{self, NullMask};
use crate::size::{instance_size, null_mask_size};
use crate::value::SqlRow;

/// Position `i` of a row block is position `i` of every field block. Row
/// nullness is independent of the nullness of the fields.
pub struct RowBlock {
    position_count: usize,
    fields: Vec<Block>,
    nulls: NullMask,
}

impl RowBlock {
    /// Creates a row block of `position_count` rows. Every field block must
    /// have exactly `position_count` positions.
    pub fn from_field_blocks(position_count: usize, nulls: Option<Vec<bool>>, fields: Vec<Block>) -> Result<Block> {
        verify_arg!(fields, !fields.is_empty());
        verify_arg!(fields, fields.iter().all(|f| f.position_count() == position_count));
        let nulls = nulls::mask_from_vec(nulls, position_count)?;
        Ok(RowBlock { position_count, fields, nulls }.into())
    }

    pub(crate) fn from_parts(position_count: usize, fields: Vec<Block>, nulls: NullMask) -> RowBlock {
        debug_assert!(fields.iter().all(|f| f.position_count() == position_count));
        RowBlock { position_count, fields, nulls }
    }

    pub fn fields(&self) -> &[Block] {
        &self.fields
    }

    #[inline]
    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    pub(crate) fn row_at(&self, position: usize) -> SqlRow {
        SqlRow::new(self.fields.clone(), position)
    }

    fn map_fields(&self, f: impl Fn(&Block) -> Block) -> Vec<Block> {
        self.fields.iter().map(f).collect()
    }
}

impl BlockOps for RowBlock {
    #[inline]
    fn position_count(&self) -> usize {
        self.position_count
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null_unchecked(&self, position: usize) -> bool {
        nulls::is_null(&self.nulls, position)
    }

    fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes(0, self.position_count)
    }

    fn region_size_in_bytes(&self, start: usize, len: usize) -> usize {
        self.fields
            .iter()
            .map(|f| f.ops().region_size_in_bytes(start, len))
            .sum::<usize>()
            + null_mask_size(self.nulls.is_some(), len)
    }

    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        self.fields
            .iter()
            .map(|f| f.ops().positions_size_in_bytes(selected, selected_count))
            .sum::<usize>()
            + null_mask_size(self.nulls.is_some(), selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.fields.capacity() * instance_size::<Block>()
            + nulls::retained_size(&self.nulls)
            + self.fields.iter().map(Block::retained_size_in_bytes).sum::<usize>()
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(
            instance_part_id(self),
            instance_size::<Self>() + self.fields.capacity() * instance_size::<Block>(),
        );
        nulls::report_part(&self.nulls, consumer);
        for field in &self.fields {
            field.for_each_retained_part(consumer);
        }
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null_unchecked(position) {
            return 0;
        }
        self.fields
            .iter()
            .map(|f| f.ops().estimated_data_size_for_stats(position))
            .sum()
    }

    fn is_compact(&self) -> bool {
        nulls::is_compact(&self.nulls) && self.fields.iter().all(Block::is_compact)
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        RowBlock {
            position_count: len,
            fields: self.map_fields(|f| f.region_unchecked(start, len)),
            nulls: nulls::region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        RowBlock {
            position_count: len,
            fields: self.map_fields(|f| f.copy_region_unchecked(start, len)),
            nulls: nulls::compact_region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let fields = self
            .fields
            .iter()
            .map(|f| f.ops().copy_positions(positions))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowBlock {
            position_count: positions.len(),
            fields,
            nulls: nulls::copy_positions(&self.nulls, positions),
        }
        .into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        self.copy_region(position, 1)
    }

    fn copy_with_appended_null(&self) -> Block {
        RowBlock {
            position_count: self.position_count + 1,
            fields: self.map_fields(Block::copy_with_appended_null),
            nulls: Some(nulls::with_appended_null(&self.nulls, self.position_count)),
        }
        .into()
    }

    fn children(&self) -> Vec<Block> {
        self.fields.clone()
    }

    fn encoding_name(&self) -> &'static str {
        "ROW"
    }
}
