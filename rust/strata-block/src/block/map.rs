//! Maps over parallel key and value blocks.

use strata_common::{Error, Result, verify_arg};

use crate::block::array::{nested_overhead, verify_null_entries_empty};
use crate::block::{Block, BlockOps, instance_part_id};
use crate::buffer::{PartId, SharedBuffer};
use crate::nulls::{self, NullMask};
use crate::offsets::Offsets;
use crate::size::instance_size;
use crate::value::SqlMap;

/// Position `i` holds the entries `offsets[i]..offsets[i + 1]` of the key and
/// value blocks. Keys are never null; null maps have no entries.
pub struct MapBlock {
    offsets: Offsets,
    keys: Block,
    values: Block,
    nulls: NullMask,
}

impl MapBlock {
    /// Creates a map block of `position_count` maps over parallel `keys` and
    /// `values`.
    pub fn from_key_value_blocks(
        position_count: usize,
        nulls: Option<Vec<bool>>,
        offsets: impl Into<SharedBuffer<u32>>,
        keys: Block,
        values: Block,
    ) -> Result<Block> {
        verify_arg!(values, values.position_count() == keys.position_count());
        let offsets = Offsets::from_buffer(offsets.into(), keys.position_count())?;
        verify_arg!(offsets, offsets.item_count() == position_count);
        let nulls = nulls::mask_from_vec(nulls, position_count)?;
        verify_null_entries_empty(&offsets, &nulls)?;
        if keys.may_have_null() {
            let range = offsets.child_range(0, position_count);
            for p in range {
                if keys.ops().is_null_unchecked(p) {
                    return Err(Error::invalid_arg("keys", format!("null key at position {p}")));
                }
            }
        }
        Ok(MapBlock { offsets, keys, values, nulls }.into())
    }

    pub(crate) fn from_parts(offsets: Offsets, keys: Block, values: Block, nulls: NullMask) -> MapBlock {
        MapBlock { offsets, keys, values, nulls }
    }

    #[inline]
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    #[inline]
    pub fn raw_keys(&self) -> &Block {
        &self.keys
    }

    #[inline]
    pub fn raw_values(&self) -> &Block {
        &self.values
    }

    #[inline]
    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    pub(crate) fn entries_at(&self, position: usize) -> SqlMap {
        let range = self.offsets.range_at(position);
        SqlMap::new(
            self.keys.region_unchecked(range.start, range.len()),
            self.values.region_unchecked(range.start, range.len()),
        )
    }
}

impl BlockOps for MapBlock {
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
        self.keys.ops().region_size_in_bytes(range.start, range.len())
            + self.values.ops().region_size_in_bytes(range.start, range.len())
            + nested_overhead(self.nulls.is_some(), len)
    }

    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let mut child = vec![false; self.keys.position_count()];
        let child_count = self.offsets.mark_children(selected, &mut child);
        self.keys.ops().positions_size_in_bytes(&child, child_count)
            + self.values.ops().positions_size_in_bytes(&child, child_count)
            + nested_overhead(self.nulls.is_some(), selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.retained_size_in_bytes()
            + nulls::retained_size(&self.nulls)
            + self.keys.retained_size_in_bytes()
            + self.values.retained_size_in_bytes()
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        consumer(self.offsets.part_id(), self.offsets.retained_size_in_bytes());
        nulls::report_part(&self.nulls, consumer);
        self.keys.for_each_retained_part(consumer);
        self.values.for_each_retained_part(consumer);
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null_unchecked(position) {
            return 0;
        }
        self.offsets
            .range_at(position)
            .map(|p| {
                self.keys.ops().estimated_data_size_for_stats(p)
                    + self.values.ops().estimated_data_size_for_stats(p)
            })
            .sum()
    }

    fn is_compact(&self) -> bool {
        self.offsets.is_compact()
            && self.offsets.last() == self.keys.position_count()
            && self.keys.is_compact()
            && self.values.is_compact()
            && nulls::is_compact(&self.nulls)
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        MapBlock {
            offsets: self.offsets.region(start, len),
            keys: self.keys.clone(),
            values: self.values.clone(),
            nulls: nulls::region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        let range = self.offsets.child_range(start, len);
        MapBlock {
            offsets: self.offsets.compact_region(start, len),
            keys: self.keys.copy_region_unchecked(range.start, range.len()),
            values: self.values.copy_region_unchecked(range.start, range.len()),
            nulls: nulls::compact_region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let (offsets, child_positions) = self.offsets.gather(positions)?;
        Ok(MapBlock {
            offsets,
            keys: self.keys.ops().copy_positions(&child_positions)?,
            values: self.values.ops().copy_positions(&child_positions)?,
            nulls: nulls::copy_positions(&self.nulls, positions),
        }
        .into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        self.copy_region(position, 1)
    }

    fn copy_with_appended_null(&self) -> Block {
        MapBlock {
            offsets: self.offsets.with_appended_empty(),
            keys: self.keys.clone(),
            values: self.values.clone(),
            nulls: Some(nulls::with_appended_null(&self.nulls, self.position_count())),
        }
        .into()
    }

    fn children(&self) -> Vec<Block> {
        vec![self.keys.clone(), self.values.clone()]
    }

    fn encoding_name(&self) -> &'static str {
        "MAP"
    }
}
