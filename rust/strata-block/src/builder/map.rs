//! Builder of map values.
//!
//! Keys and values are appended to two parallel builders. Closing an entry
//! validates its keys: a null or duplicate key fails the close with a
//! function-domain error and discards the entry, leaving the builder ready
//! for the next one.

use ahash::AHashMap;
use strata_common::{Error, Result};

use crate::block::array::nested_overhead;
use crate::block::{Block, MapBlock};
use crate::buffer::SharedBuffer;
use crate::builder::array::rebased_offsets;
use crate::builder::{BlockBuilder, calculate_block_reset_size};
use crate::nulls::NullsBuilder;
use crate::offsets::{self, Offsets, to_offset};
use crate::size::{SIZE_OF_OFFSET, instance_size};
use crate::types::Type;

#[derive(Debug)]
pub struct MapBlockBuilder {
    key_type: Type,
    offsets: Vec<u32>,
    keys: Box<BlockBuilder>,
    values: Box<BlockBuilder>,
    nulls: NullsBuilder,
    entry_open: bool,
}

impl MapBlockBuilder {
    pub fn new(key_type: Type, keys: BlockBuilder, values: BlockBuilder, expected_entries: usize) -> MapBlockBuilder {
        let mut offsets = Vec::with_capacity(expected_entries + 1);
        offsets.push(0);
        MapBlockBuilder {
            key_type,
            offsets,
            keys: Box::new(keys),
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
    pub fn key_type(&self) -> &Type {
        &self.key_type
    }

    #[inline]
    pub fn has_open_entry(&self) -> bool {
        self.entry_open
    }

    pub fn begin_entry(&mut self) -> Result<(&mut BlockBuilder, &mut BlockBuilder)> {
        if self.entry_open {
            return Err(Error::invalid_operation("begin_block_entry with an open entry"));
        }
        self.verify_children_committed()?;
        self.entry_open = true;
        Ok((&mut self.keys, &mut self.values))
    }

    pub fn close_entry(&mut self) -> Result<()> {
        if !self.entry_open {
            return Err(Error::invalid_operation("close_entry without an open entry"));
        }
        if self.keys.has_open_entry() || self.values.has_open_entry() {
            return Err(Error::invalid_operation("close_entry with an open key or value entry"));
        }
        let start = self.committed_entries();
        let count = self.keys.position_count() - start;
        if self.values.position_count() != self.keys.position_count() {
            let values = self.values.position_count() - start;
            self.discard_open_entry(start);
            return Err(Error::invalid_arg(
                "values",
                format!("{count} keys but {values} values in map entry"),
            ));
        }
        if let Err(e) = self.verify_keys(start, count) {
            self.discard_open_entry(start);
            return Err(e);
        }
        self.offsets.push(to_offset(self.keys.position_count())?);
        self.nulls.push(false);
        self.entry_open = false;
        Ok(())
    }

    /// Drops the keys and values of the open entry, which started at child
    /// position `start`.
    fn discard_open_entry(&mut self, start: usize) {
        self.keys.truncate(start);
        self.values.truncate(start);
        self.entry_open = false;
    }

    /// Rejects null and duplicate keys among the `count` keys of the open
    /// entry.
    fn verify_keys(&self, start: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let keys = self.keys.copy_region_unchecked(start, count);
        if (0..count).any(|i| keys.ops().is_null_unchecked(i)) {
            return Err(Error::invalid_function_argument("map key cannot be null"));
        }
        if count == 1 {
            return Ok(());
        }
        let mut seen: AHashMap<u64, Vec<usize>> = AHashMap::with_capacity(count);
        for i in 0..count {
            let candidates = seen.entry(self.key_type.hash(&keys, i)?).or_default();
            for &j in candidates.iter() {
                if self.key_type.equals(&keys, i, &keys, j)? {
                    let key = self.key_type.read_native_value(&keys, i)?;
                    return Err(Error::invalid_function_argument(format!(
                        "duplicate map key: {key:?}"
                    )));
                }
            }
            candidates.push(i);
        }
        Ok(())
    }

    pub fn append_null(&mut self) -> Result<()> {
        if self.entry_open {
            return Err(Error::invalid_operation("append_null with an open entry"));
        }
        self.verify_children_committed()?;
        self.offsets.push(self.offsets[self.offsets.len() - 1]);
        self.nulls.push(true);
        Ok(())
    }

    /// Copies a map out of a block. Its keys were validated when that block
    /// was built.
    pub(crate) fn append_from(&mut self, source: &MapBlock, position: usize) -> Result<()> {
        self.verify_children_committed()?;
        let range = source.offsets().range_at(position);
        let end = to_offset(self.keys.position_count() + range.len())?;
        self.keys.append_range(source.raw_keys(), range.start, range.len())?;
        self.values.append_range(source.raw_values(), range.start, range.len())?;
        self.offsets.push(end);
        self.nulls.push(false);
        Ok(())
    }

    #[inline]
    fn committed_entries(&self) -> usize {
        self.offsets[self.offsets.len() - 1] as usize
    }

    fn verify_children_committed(&self) -> Result<()> {
        let committed = self.committed_entries();
        if self.keys.position_count() != committed || self.values.position_count() != committed {
            return Err(Error::invalid_operation("keys or values appended outside of a map entry"));
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
        self.keys.region_size_in_bytes_unchecked(child_start, child_len)
            + self.values.region_size_in_bytes_unchecked(child_start, child_len)
            + nested_overhead(self.nulls.has_null(), len)
    }

    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let mut children = vec![false; self.committed_entries()];
        let child_count = offsets::mark_children(&self.offsets, selected, &mut children);
        self.keys.positions_size_in_bytes_unchecked(&children, child_count)
            + self.values.positions_size_in_bytes_unchecked(&children, child_count)
            + nested_overhead(self.nulls.has_null(), selected_count)
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.offsets.capacity() * SIZE_OF_OFFSET
            + self.nulls.retained_size_in_bytes()
            + self.keys.retained_size_in_bytes()
            + self.values.retained_size_in_bytes()
    }

    pub fn copy_region(&self, start: usize, len: usize) -> Block {
        let offsets = &self.offsets[start..start + len + 1];
        let child_start = offsets[0] as usize;
        let child_len = offsets[len] as usize - child_start;
        MapBlock::from_parts(
            rebased_offsets(offsets),
            self.keys.copy_region_unchecked(child_start, child_len),
            self.values.copy_region_unchecked(child_start, child_len),
            self.nulls.copy_region(start, len),
        )
        .into()
    }

    pub fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let (offsets, child_positions) = offsets::gather_children(&self.offsets, positions)?;
        Ok(MapBlock::from_parts(
            offsets,
            self.keys.copy_positions_unchecked(&child_positions)?,
            self.values.copy_positions_unchecked(&child_positions)?,
            self.nulls.copy_positions(positions),
        )
        .into())
    }

    pub(crate) fn verify_buildable(&self) -> Result<()> {
        self.verify_children_committed()?;
        self.keys.verify_buildable()?;
        self.values.verify_buildable()
    }

    pub fn build(&mut self) -> Result<Block> {
        self.verify_children_committed()?;
        let keys = self.keys.build()?;
        let values = self.values.build()?;
        let offsets = std::mem::replace(&mut self.offsets, vec![0]);
        Ok(MapBlock::from_parts(
            Offsets::from_buffer_unchecked(SharedBuffer::from_vec(offsets)),
            keys,
            values,
            self.nulls.take_mask(),
        )
        .into())
    }

    pub fn reset(&mut self) {
        self.offsets.truncate(1);
        self.keys.reset();
        self.values.reset();
        self.nulls.clear();
        self.entry_open = false;
    }

    pub fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
        self.nulls.reserve(additional);
    }

    pub fn new_like(&self) -> MapBlockBuilder {
        MapBlockBuilder::new(
            self.key_type.clone(),
            self.keys.new_block_builder_like(),
            self.values.new_block_builder_like(),
            calculate_block_reset_size(self.position_count()),
        )
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.offsets.truncate(len + 1);
        let committed = self.committed_entries();
        self.keys.truncate(committed);
        self.values.truncate(committed);
        self.nulls.truncate(len);
        self.entry_open = false;
    }
}

#[cfg(test)]
mod tests {
    use strata_common::ErrorCategory;

    use super::*;

    fn varchar_to_bigint() -> MapBlockBuilder {
        MapBlockBuilder::new(
            Type::Varchar,
            BlockBuilder::variable_width(4, 32),
            BlockBuilder::fixed_width(8, 4),
            2,
        )
    }

    fn put(keys: &mut BlockBuilder, values: &mut BlockBuilder, key: Option<&str>, value: Option<i64>) {
        match key {
            Some(k) => {
                keys.write_bytes(k.as_bytes()).unwrap();
                keys.close_entry().unwrap();
            }
            None => keys.append_null().unwrap(),
        }
        match value {
            Some(v) => values.write_long(v).unwrap(),
            None => values.append_null().unwrap(),
        }
    }

    #[test]
    fn test_null_key_rolls_back_entry() {
        let mut builder = varchar_to_bigint();
        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("k1"), Some(1));
        put(keys, values, Some("k2"), None);
        builder.close_entry().unwrap();

        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, None, Some(3));
        let err = builder.close_entry().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::User);
        assert!(!builder.has_open_entry());
        assert_eq!(builder.position_count(), 1);

        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("k3"), Some(4));
        builder.close_entry().unwrap();

        let block = builder.build().unwrap();
        assert_eq!(block.position_count(), 2);
        assert_eq!(block.get_map(0).unwrap().cardinality(), 2);
        let second = block.get_map(1).unwrap();
        assert_eq!(second.cardinality(), 1);
        assert_eq!(second.keys().get_slice(0).unwrap(), b"k3");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut builder = varchar_to_bigint();
        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("a"), Some(1));
        put(keys, values, Some("b"), Some(2));
        put(keys, values, Some("a"), Some(3));
        let err = builder.close_entry().unwrap_err();
        assert!(matches!(
            err.kind(),
            strata_common::ErrorKind::InvalidFunctionArgument { .. }
        ));
        assert_eq!(builder.position_count(), 0);
        builder.append_null().unwrap();
        assert!(builder.build().unwrap().is_null(0).unwrap());
    }

    #[test]
    fn test_mismatched_children_rejected() {
        let mut builder = varchar_to_bigint();
        let (keys, _) = builder.begin_entry().unwrap();
        keys.write_bytes(b"k").unwrap();
        keys.close_entry().unwrap();
        let err = builder.close_entry().unwrap_err();
        assert!(matches!(err.kind(), strata_common::ErrorKind::InvalidArgument { .. }));
        assert!(!builder.has_open_entry());
        assert_eq!(builder.position_count(), 0);
        assert_eq!(builder.keys.position_count(), 0);
        assert_eq!(builder.values.position_count(), 0);

        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("k"), Some(1));
        builder.close_entry().unwrap();
        let block = builder.build().unwrap();
        assert_eq!(block.position_count(), 1);
        assert_eq!(block.get_map(0).unwrap().cardinality(), 1);
    }

    #[test]
    fn test_region_size_matches_copy() {
        let mut builder = varchar_to_bigint();
        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("k1"), Some(1));
        put(keys, values, Some("k2"), None);
        builder.close_entry().unwrap();
        builder.append_null().unwrap();
        let (keys, values) = builder.begin_entry().unwrap();
        put(keys, values, Some("key3"), Some(3));
        builder.close_entry().unwrap();
        for start in 0..3 {
            for len in 0..=(3 - start) {
                assert_eq!(
                    builder.copy_region(start, len).size_in_bytes(),
                    builder.region_size_in_bytes(start, len)
                );
            }
        }
    }
}
