//! Append-only construction of blocks.
//!
//! A [`BlockBuilder`] accumulates positions of one physical layout and is
//! frozen into a [`Block`] by [`BlockBuilder::build`]. Structural builders
//! (array, map, row) open an entry with [`BlockBuilder::begin_block_entry`],
//! receive the nested values through the returned [`EntryBuilder`] and commit
//! it with [`BlockBuilder::close_entry`].
//!
//! Builders are single-owner. `reset()` returns a builder to the empty state
//! while keeping its allocations, and `new_block_builder_like()` produces a
//! fresh builder sized after the current one.

use strata_common::{Error, Result, verify_arg, verify_index, verify_range};

use crate::block::dictionary;
use crate::block::{Block, BlockKind, DictionaryBlock, DictionaryId, RunLengthBlock};
use crate::buffer::SharedBuffer;
use crate::nulls::NullsBuilder;
use crate::types::Type;

pub mod array;
pub mod fixed_width;
pub mod map;
pub mod row;
pub mod variable_width;

pub use array::ArrayBlockBuilder;
pub use fixed_width::FixedWidthBlockBuilder;
pub use map::MapBlockBuilder;
pub use row::RowBlockBuilder;
pub use variable_width::VariableWidthBlockBuilder;

/// Expected entries of a builder created without a size hint.
pub const DEFAULT_EXPECTED_ENTRIES: usize = 8;

/// Bytes reserved per expected entry of a variable-width builder.
pub const EXPECTED_BYTES_PER_ENTRY: usize = 32;

/// Growth applied to the observed size when sizing a replacement builder.
const BLOCK_RESET_SKEW: f64 = 1.25;

const MAX_ARRAY_SIZE: usize = i32::MAX as usize - 8;

/// Expected size of a builder replacing one that held `current_size`
/// entries (or bytes).
pub fn calculate_block_reset_size(current_size: usize) -> usize {
    let size = (current_size as f64 * BLOCK_RESET_SKEW).ceil() as usize;
    size.clamp(1, MAX_ARRAY_SIZE)
}

/// The closed set of builder layouts.
#[derive(Debug)]
pub enum BlockBuilder {
    FixedWidth(FixedWidthBlockBuilder),
    VariableWidth(VariableWidthBlockBuilder),
    Array(ArrayBlockBuilder),
    Map(MapBlockBuilder),
    Row(RowBlockBuilder),
}

/// Access to the nested builders of an open structural entry.
pub enum EntryBuilder<'a> {
    Array(&'a mut BlockBuilder),
    Map {
        keys: &'a mut BlockBuilder,
        values: &'a mut BlockBuilder,
    },
    Row(&'a mut [BlockBuilder]),
}

impl BlockBuilder {
    /// # Panics
    ///
    /// Panics if `width` is not 1, 2, 4 or 8.
    pub fn fixed_width(width: usize, expected_entries: usize) -> BlockBuilder {
        BlockBuilder::FixedWidth(FixedWidthBlockBuilder::new(width, expected_entries))
    }

    pub fn variable_width(expected_entries: usize, expected_bytes: usize) -> BlockBuilder {
        BlockBuilder::VariableWidth(VariableWidthBlockBuilder::new(expected_entries, expected_bytes))
    }

    pub fn array(element: BlockBuilder, expected_entries: usize) -> BlockBuilder {
        BlockBuilder::Array(ArrayBlockBuilder::new(element, expected_entries))
    }

    /// Map builder whose keys are validated with the operators of `key_type`.
    pub fn map(key_type: Type, keys: BlockBuilder, values: BlockBuilder, expected_entries: usize) -> BlockBuilder {
        BlockBuilder::Map(MapBlockBuilder::new(key_type, keys, values, expected_entries))
    }

    pub fn row(fields: Vec<BlockBuilder>, expected_entries: usize) -> BlockBuilder {
        BlockBuilder::Row(RowBlockBuilder::new(fields, expected_entries))
    }

    pub(crate) fn for_type(ty: &Type, expected_entries: usize) -> BlockBuilder {
        use crate::types::StorageClass;

        match (ty, ty.storage_class()) {
            (Type::Array(element), _) => {
                BlockBuilder::array(BlockBuilder::for_type(element, expected_entries), expected_entries)
            }
            (Type::Map(key, value), _) => BlockBuilder::map(
                (**key).clone(),
                BlockBuilder::for_type(key, expected_entries),
                BlockBuilder::for_type(value, expected_entries),
                expected_entries,
            ),
            (Type::Row(fields), _) => BlockBuilder::row(
                fields
                    .iter()
                    .map(|f| BlockBuilder::for_type(f, expected_entries))
                    .collect(),
                expected_entries,
            ),
            (_, StorageClass::FixedWidth(width)) => BlockBuilder::fixed_width(width, expected_entries),
            _ => BlockBuilder::variable_width(expected_entries, expected_entries * EXPECTED_BYTES_PER_ENTRY),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BlockBuilder::FixedWidth(_) => "FixedWidthBlockBuilder",
            BlockBuilder::VariableWidth(_) => "VariableWidthBlockBuilder",
            BlockBuilder::Array(_) => "ArrayBlockBuilder",
            BlockBuilder::Map(_) => "MapBlockBuilder",
            BlockBuilder::Row(_) => "RowBlockBuilder",
        }
    }

    /// Number of committed entries. An open entry is not counted.
    pub fn position_count(&self) -> usize {
        match self {
            BlockBuilder::FixedWidth(b) => b.position_count(),
            BlockBuilder::VariableWidth(b) => b.position_count(),
            BlockBuilder::Array(b) => b.position_count(),
            BlockBuilder::Map(b) => b.position_count(),
            BlockBuilder::Row(b) => b.position_count(),
        }
    }

    pub fn has_open_entry(&self) -> bool {
        match self {
            BlockBuilder::FixedWidth(_) => false,
            BlockBuilder::VariableWidth(b) => b.has_open_entry(),
            BlockBuilder::Array(b) => b.has_open_entry(),
            BlockBuilder::Map(b) => b.has_open_entry(),
            BlockBuilder::Row(b) => b.has_open_entry(),
        }
    }

    /// Appends one value to a fixed-width builder, or the value's bytes to
    /// the open entry of a variable-width builder.
    pub fn write_byte(&mut self, value: i8) -> Result<()> {
        self.write_native(&value.to_ne_bytes(), "write_byte")
    }

    pub fn write_short(&mut self, value: i16) -> Result<()> {
        self.write_native(&value.to_ne_bytes(), "write_short")
    }

    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_native(&value.to_ne_bytes(), "write_int")
    }

    pub fn write_long(&mut self, value: i64) -> Result<()> {
        self.write_native(&value.to_ne_bytes(), "write_long")
    }

    fn write_native(&mut self, bytes: &[u8], operation: &str) -> Result<()> {
        match self {
            BlockBuilder::FixedWidth(b) => b.write_value(bytes),
            BlockBuilder::VariableWidth(b) => b.write_bytes(bytes),
            _ => Err(self.wrong_writer(operation)),
        }
    }

    /// Appends bytes to the open entry of a variable-width builder.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            BlockBuilder::VariableWidth(b) => b.write_bytes(bytes),
            _ => Err(self.wrong_writer("write_bytes")),
        }
    }

    /// Commits the open entry. Fixed-width values are committed as they are
    /// written, so this is a no-op for fixed-width builders.
    pub fn close_entry(&mut self) -> Result<()> {
        match self {
            BlockBuilder::FixedWidth(_) => Ok(()),
            BlockBuilder::VariableWidth(b) => b.close_entry(),
            BlockBuilder::Array(b) => b.close_entry(),
            BlockBuilder::Map(b) => b.close_entry(),
            BlockBuilder::Row(b) => b.close_entry(),
        }
    }

    pub fn append_null(&mut self) -> Result<()> {
        match self {
            BlockBuilder::FixedWidth(b) => {
                b.append_null();
                Ok(())
            }
            BlockBuilder::VariableWidth(b) => b.append_null(),
            BlockBuilder::Array(b) => b.append_null(),
            BlockBuilder::Map(b) => b.append_null(),
            BlockBuilder::Row(b) => b.append_null(),
        }
    }

    /// Opens an entry of a structural builder.
    pub fn begin_block_entry(&mut self) -> Result<EntryBuilder<'_>> {
        match self {
            BlockBuilder::Array(b) => Ok(EntryBuilder::Array(b.begin_entry()?)),
            BlockBuilder::Map(b) => {
                let (keys, values) = b.begin_entry()?;
                Ok(EntryBuilder::Map { keys, values })
            }
            BlockBuilder::Row(b) => Ok(EntryBuilder::Row(b.begin_entry()?)),
            _ => Err(self.wrong_writer("begin_block_entry")),
        }
    }

    /// Opens an entry, fills it with `f` and closes it.
    ///
    /// If `f` or the close fails, everything appended since the entry was
    /// opened is discarded and the builder accepts further entries.
    pub fn build_entry<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(EntryBuilder<'_>) -> Result<()>,
    {
        let position_count = self.position_count();
        let entry = self.begin_block_entry()?;
        let result = f(entry).and_then(|()| self.close_entry());
        if result.is_err() {
            self.truncate(position_count);
        }
        result
    }

    /// Freezes the committed entries into a block and leaves the builder
    /// empty.
    ///
    /// A builder holding more than one position, all of them null, produces
    /// a run-length block of a single null.
    pub fn build(&mut self) -> Result<Block> {
        self.verify_buildable()?;
        let position_count = self.position_count();
        let all_null = {
            let nulls = self.nulls();
            position_count > 1 && nulls.has_null() && !nulls.has_non_null()
        };
        let block = match self {
            BlockBuilder::FixedWidth(b) => b.build(),
            BlockBuilder::VariableWidth(b) => b.build(),
            BlockBuilder::Array(b) => b.build()?,
            BlockBuilder::Map(b) => b.build()?,
            BlockBuilder::Row(b) => b.build()?,
        };
        if all_null {
            let value = block.ops().single_value_block(0);
            return Ok(RunLengthBlock::create_unchecked(value, position_count));
        }
        Ok(block)
    }

    /// Fails exactly when `build` would, without modifying the builder.
    pub(crate) fn verify_buildable(&self) -> Result<()> {
        if self.has_open_entry() {
            return Err(Error::invalid_operation(format!(
                "build with an open entry on {}",
                self.kind_name()
            )));
        }
        match self {
            BlockBuilder::FixedWidth(_) | BlockBuilder::VariableWidth(_) => Ok(()),
            BlockBuilder::Array(b) => b.verify_buildable(),
            BlockBuilder::Map(b) => b.verify_buildable(),
            BlockBuilder::Row(b) => b.verify_buildable(),
        }
    }

    /// Empties the builder, keeping its allocations.
    pub fn reset(&mut self) {
        match self {
            BlockBuilder::FixedWidth(b) => b.reset(),
            BlockBuilder::VariableWidth(b) => b.reset(),
            BlockBuilder::Array(b) => b.reset(),
            BlockBuilder::Map(b) => b.reset(),
            BlockBuilder::Row(b) => b.reset(),
        }
    }

    /// Reserves room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        match self {
            BlockBuilder::FixedWidth(b) => b.reserve(additional),
            BlockBuilder::VariableWidth(b) => b.reserve(additional),
            BlockBuilder::Array(b) => b.reserve(additional),
            BlockBuilder::Map(b) => b.reserve(additional),
            BlockBuilder::Row(b) => b.reserve(additional),
        }
    }

    /// An empty builder of the same layout, sized after this one.
    pub fn new_block_builder_like(&self) -> BlockBuilder {
        match self {
            BlockBuilder::FixedWidth(b) => BlockBuilder::FixedWidth(b.new_like()),
            BlockBuilder::VariableWidth(b) => BlockBuilder::VariableWidth(b.new_like()),
            BlockBuilder::Array(b) => BlockBuilder::Array(b.new_like()),
            BlockBuilder::Map(b) => BlockBuilder::Map(b.new_like()),
            BlockBuilder::Row(b) => BlockBuilder::Row(b.new_like()),
        }
    }

    /// Keeps the first `len` committed entries and drops any open entry.
    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            BlockBuilder::FixedWidth(b) => b.truncate(len),
            BlockBuilder::VariableWidth(b) => b.truncate(len),
            BlockBuilder::Array(b) => b.truncate(len),
            BlockBuilder::Map(b) => b.truncate(len),
            BlockBuilder::Row(b) => b.truncate(len),
        }
    }

    pub(crate) fn nulls(&self) -> &NullsBuilder {
        match self {
            BlockBuilder::FixedWidth(b) => b.nulls(),
            BlockBuilder::VariableWidth(b) => b.nulls(),
            BlockBuilder::Array(b) => b.nulls(),
            BlockBuilder::Map(b) => b.nulls(),
            BlockBuilder::Row(b) => b.nulls(),
        }
    }

    pub fn is_null(&self, position: usize) -> Result<bool> {
        verify_index!(position, self.position_count());
        Ok(self.nulls().is_null(position))
    }

    /// Size of the block `build` would currently produce, ignoring spare
    /// capacity.
    pub fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes_unchecked(0, self.position_count())
    }

    pub fn region_size_in_bytes(&self, start: usize, len: usize) -> Result<usize> {
        verify_range!("region", start, len, self.position_count());
        Ok(self.region_size_in_bytes_unchecked(start, len))
    }

    pub(crate) fn region_size_in_bytes_unchecked(&self, start: usize, len: usize) -> usize {
        match self {
            BlockBuilder::FixedWidth(b) => b.region_size_in_bytes(start, len),
            BlockBuilder::VariableWidth(b) => b.region_size_in_bytes(start, len),
            BlockBuilder::Array(b) => b.region_size_in_bytes(start, len),
            BlockBuilder::Map(b) => b.region_size_in_bytes(start, len),
            BlockBuilder::Row(b) => b.region_size_in_bytes(start, len),
        }
    }

    /// Size that `copy_positions` over the selected entries would report.
    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> Result<usize> {
        verify_arg!(selected, selected.len() == self.position_count());
        verify_arg!(selected_count, selected.iter().filter(|s| **s).count() == selected_count);
        Ok(self.positions_size_in_bytes_unchecked(selected, selected_count))
    }

    /// `selected` may be shorter than the position count; missing flags are
    /// unselected.
    pub(crate) fn positions_size_in_bytes_unchecked(&self, selected: &[bool], selected_count: usize) -> usize {
        match self {
            BlockBuilder::FixedWidth(b) => b.positions_size_in_bytes(selected, selected_count),
            BlockBuilder::VariableWidth(b) => b.positions_size_in_bytes(selected, selected_count),
            BlockBuilder::Array(b) => b.positions_size_in_bytes(selected, selected_count),
            BlockBuilder::Map(b) => b.positions_size_in_bytes(selected, selected_count),
            BlockBuilder::Row(b) => b.positions_size_in_bytes(selected, selected_count),
        }
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        match self {
            BlockBuilder::FixedWidth(b) => b.retained_size_in_bytes(),
            BlockBuilder::VariableWidth(b) => b.retained_size_in_bytes(),
            BlockBuilder::Array(b) => b.retained_size_in_bytes(),
            BlockBuilder::Map(b) => b.retained_size_in_bytes(),
            BlockBuilder::Row(b) => b.retained_size_in_bytes(),
        }
    }

    /// Compact copy of the committed entries `[start, start + len)`.
    pub fn copy_region(&self, start: usize, len: usize) -> Result<Block> {
        verify_range!("region", start, len, self.position_count());
        Ok(self.copy_region_unchecked(start, len))
    }

    pub(crate) fn copy_region_unchecked(&self, start: usize, len: usize) -> Block {
        match self {
            BlockBuilder::FixedWidth(b) => b.copy_region(start, len),
            BlockBuilder::VariableWidth(b) => b.copy_region(start, len),
            BlockBuilder::Array(b) => b.copy_region(start, len),
            BlockBuilder::Map(b) => b.copy_region(start, len),
            BlockBuilder::Row(b) => b.copy_region(start, len),
        }
    }

    /// Compact block of the committed entries listed in
    /// `positions[offset..offset + length]`, in order.
    pub fn copy_positions(&self, positions: &[u32], offset: usize, length: usize) -> Result<Block> {
        verify_range!("positions", offset, length, positions.len());
        let positions = &positions[offset..offset + length];
        self.verify_positions(positions)?;
        self.copy_positions_unchecked(positions)
    }

    pub(crate) fn copy_positions_unchecked(&self, positions: &[u32]) -> Result<Block> {
        match self {
            BlockBuilder::FixedWidth(b) => Ok(b.copy_positions(positions)),
            BlockBuilder::VariableWidth(b) => b.copy_positions(positions),
            BlockBuilder::Array(b) => b.copy_positions(positions),
            BlockBuilder::Map(b) => b.copy_positions(positions),
            BlockBuilder::Row(b) => b.copy_positions(positions),
        }
    }

    /// Dictionary view of `positions[offset..offset + length]`.
    ///
    /// Only the referenced entries are copied into the dictionary. When every
    /// committed entry is referenced, the view shares the positions buffer
    /// the way [`Block::get_positions`] does.
    pub fn get_positions(&self, positions: &SharedBuffer<u32>, offset: usize, length: usize) -> Result<Block> {
        verify_range!("positions", offset, length, positions.len());
        let ids = &positions[offset..offset + length];
        self.verify_positions(ids)?;
        let mut used = vec![false; self.position_count()];
        let mut unique = 0;
        dictionary::mark_used(ids.iter().copied(), &mut used, &mut unique);
        if unique == self.position_count() {
            return self.snapshot().get_positions(positions, offset, length);
        }
        let (remap, kept) = dictionary::renumber(&used, unique);
        let entries = self.copy_positions_unchecked(&kept)?;
        Ok(DictionaryBlock::create_unchecked(
            dictionary::remap_ids(ids, &remap),
            entries,
            DictionaryId::random(),
        ))
    }

    pub fn get_single_value_block(&self, position: usize) -> Result<Block> {
        verify_index!(position, self.position_count());
        Ok(self.copy_region_unchecked(position, 1))
    }

    fn snapshot(&self) -> Block {
        self.copy_region_unchecked(0, self.position_count())
    }

    /// Appends the value at `position` of `block`, looking through
    /// dictionary and run-length layers.
    pub fn append_position(&mut self, block: &Block, position: usize) -> Result<()> {
        verify_index!(position, block.position_count());
        self.verify_no_open_entry("append_position")?;
        self.append_position_unchecked(block, position)
    }

    /// Appends positions `[start, start + len)` of `block`.
    pub fn append_range(&mut self, block: &Block, start: usize, len: usize) -> Result<()> {
        verify_range!("region", start, len, block.position_count());
        self.verify_no_open_entry("append_range")?;
        let appended = match (&mut *self, block.kind()) {
            (BlockBuilder::FixedWidth(b), BlockKind::FixedWidth(s)) => Some(b.append_range_from(s, start, len)),
            (BlockBuilder::VariableWidth(b), BlockKind::VariableWidth(s)) => {
                Some(b.append_range_from(s, start, len))
            }
            _ => None,
        };
        if let Some(result) = appended {
            return result;
        }
        (start..start + len).try_for_each(|p| self.append_position_unchecked(block, p))
    }

    /// Appends the listed positions of `block`, in order.
    pub fn append_positions(&mut self, block: &Block, positions: &[u32]) -> Result<()> {
        block.verify_positions(positions)?;
        self.verify_no_open_entry("append_positions")?;
        positions
            .iter()
            .try_for_each(|&p| self.append_position_unchecked(block, p as usize))
    }

    /// Appends the value at `position` of `block` `count` times.
    pub fn append_repeated(&mut self, block: &Block, position: usize, count: usize) -> Result<()> {
        verify_index!(position, block.position_count());
        self.verify_no_open_entry("append_repeated")?;
        let (source, position) = block.resolve_unchecked(position);
        let is_null = source.ops().is_null_unchecked(position);
        match (&mut *self, source.kind()) {
            (BlockBuilder::FixedWidth(b), _) if is_null => {
                b.append_nulls(count);
                return Ok(());
            }
            (BlockBuilder::VariableWidth(b), _) if is_null => {
                b.append_nulls(count);
                return Ok(());
            }
            (BlockBuilder::FixedWidth(b), BlockKind::FixedWidth(s)) => {
                return b.append_repeated_from(s, position, count);
            }
            _ => {}
        }
        for _ in 0..count {
            self.append_position_unchecked(source, position)?;
        }
        Ok(())
    }

    fn append_position_unchecked(&mut self, block: &Block, position: usize) -> Result<()> {
        let (source, position) = block.resolve_unchecked(position);
        if source.ops().is_null_unchecked(position) {
            return self.append_null();
        }
        match (self, source.kind()) {
            (BlockBuilder::FixedWidth(b), BlockKind::FixedWidth(s)) => b.append_from(s, position),
            (BlockBuilder::VariableWidth(b), BlockKind::VariableWidth(s)) => b.append_value(s.slice(position)),
            (BlockBuilder::Array(b), BlockKind::Array(s)) => b.append_from(s, position),
            (BlockBuilder::Map(b), BlockKind::Map(s)) => b.append_from(s, position),
            (BlockBuilder::Row(b), BlockKind::Row(s)) => b.append_from(s, position),
            (builder, _) => Err(Error::invalid_arg(
                "block",
                format!("{} appended to {}", source.kind_name(), builder.kind_name()),
            )),
        }
    }

    fn verify_positions(&self, positions: &[u32]) -> Result<()> {
        let count = self.position_count();
        match positions.iter().find(|&&p| p as usize >= count) {
            Some(&p) => Err(Error::position_out_of_bounds(p as usize, count)),
            None => Ok(()),
        }
    }

    fn verify_no_open_entry(&self, operation: &str) -> Result<()> {
        if self.has_open_entry() {
            return Err(Error::invalid_operation(format!(
                "{operation} with an open entry on {}",
                self.kind_name()
            )));
        }
        Ok(())
    }

    fn wrong_writer(&self, operation: &str) -> Error {
        Error::invalid_operation(format!("{operation} on {}", self.kind_name()))
    }
}

#[cfg(test)]
mod tests {
    use strata_common::ErrorKind;

    use super::*;
    use crate::block::{DictionaryBlock, VariableWidthBlock};

    fn strings(values: &[Option<&str>]) -> Block {
        VariableWidthBlock::from_slices(values.iter().map(|v| v.map(str::as_bytes))).unwrap().into()
    }

    #[test]
    fn test_reset_size() {
        assert_eq!(calculate_block_reset_size(0), 1);
        assert_eq!(calculate_block_reset_size(4), 5);
        assert_eq!(calculate_block_reset_size(5), 7);
        assert_eq!(calculate_block_reset_size(usize::MAX / 2), MAX_ARRAY_SIZE);
    }

    #[test]
    fn test_wrong_writer() {
        let mut builder = BlockBuilder::fixed_width(8, 1);
        let err = builder.write_bytes(b"x").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
        assert!(builder.begin_block_entry().is_err());
        assert!(builder.write_int(1).is_err());
        builder.close_entry().unwrap();
    }

    #[test]
    fn test_native_writes_into_variable_width_entry() {
        let mut builder = BlockBuilder::variable_width(2, 16);
        builder.write_int(1).unwrap();
        builder.write_byte(2).unwrap();
        assert!(builder.build().is_err());
        builder.close_entry().unwrap();
        let block = builder.build().unwrap();
        let mut expected = 1i32.to_ne_bytes().to_vec();
        expected.push(2);
        assert_eq!(block.get_slice(0).unwrap(), &expected[..]);
    }

    #[test]
    fn test_all_null_collapses_to_run_length() {
        let mut builder = BlockBuilder::variable_width(4, 16);
        for _ in 0..3 {
            builder.append_null().unwrap();
        }
        let block = builder.build().unwrap();
        assert!(block.as_rle().is_some());
        assert_eq!(block.position_count(), 3);
        assert!((0..3).all(|p| block.is_null(p).unwrap()));

        builder.append_null().unwrap();
        let single = builder.build().unwrap();
        assert!(single.as_rle().is_none());
        assert!(single.is_null(0).unwrap());
    }

    #[test]
    fn test_build_entry_rolls_back() {
        let mut builder = BlockBuilder::array(BlockBuilder::fixed_width(8, 4), 2);
        builder
            .build_entry(|entry| {
                let EntryBuilder::Array(elements) = entry else {
                    unreachable!()
                };
                elements.write_long(1)
            })
            .unwrap();
        let err = builder
            .build_entry(|entry| {
                let EntryBuilder::Array(elements) = entry else {
                    unreachable!()
                };
                elements.write_long(2)?;
                Err(Error::invalid_function_argument("rejected"))
            })
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFunctionArgument { .. }));
        assert_eq!(builder.position_count(), 1);
        assert!(!builder.has_open_entry());

        let block = builder.build().unwrap();
        assert_eq!(block.position_count(), 1);
        assert_eq!(block.get_array(0).unwrap().position_count(), 1);
    }

    #[test]
    fn test_append_through_dictionary() {
        let dictionary = strings(&[Some("a"), None, Some("ccc")]);
        let block = DictionaryBlock::create(4, dictionary, vec![2u32, 1, 0, 2]).unwrap();
        let mut builder = BlockBuilder::variable_width(4, 16);
        builder.append_range(&block, 0, 4).unwrap();
        builder.append_positions(&block, &[3, 2]).unwrap();
        builder.append_repeated(&block, 1, 2).unwrap();
        let built = builder.build().unwrap();
        assert_eq!(built.position_count(), 8);
        assert_eq!(built.get_slice(0).unwrap(), b"ccc");
        assert!(built.is_null(1).unwrap());
        assert_eq!(built.get_slice(5).unwrap(), b"a");
        assert!(built.is_null(6).unwrap() && built.is_null(7).unwrap());
    }

    #[test]
    fn test_append_kind_mismatch() {
        let mut builder = BlockBuilder::fixed_width(8, 1);
        let err = builder.append_position(&strings(&[Some("x")]), 0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
        let err = builder.append_position(&strings(&[Some("x")]), 1).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PositionOutOfBounds { .. }));
    }

    #[test]
    fn test_reads_match_built_block() {
        let mut builder = BlockBuilder::fixed_width(4, 8);
        for v in [5, 6, 7] {
            builder.write_int(v).unwrap();
        }
        builder.append_null().unwrap();
        assert!(builder.is_null(3).unwrap());
        assert!(builder.is_null(4).is_err());

        let positions = SharedBuffer::copy_from_slice(&[3u32, 0]);
        let view = builder.get_positions(&positions, 0, 2).unwrap();
        assert!(view.is_null(0).unwrap());
        assert_eq!(view.get_int(1, 0).unwrap(), 5);

        let copy = builder.copy_positions(&[2, 1], 0, 2).unwrap();
        assert_eq!(copy.get_int(0, 0).unwrap(), 7);
        let selected = [false, true, true, false];
        assert_eq!(builder.positions_size_in_bytes(&selected, 2).unwrap(), copy.size_in_bytes());
        assert_eq!(builder.get_single_value_block(1).unwrap().get_int(0, 0).unwrap(), 6);

        let size = builder.size_in_bytes();
        let block = builder.build().unwrap();
        assert_eq!(block.size_in_bytes(), size);
    }

    #[test]
    fn test_nested_selection_matches_copy() {
        let mut builder = BlockBuilder::array(BlockBuilder::variable_width(8, 32), 4);
        let entries: [&[&str]; 3] = [&["a", "bb"], &[], &["ccc"]];
        for entry in entries {
            builder
                .build_entry(|e| {
                    let EntryBuilder::Array(elements) = e else {
                        unreachable!()
                    };
                    for v in entry {
                        elements.write_bytes(v.as_bytes())?;
                        elements.close_entry()?;
                    }
                    Ok(())
                })
                .unwrap();
        }
        builder.append_null().unwrap();

        let copy = builder.copy_positions(&[0, 2, 3], 0, 3).unwrap();
        assert_eq!(copy.position_count(), 3);
        assert_eq!(copy.get_array(1).unwrap().get_slice(0).unwrap(), b"ccc");
        assert!(copy.is_null(2).unwrap());
        let selected = [true, false, true, true];
        assert_eq!(builder.positions_size_in_bytes(&selected, 3).unwrap(), copy.size_in_bytes());
        assert!(builder.positions_size_in_bytes(&selected, 2).is_err());
        assert!(builder.positions_size_in_bytes(&selected[..3], 2).is_err());
        assert!(builder.copy_positions(&[4], 0, 1).is_err());

        let positions = SharedBuffer::copy_from_slice(&[2u32, 2]);
        let view = builder.get_positions(&positions, 0, 2).unwrap();
        assert_eq!(view.position_count(), 2);
        assert_eq!(view.as_dictionary().unwrap().dictionary().position_count(), 1);
        assert_eq!(view.get_array(1).unwrap().get_slice(0).unwrap(), b"ccc");
        assert_eq!(builder.position_count(), 4);
    }

    #[test]
    fn test_new_block_builder_like_is_empty() {
        let mut builder = BlockBuilder::row(
            vec![BlockBuilder::fixed_width(8, 2), BlockBuilder::variable_width(2, 8)],
            2,
        );
        builder.append_null().unwrap();
        let fresh = builder.new_block_builder_like();
        assert_eq!(fresh.position_count(), 0);
        assert_eq!(fresh.kind_name(), "RowBlockBuilder");
        builder.reset();
        assert_eq!(builder.position_count(), 0);
    }
}
