//! The immutable, positionally-indexed columnar container.
//!
//! A [`Block`] is a cheaply cloneable handle to one of a closed set of block
//! kinds ([`BlockKind`]). Every kind implements the same positional protocol:
//! null checks, zero-copy regions, compacting copies, position gathering and
//! the size accounting that memory governance relies on.
//!
//! The public methods of [`Block`] validate positions and ranges, then
//! dispatch to the kind. Kind implementations may assume valid arguments.

use std::cmp::Ordering;
use std::sync::Arc;

use bitflags::bitflags;
use strata_common::{Error, Result, verify_arg, verify_index, verify_range};

use crate::buffer::{PartId, SharedBuffer};
use crate::builder::BlockBuilder;
use crate::value::{SqlMap, SqlRow};

pub mod array;
pub mod dictionary;
pub mod fixed_width;
pub mod map;
pub mod rle;
pub mod row;
pub mod variable_width;

pub use array::ArrayBlock;
pub use dictionary::{DictionaryBlock, DictionaryId};
pub use fixed_width::FixedWidthBlock;
pub use map::MapBlock;
pub use rle::RunLengthBlock;
pub use row::RowBlock;
pub use variable_width::VariableWidthBlock;

bitflags! {
    /// Value accessors supported by a block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const BYTE = 1 << 0;
        const SHORT = 1 << 1;
        const INT = 1 << 2;
        const LONG = 1 << 3;
        const SLICE = 1 << 4;
        const ARRAY = 1 << 5;
        const MAP = 1 << 6;
        const ROW = 1 << 7;
    }
}

/// The closed set of block representations.
pub enum BlockKind {
    FixedWidth(FixedWidthBlock),
    VariableWidth(VariableWidthBlock),
    Array(ArrayBlock),
    Map(MapBlock),
    Row(RowBlock),
    Dictionary(DictionaryBlock),
    Rle(RunLengthBlock),
}

/// Operations every block kind implements.
///
/// Arguments are validated by [`Block`]; implementations index directly.
pub(crate) trait BlockOps {
    fn position_count(&self) -> usize;

    fn may_have_null(&self) -> bool;

    fn is_null_unchecked(&self, position: usize) -> bool;

    fn size_in_bytes(&self) -> usize;

    fn region_size_in_bytes(&self, start: usize, len: usize) -> usize;

    /// Size of the compact copy of the positions flagged in `selected`
    /// (`selected.len() == position_count`).
    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize;

    fn retained_size_in_bytes(&self) -> usize;

    /// Reports every retained allocation, including the instance itself.
    /// The reported sizes add up to `retained_size_in_bytes`.
    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize));

    fn estimated_data_size_for_stats(&self, position: usize) -> usize;

    fn is_compact(&self) -> bool;

    fn get_region(&self, start: usize, len: usize) -> Block;

    fn copy_region(&self, start: usize, len: usize) -> Block;

    /// Fails only when the gathered children no longer fit `u32` offsets.
    fn copy_positions(&self, positions: &[u32]) -> Result<Block>;

    fn single_value_block(&self, position: usize) -> Block;

    fn copy_with_appended_null(&self) -> Block;

    fn children(&self) -> Vec<Block>;

    fn encoding_name(&self) -> &'static str;
}

/// A cheaply cloneable handle to an immutable block.
#[derive(Clone)]
pub struct Block(Arc<BlockKind>);

impl Block {
    pub(crate) fn new(kind: BlockKind) -> Block {
        Block(Arc::new(kind))
    }

    #[inline]
    pub fn kind(&self) -> &BlockKind {
        &self.0
    }

    #[inline]
    pub(crate) fn ops(&self) -> &dyn BlockOps {
        match self.kind() {
            BlockKind::FixedWidth(b) => b,
            BlockKind::VariableWidth(b) => b,
            BlockKind::Array(b) => b,
            BlockKind::Map(b) => b,
            BlockKind::Row(b) => b,
            BlockKind::Dictionary(b) => b,
            BlockKind::Rle(b) => b,
        }
    }

    /// Short name of the block kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            BlockKind::FixedWidth(_) => "FixedWidthBlock",
            BlockKind::VariableWidth(_) => "VariableWidthBlock",
            BlockKind::Array(_) => "ArrayBlock",
            BlockKind::Map(_) => "MapBlock",
            BlockKind::Row(_) => "RowBlock",
            BlockKind::Dictionary(_) => "DictionaryBlock",
            BlockKind::Rle(_) => "RunLengthBlock",
        }
    }

    /// Returns `true` if both handles refer to the same block instance.
    #[inline]
    pub fn ptr_eq(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.ops().position_count()
    }

    /// `false` only when the block is known to contain no nulls.
    #[inline]
    pub fn may_have_null(&self) -> bool {
        self.ops().may_have_null()
    }

    pub fn is_null(&self, position: usize) -> Result<bool> {
        verify_index!(position, self.position_count());
        Ok(self.ops().is_null_unchecked(position))
    }

    /// Logical size of the addressed positions.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.ops().size_in_bytes()
    }

    /// Size that `copy_region(start, len)` would report.
    pub fn region_size_in_bytes(&self, start: usize, len: usize) -> Result<usize> {
        verify_range!("region", start, len, self.position_count());
        Ok(self.ops().region_size_in_bytes(start, len))
    }

    /// Size that `copy_positions` over the selected positions would report.
    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> Result<usize> {
        verify_arg!(selected, selected.len() == self.position_count());
        verify_arg!(selected_count, selected.iter().filter(|s| **s).count() == selected_count);
        Ok(self.ops().positions_size_in_bytes(selected, selected_count))
    }

    /// Memory reachable from this block, including spare capacity and shared
    /// storage.
    #[inline]
    pub fn retained_size_in_bytes(&self) -> usize {
        self.ops().retained_size_in_bytes()
    }

    /// Reports `(part, bytes)` for every retained allocation. Parts shared
    /// between blocks report the same id.
    pub fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        self.ops().for_each_retained_part(consumer)
    }

    pub fn estimated_data_size_for_stats(&self, position: usize) -> Result<usize> {
        verify_index!(position, self.position_count());
        Ok(self.ops().estimated_data_size_for_stats(position))
    }

    /// A block is compact when `copy_region(0, position_count)` returns it.
    #[inline]
    pub fn is_compact(&self) -> bool {
        self.ops().is_compact()
    }

    /// Sub-range `[start, start + len)`, possibly sharing storage with this
    /// block.
    pub fn get_region(&self, start: usize, len: usize) -> Result<Block> {
        verify_range!("region", start, len, self.position_count());
        Ok(self.region_unchecked(start, len))
    }

    /// Sub-range `[start, start + len)` in compact storage.
    pub fn copy_region(&self, start: usize, len: usize) -> Result<Block> {
        verify_range!("region", start, len, self.position_count());
        Ok(self.copy_region_unchecked(start, len))
    }

    /// Compact block of `positions[offset..offset + length]`, in order.
    pub fn copy_positions(&self, positions: &[u32], offset: usize, length: usize) -> Result<Block> {
        verify_range!("positions", offset, length, positions.len());
        let positions = &positions[offset..offset + length];
        self.verify_positions(positions)?;
        self.ops().copy_positions(positions)
    }

    /// View of `positions[offset..offset + length]` over this block.
    ///
    /// The positions buffer is shared with the result when the full range is
    /// requested, and copied otherwise.
    pub fn get_positions(&self, positions: &SharedBuffer<u32>, offset: usize, length: usize) -> Result<Block> {
        verify_range!("positions", offset, length, positions.len());
        let ids = if offset == 0 && length == positions.len() {
            positions.clone()
        } else {
            SharedBuffer::copy_from_slice(&positions[offset..offset + length])
        };
        self.verify_positions(&ids)?;
        Ok(DictionaryBlock::create_unchecked(ids, self.clone(), DictionaryId::random()))
    }

    /// One-position compact block holding the value at `position`.
    pub fn get_single_value_block(&self, position: usize) -> Result<Block> {
        verify_index!(position, self.position_count());
        Ok(self.ops().single_value_block(position))
    }

    /// This block with one more trailing null position.
    pub fn copy_with_appended_null(&self) -> Block {
        self.ops().copy_with_appended_null()
    }

    /// Directly nested blocks.
    pub fn children(&self) -> Vec<Block> {
        self.ops().children()
    }

    /// Name of the serialization encoding for this block.
    pub fn encoding_name(&self) -> &'static str {
        self.ops().encoding_name()
    }

    /// Accessors supported at every position, looking through dictionary and
    /// run-length wrappers.
    pub fn capabilities(&self) -> Capabilities {
        match self.kind() {
            BlockKind::FixedWidth(b) => b.capabilities(),
            BlockKind::VariableWidth(_) => Capabilities::SLICE,
            BlockKind::Array(_) => Capabilities::ARRAY,
            BlockKind::Map(_) => Capabilities::MAP,
            BlockKind::Row(_) => Capabilities::ROW,
            BlockKind::Dictionary(b) => b.dictionary().capabilities(),
            BlockKind::Rle(b) => b.value().capabilities(),
        }
    }

    /// Walks through dictionary and run-length layers to the flat block and
    /// position holding the value at `position`.
    pub fn resolve(&self, position: usize) -> Result<(&Block, usize)> {
        verify_index!(position, self.position_count());
        Ok(self.resolve_unchecked(position))
    }

    pub(crate) fn resolve_unchecked(&self, position: usize) -> (&Block, usize) {
        let mut block = self;
        let mut position = position;
        loop {
            match block.kind() {
                BlockKind::Dictionary(b) => {
                    position = b.id(position);
                    block = b.dictionary();
                }
                BlockKind::Rle(b) => {
                    position = 0;
                    block = b.value();
                }
                _ => return (block, position),
            }
        }
    }

    pub fn get_byte(&self, position: usize, offset: usize) -> Result<i8> {
        let bytes = self.value_bytes(position, offset, 1, "get_byte")?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn get_short(&self, position: usize, offset: usize) -> Result<i16> {
        let bytes = self.value_bytes(position, offset, 2, "get_short")?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn get_int(&self, position: usize, offset: usize) -> Result<i32> {
        let bytes = self.value_bytes(position, offset, 4, "get_int")?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn get_long(&self, position: usize, offset: usize) -> Result<i64> {
        let bytes = self.value_bytes(position, offset, 8, "get_long")?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Payload of a variable-width value.
    pub fn get_slice(&self, position: usize) -> Result<&[u8]> {
        let (block, position) = self.resolve(position)?;
        match block.kind() {
            BlockKind::VariableWidth(b) => Ok(b.slice(position)),
            _ => Err(Error::unsupported("get_slice", block.kind_name())),
        }
    }

    pub fn slice_length(&self, position: usize) -> Result<usize> {
        Ok(self.get_slice(position)?.len())
    }

    /// Compares `other` with the payload bytes `[offset, offset + other.len())`
    /// of the value at `position`.
    pub fn bytes_equal(&self, position: usize, offset: usize, other: &[u8]) -> Result<bool> {
        let slice = self.get_slice(position)?;
        verify_range!("value bytes", offset, other.len(), slice.len());
        Ok(&slice[offset..offset + other.len()] == other)
    }

    /// Lexicographically compares the payload bytes `[offset, offset + length)`
    /// of the value at `position` with `other`.
    pub fn bytes_compare(&self, position: usize, offset: usize, length: usize, other: &[u8]) -> Result<Ordering> {
        let slice = self.get_slice(position)?;
        verify_range!("value bytes", offset, length, slice.len());
        Ok(slice[offset..offset + length].cmp(other))
    }

    /// Appends payload bytes `[offset, offset + length)` of the value at
    /// `position` to `target` as one complete value.
    pub fn write_bytes_to(&self, position: usize, offset: usize, length: usize, target: &mut BlockBuilder) -> Result<()> {
        let slice = self.get_slice(position)?;
        verify_range!("value bytes", offset, length, slice.len());
        target.write_bytes(&slice[offset..offset + length])?;
        target.close_entry()
    }

    /// Elements of the array at `position`, as a region of the element block.
    pub fn get_array(&self, position: usize) -> Result<Block> {
        let (block, position) = self.resolve(position)?;
        match block.kind() {
            BlockKind::Array(b) => Ok(b.elements_at(position)),
            _ => Err(Error::unsupported("get_array", block.kind_name())),
        }
    }

    pub fn get_map(&self, position: usize) -> Result<SqlMap> {
        let (block, position) = self.resolve(position)?;
        match block.kind() {
            BlockKind::Map(b) => Ok(b.entries_at(position)),
            _ => Err(Error::unsupported("get_map", block.kind_name())),
        }
    }

    pub fn get_row(&self, position: usize) -> Result<SqlRow> {
        let (block, position) = self.resolve(position)?;
        match block.kind() {
            BlockKind::Row(b) => Ok(b.row_at(position)),
            _ => Err(Error::unsupported("get_row", block.kind_name())),
        }
    }

    pub fn as_dictionary(&self) -> Option<&DictionaryBlock> {
        match self.kind() {
            BlockKind::Dictionary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_rle(&self) -> Option<&RunLengthBlock> {
        match self.kind() {
            BlockKind::Rle(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn region_unchecked(&self, start: usize, len: usize) -> Block {
        if start == 0 && len == self.position_count() {
            return self.clone();
        }
        self.ops().get_region(start, len)
    }

    pub(crate) fn copy_region_unchecked(&self, start: usize, len: usize) -> Block {
        if start == 0 && len == self.position_count() && self.is_compact() {
            return self.clone();
        }
        self.ops().copy_region(start, len)
    }

    pub(crate) fn verify_positions(&self, positions: &[u32]) -> Result<()> {
        let count = self.position_count();
        match positions.iter().find(|&&p| p as usize >= count) {
            Some(&p) => Err(Error::position_out_of_bounds(p as usize, count)),
            None => Ok(()),
        }
    }

    fn value_bytes(&self, position: usize, offset: usize, len: usize, operation: &str) -> Result<&[u8]> {
        let (block, position) = self.resolve(position)?;
        match block.kind() {
            BlockKind::FixedWidth(b) => b.value_bytes(position, offset, len),
            _ => Err(Error::unsupported(operation, block.kind_name())),
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.kind_name())
            .field("position_count", &self.position_count())
            .field("size_in_bytes", &self.size_in_bytes())
            .finish()
    }
}

macro_rules! impl_from_block_kind {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Block {
            fn from(block: $ty) -> Block {
                Block::new(BlockKind::$variant(block))
            }
        }
    };
}

impl_from_block_kind!(FixedWidthBlock, FixedWidth);
impl_from_block_kind!(VariableWidthBlock, VariableWidth);
impl_from_block_kind!(ArrayBlock, Array);
impl_from_block_kind!(MapBlock, Map);
impl_from_block_kind!(RowBlock, Row);
impl_from_block_kind!(DictionaryBlock, Dictionary);
impl_from_block_kind!(RunLengthBlock, Rle);

/// Identity of a concrete block instance for retained-part reporting.
#[inline]
pub(crate) fn instance_part_id<T>(block: &T) -> PartId {
    block as *const T as usize
}

/// Child positions selected by a position mask over a nested block.
pub(crate) fn selected_positions(selected: &[bool]) -> Vec<u32> {
    selected
        .iter()
        .enumerate()
        .filter(|(_, s)| **s)
        .map(|(i, _)| i as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(values: &[Option<i64>]) -> Block {
        let mut builder = BlockBuilder::fixed_width(8, values.len());
        for v in values {
            match v {
                Some(v) => builder.write_long(*v).unwrap(),
                None => builder.append_null().unwrap(),
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_bounds_are_checked() {
        let block = longs(&[Some(1), Some(2)]);
        assert!(matches!(
            block.is_null(2).unwrap_err().kind(),
            strata_common::ErrorKind::PositionOutOfBounds { index: 2, bound: 2 }
        ));
        assert!(block.get_region(1, 2).is_err());
        assert!(block.copy_positions(&[0, 5], 0, 2).is_err());
        assert!(block.copy_positions(&[0, 5], 0, 1).is_ok());
        assert!(block.get_long(0, 1).is_err());
    }

    #[test]
    fn test_unsupported_accessor() {
        let block = longs(&[Some(1)]);
        let err = block.get_slice(0).unwrap_err();
        assert!(matches!(err.kind(), strata_common::ErrorKind::Unsupported { .. }));
        assert!(!block.capabilities().contains(Capabilities::SLICE));
        assert!(block.capabilities().contains(Capabilities::LONG));
    }

    #[test]
    fn test_get_positions_shares_buffer() {
        let block = longs(&[Some(10), Some(20), Some(30)]);
        let positions = SharedBuffer::copy_from_slice(&[2u32, 0, 2]);
        let view = block.get_positions(&positions, 0, 3).unwrap();
        let dictionary = view.as_dictionary().unwrap();
        assert!(dictionary.ids().ptr_eq(&positions));
        assert_eq!(view.get_long(0, 0).unwrap(), 30);
        assert_eq!(view.get_long(1, 0).unwrap(), 10);

        let partial = block.get_positions(&positions, 1, 2).unwrap();
        let ids = partial.as_dictionary().unwrap().ids();
        assert!(!ids.ptr_eq(&positions));
        assert_eq!(&**ids, &[0, 2]);

        assert!(block.get_positions(&SharedBuffer::copy_from_slice(&[3u32, 0]), 0, 2).is_err());
    }

    #[test]
    fn test_resolve_through_layers() {
        let flat = longs(&[Some(7), Some(8)]);
        let dictionary = DictionaryBlock::create(3, flat.clone(), SharedBuffer::copy_from_slice(&[1u32, 0, 1])).unwrap();
        let rle = RunLengthBlock::create(dictionary.get_single_value_block(0).unwrap(), 4).unwrap();
        let (block, position) = dictionary.resolve(2).unwrap();
        assert!(block.ptr_eq(&flat));
        assert_eq!(position, 1);
        assert_eq!(rle.get_long(3, 0).unwrap(), 8);
    }
}
