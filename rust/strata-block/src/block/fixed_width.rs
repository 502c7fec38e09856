//! Dense fixed-width values.

use strata_common::{Error, Result, verify_arg, verify_range};

use crate::block::{Block, BlockOps, Capabilities, instance_part_id};
use crate::buffer::{PartId, SharedBuffer, exact_vec};
use crate::nulls::{self, NullMask};
use crate::size::{instance_size, null_mask_size};

/// Values of 1, 2, 4 or 8 bytes packed at `position * width`, in native byte
/// order. Null positions hold zero placeholders.
pub struct FixedWidthBlock {
    width: usize,
    values: SharedBuffer<u8>,
    nulls: NullMask,
}

impl FixedWidthBlock {
    /// Creates a block over `values`, which must hold a whole number of
    /// `width`-byte values.
    pub fn new(width: usize, values: impl Into<SharedBuffer<u8>>, nulls: Option<Vec<bool>>) -> Result<FixedWidthBlock> {
        let values = values.into();
        verify_arg!(width, matches!(width, 1 | 2 | 4 | 8));
        verify_arg!(values, values.len() % width == 0);
        let nulls = nulls::mask_from_vec(nulls, values.len() / width)?;
        Ok(FixedWidthBlock { width, values, nulls })
    }

    /// Builds a block of 8-byte values.
    pub fn from_longs(values: &[i64], nulls: Option<Vec<bool>>) -> Result<FixedWidthBlock> {
        let bytes = bytemuck::cast_slice::<i64, u8>(values);
        FixedWidthBlock::new(8, SharedBuffer::copy_from_slice(bytes), nulls)
    }

    pub(crate) fn from_parts(width: usize, values: SharedBuffer<u8>, nulls: NullMask) -> FixedWidthBlock {
        debug_assert_eq!(values.len() % width, 0);
        FixedWidthBlock { width, values, nulls }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Bytes of the addressed values.
    #[inline]
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    #[inline]
    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    pub fn capabilities(&self) -> Capabilities {
        match self.width {
            1 => Capabilities::BYTE,
            2 => Capabilities::BYTE | Capabilities::SHORT,
            4 => Capabilities::BYTE | Capabilities::SHORT | Capabilities::INT,
            _ => Capabilities::BYTE | Capabilities::SHORT | Capabilities::INT | Capabilities::LONG,
        }
    }

    /// Bytes of the value at `position`.
    #[inline]
    pub(crate) fn value_at(&self, position: usize) -> &[u8] {
        &self.values[position * self.width..(position + 1) * self.width]
    }

    /// `len` bytes starting `offset` bytes into the value at `position`.
    pub(crate) fn value_bytes(&self, position: usize, offset: usize, len: usize) -> Result<&[u8]> {
        if len > self.width {
            return Err(Error::unsupported(format!("{len}-byte read"), format!("{}-byte values", self.width)));
        }
        verify_range!("value bytes", offset, len, self.width);
        let start = position * self.width + offset;
        Ok(&self.values[start..start + len])
    }

    fn bytes_range(&self, start: usize, len: usize) -> std::ops::Range<usize> {
        start * self.width..(start + len) * self.width
    }
}

impl BlockOps for FixedWidthBlock {
    #[inline]
    fn position_count(&self) -> usize {
        self.values.len() / self.width
    }

    #[inline]
    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    #[inline]
    fn is_null_unchecked(&self, position: usize) -> bool {
        nulls::is_null(&self.nulls, position)
    }

    fn size_in_bytes(&self) -> usize {
        self.region_size_in_bytes(0, self.position_count())
    }

    fn region_size_in_bytes(&self, _start: usize, len: usize) -> usize {
        len * self.width + null_mask_size(self.nulls.is_some(), len)
    }

    fn positions_size_in_bytes(&self, _selected: &[bool], selected_count: usize) -> usize {
        self.region_size_in_bytes(0, selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>() + self.values.retained_size_in_bytes() + nulls::retained_size(&self.nulls)
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        consumer(self.values.part_id(), self.values.retained_size_in_bytes());
        nulls::report_part(&self.nulls, consumer);
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null_unchecked(position) { 0 } else { self.width }
    }

    fn is_compact(&self) -> bool {
        self.values.is_compact() && nulls::is_compact(&self.nulls)
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        FixedWidthBlock {
            width: self.width,
            values: self.values.slice(self.bytes_range(start, len)),
            nulls: nulls::region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        FixedWidthBlock {
            width: self.width,
            values: self.values.compact_range(self.bytes_range(start, len)),
            nulls: nulls::compact_region(&self.nulls, start, len),
        }
        .into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let values = exact_vec(
            positions.iter().flat_map(|&p| self.value_at(p as usize).iter().copied()),
            positions.len() * self.width,
        );
        Ok(FixedWidthBlock {
            width: self.width,
            values: SharedBuffer::from_vec(values),
            nulls: nulls::copy_positions(&self.nulls, positions),
        }
        .into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        FixedWidthBlock {
            width: self.width,
            values: SharedBuffer::copy_from_slice(self.value_at(position)),
            nulls: nulls::single(self.is_null_unchecked(position)),
        }
        .into()
    }

    fn copy_with_appended_null(&self) -> Block {
        let count = self.position_count();
        let mut values = Vec::with_capacity(self.values.len() + self.width);
        values.extend_from_slice(&self.values);
        values.resize(self.values.len() + self.width, 0);
        FixedWidthBlock {
            width: self.width,
            values: SharedBuffer::from_vec(values),
            nulls: Some(nulls::with_appended_null(&self.nulls, count)),
        }
        .into()
    }

    fn children(&self) -> Vec<Block> {
        Vec::new()
    }

    fn encoding_name(&self) -> &'static str {
        match self.width {
            1 => "BYTE_ARRAY",
            2 => "SHORT_ARRAY",
            4 => "INT_ARRAY",
            _ => "LONG_ARRAY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(values: &[i64], nulls: Option<Vec<bool>>) -> Block {
        FixedWidthBlock::from_longs(values, nulls).unwrap().into()
    }

    #[test]
    fn test_construction_validation() {
        assert!(FixedWidthBlock::new(3, vec![0u8; 6], None).is_err());
        assert!(FixedWidthBlock::new(4, vec![0u8; 6], None).is_err());
        assert!(FixedWidthBlock::new(2, vec![0u8; 6], Some(vec![false; 2])).is_err());
        assert!(FixedWidthBlock::new(2, vec![0u8; 6], Some(vec![false; 3])).is_ok());
    }

    #[test]
    fn test_unaligned_reads() {
        let block = block(&[0x0102_0304_0506_0708, -1], None);
        let expected = 0x0102_0304_0506_0708i64.to_ne_bytes();
        assert_eq!(block.get_byte(0, 3).unwrap(), expected[3] as i8);
        assert_eq!(
            block.get_int(0, 1).unwrap(),
            i32::from_ne_bytes(expected[1..5].try_into().unwrap())
        );
        assert_eq!(block.get_short(1, 6).unwrap(), -1);
        assert!(block.get_int(0, 5).is_err());
    }

    #[test]
    fn test_sizes() {
        let block = block(&[1, 2, 3, 4], Some(vec![false, true, false, false]));
        assert_eq!(block.size_in_bytes(), 4 * 8 + 4);
        assert_eq!(block.region_size_in_bytes(1, 2).unwrap(), 2 * 8 + 2);
        assert_eq!(block.copy_region(1, 2).unwrap().size_in_bytes(), 2 * 8 + 2);

        let no_nulls = self::block(&[1, 2], None);
        assert_eq!(no_nulls.size_in_bytes(), 16);
    }

    #[test]
    fn test_region_is_view_copy_is_compact() {
        let block = block(&[1, 2, 3, 4], None);
        assert!(block.is_compact());
        assert!(block.copy_region(0, 4).unwrap().ptr_eq(&block));

        let region = block.get_region(1, 2).unwrap();
        assert!(!region.is_compact());
        assert_eq!(region.get_long(0, 0).unwrap(), 2);
        assert_eq!(region.retained_size_in_bytes(), block.retained_size_in_bytes());

        let copy = region.copy_region(0, 2).unwrap();
        assert!(copy.is_compact());
        assert!(copy.copy_region(0, 2).unwrap().ptr_eq(&copy));
    }

    #[test]
    fn test_appended_null() {
        let block = block(&[5, 6], None);
        let extended = block.copy_with_appended_null();
        assert_eq!(extended.position_count(), 3);
        assert!(extended.is_null(2).unwrap());
        assert!(!extended.is_null(1).unwrap());
        assert_eq!(extended.get_long(1, 0).unwrap(), 6);
    }

    #[test]
    fn test_retained_parts_sum() {
        let block = block(&[1, 2, 3], Some(vec![true, false, false]));
        let mut total = 0;
        block.for_each_retained_part(&mut |_, bytes| total += bytes);
        assert_eq!(total, block.retained_size_in_bytes());
    }
}
