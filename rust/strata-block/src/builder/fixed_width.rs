//! Builder of fixed-width values.

use strata_common::{Error, Result};

use crate::block::{Block, FixedWidthBlock};
use crate::buffer::{SharedBuffer, exact_vec};
use crate::builder::calculate_block_reset_size;
use crate::nulls::NullsBuilder;
use crate::size::{instance_size, null_mask_size};

/// Appends values of a single width (1, 2, 4 or 8 bytes), one per call.
#[derive(Debug)]
pub struct FixedWidthBlockBuilder {
    width: usize,
    values: Vec<u8>,
    nulls: NullsBuilder,
}

impl FixedWidthBlockBuilder {
    /// # Panics
    ///
    /// Panics if `width` is not 1, 2, 4 or 8.
    pub fn new(width: usize, expected_entries: usize) -> FixedWidthBlockBuilder {
        assert!(matches!(width, 1 | 2 | 4 | 8), "unsupported value width {width}");
        FixedWidthBlockBuilder {
            width,
            values: Vec::with_capacity(expected_entries * width),
            nulls: NullsBuilder::with_capacity(expected_entries),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.nulls.len()
    }

    /// Appends one value given as its native-order bytes.
    pub fn write_value(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.width {
            return Err(Error::invalid_operation(format!(
                "write of a {}-byte value to a {}-byte builder",
                bytes.len(),
                self.width
            )));
        }
        self.values.extend_from_slice(bytes);
        self.nulls.push(false);
        Ok(())
    }

    pub fn append_null(&mut self) {
        self.values.resize(self.values.len() + self.width, 0);
        self.nulls.push(true);
    }

    pub(crate) fn append_from(&mut self, source: &FixedWidthBlock, position: usize) -> Result<()> {
        self.verify_width(source)?;
        self.values.extend_from_slice(source.value_at(position));
        self.nulls.push(false);
        Ok(())
    }

    /// Appends positions `[start, start + len)` of a flat block.
    pub(crate) fn append_range_from(&mut self, source: &FixedWidthBlock, start: usize, len: usize) -> Result<()> {
        self.verify_width(source)?;
        self.values
            .extend_from_slice(&source.values()[start * self.width..(start + len) * self.width]);
        match source.nulls() {
            Some(flags) => flags[start..start + len].iter().for_each(|&f| self.nulls.push(f)),
            None => self.nulls.push_n(false, len),
        }
        Ok(())
    }

    pub(crate) fn append_repeated_from(&mut self, source: &FixedWidthBlock, position: usize, count: usize) -> Result<()> {
        self.verify_width(source)?;
        let value = source.value_at(position);
        self.values.reserve(count * self.width);
        for _ in 0..count {
            self.values.extend_from_slice(value);
        }
        self.nulls.push_n(false, count);
        Ok(())
    }

    pub(crate) fn append_nulls(&mut self, count: usize) {
        self.values.resize(self.values.len() + count * self.width, 0);
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

    pub fn region_size_in_bytes(&self, _start: usize, len: usize) -> usize {
        len * self.width + null_mask_size(self.nulls.has_null(), len)
    }

    pub fn positions_size_in_bytes(&self, _selected: &[bool], selected_count: usize) -> usize {
        selected_count * self.width + null_mask_size(self.nulls.has_null(), selected_count)
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>() + self.values.capacity() + self.nulls.retained_size_in_bytes()
    }

    pub fn copy_region(&self, start: usize, len: usize) -> Block {
        let values = &self.values[start * self.width..(start + len) * self.width];
        FixedWidthBlock::from_parts(
            self.width,
            SharedBuffer::from_vec(exact_vec(values.iter().copied(), values.len())),
            self.nulls.copy_region(start, len),
        )
        .into()
    }

    pub fn copy_positions(&self, positions: &[u32]) -> Block {
        let width = self.width;
        let values = exact_vec(
            positions
                .iter()
                .flat_map(|&p| self.values[p as usize * width..(p as usize + 1) * width].iter().copied()),
            positions.len() * width,
        );
        FixedWidthBlock::from_parts(width, SharedBuffer::from_vec(values), self.nulls.copy_positions(positions)).into()
    }

    /// Moves the accumulated values into a block, leaving the builder empty.
    pub fn build(&mut self) -> Block {
        let values = std::mem::take(&mut self.values);
        let nulls = self.nulls.take_mask();
        FixedWidthBlock::from_parts(self.width, SharedBuffer::from_vec(values), nulls).into()
    }

    /// Empties the builder, keeping its allocations.
    pub fn reset(&mut self) {
        self.values.clear();
        self.nulls.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional * self.width);
        self.nulls.reserve(additional);
    }

    pub fn new_like(&self) -> FixedWidthBlockBuilder {
        FixedWidthBlockBuilder::new(self.width, calculate_block_reset_size(self.position_count()))
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len * self.width);
        self.nulls.truncate(len);
    }

    fn verify_width(&self, source: &FixedWidthBlock) -> Result<()> {
        if source.width() != self.width {
            return Err(Error::invalid_arg(
                "block",
                format!("{}-byte values appended to a {}-byte builder", source.width(), self.width),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_width_rejected() {
        let mut builder = FixedWidthBlockBuilder::new(4, 2);
        assert!(builder.write_value(&7i64.to_ne_bytes()).is_err());
        assert!(builder.write_value(&7i32.to_ne_bytes()).is_ok());
        assert_eq!(builder.position_count(), 1);
    }

    #[test]
    fn test_build_keeps_slack() {
        let mut builder = FixedWidthBlockBuilder::new(8, 16);
        builder.write_value(&1i64.to_ne_bytes()).unwrap();
        builder.append_null();
        assert_eq!(builder.size_in_bytes(), 2 * 8 + 2);
        let block = builder.build();
        assert_eq!(block.position_count(), 2);
        assert!(block.is_null(1).unwrap());
        assert!(!block.is_compact());
        assert!(block.retained_size_in_bytes() >= 16 * 8);
        assert_eq!(builder.position_count(), 0);
    }

    #[test]
    fn test_copy_region_is_compact() {
        let mut builder = FixedWidthBlockBuilder::new(2, 8);
        for v in [1i16, 2, 3] {
            builder.write_value(&v.to_ne_bytes()).unwrap();
        }
        let copy = builder.copy_region(1, 2);
        assert!(copy.is_compact());
        assert_eq!(copy.get_short(0, 0).unwrap(), 2);
        assert!(!copy.may_have_null());
        assert_eq!(copy.size_in_bytes(), builder.region_size_in_bytes(1, 2));
    }

    #[test]
    fn test_truncate() {
        let mut builder = FixedWidthBlockBuilder::new(1, 4);
        builder.write_value(&[1]).unwrap();
        builder.append_null();
        builder.truncate(1);
        assert_eq!(builder.position_count(), 1);
        assert!(!builder.nulls().has_null());
    }
}
