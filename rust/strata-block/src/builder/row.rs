//! Builder of row values.

use strata_common::{Error, Result};

use crate::block::{Block, RowBlock};
use crate::builder::{BlockBuilder, calculate_block_reset_size};
use crate::nulls::NullsBuilder;
use crate::size::{instance_size, null_mask_size};

/// One builder per field; every entry appends exactly one position to each.
#[derive(Debug)]
pub struct RowBlockBuilder {
    fields: Vec<BlockBuilder>,
    nulls: NullsBuilder,
    entry_open: bool,
}

impl RowBlockBuilder {
    pub fn new(fields: Vec<BlockBuilder>, expected_entries: usize) -> RowBlockBuilder {
        RowBlockBuilder {
            fields,
            nulls: NullsBuilder::with_capacity(expected_entries),
            entry_open: false,
        }
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.nulls.len()
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn has_open_entry(&self) -> bool {
        self.entry_open
    }

    pub fn begin_entry(&mut self) -> Result<&mut [BlockBuilder]> {
        if self.entry_open {
            return Err(Error::invalid_operation("begin_block_entry with an open entry"));
        }
        self.verify_fields_at(self.position_count())?;
        self.entry_open = true;
        Ok(&mut self.fields)
    }

    pub fn close_entry(&mut self) -> Result<()> {
        if !self.entry_open {
            return Err(Error::invalid_operation("close_entry without an open entry"));
        }
        if self.fields.iter().any(BlockBuilder::has_open_entry) {
            return Err(Error::invalid_operation("close_entry with an open field entry"));
        }
        self.verify_fields_at(self.position_count() + 1)?;
        self.nulls.push(false);
        self.entry_open = false;
        Ok(())
    }

    /// Appends a null row; each field receives a null at the same position.
    pub fn append_null(&mut self) -> Result<()> {
        if self.entry_open {
            return Err(Error::invalid_operation("append_null with an open entry"));
        }
        self.verify_fields_at(self.position_count())?;
        for field in &mut self.fields {
            field.append_null()?;
        }
        self.nulls.push(true);
        Ok(())
    }

    pub(crate) fn append_from(&mut self, source: &RowBlock, position: usize) -> Result<()> {
        if source.fields().len() != self.fields.len() {
            return Err(Error::invalid_arg(
                "block",
                format!(
                    "row of {} fields appended to a row builder of {} fields",
                    source.fields().len(),
                    self.fields.len()
                ),
            ));
        }
        self.verify_fields_at(self.position_count())?;
        for (field, source) in self.fields.iter_mut().zip(source.fields()) {
            field.append_position(source, position)?;
        }
        self.nulls.push(false);
        Ok(())
    }

    fn verify_fields_at(&self, expected: usize) -> Result<()> {
        match self.fields.iter().position(|f| f.position_count() != expected) {
            Some(i) => Err(Error::invalid_arg(
                "fields",
                format!(
                    "field {i} has {} positions, expected {expected}",
                    self.fields[i].position_count()
                ),
            )),
            None => Ok(()),
        }
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
        self.fields
            .iter()
            .map(|f| f.region_size_in_bytes_unchecked(start, len))
            .sum::<usize>()
            + null_mask_size(self.nulls.has_null(), len)
    }

    pub fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        self.fields
            .iter()
            .map(|f| f.positions_size_in_bytes_unchecked(selected, selected_count))
            .sum::<usize>()
            + null_mask_size(self.nulls.has_null(), selected_count)
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.nulls.retained_size_in_bytes()
            + self.fields.iter().map(BlockBuilder::retained_size_in_bytes).sum::<usize>()
    }

    pub fn copy_region(&self, start: usize, len: usize) -> Block {
        let fields = self
            .fields
            .iter()
            .map(|f| f.copy_region_unchecked(start, len))
            .collect();
        RowBlock::from_parts(len, fields, self.nulls.copy_region(start, len)).into()
    }

    pub fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let fields = self
            .fields
            .iter()
            .map(|f| f.copy_positions_unchecked(positions))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowBlock::from_parts(positions.len(), fields, self.nulls.copy_positions(positions)).into())
    }

    pub(crate) fn verify_buildable(&self) -> Result<()> {
        self.verify_fields_at(self.position_count())?;
        self.fields.iter().try_for_each(BlockBuilder::verify_buildable)
    }

    pub fn build(&mut self) -> Result<Block> {
        let position_count = self.position_count();
        self.verify_fields_at(position_count)?;
        let fields = self
            .fields
            .iter_mut()
            .map(BlockBuilder::build)
            .collect::<Result<Vec<_>>>()?;
        Ok(RowBlock::from_parts(position_count, fields, self.nulls.take_mask()).into())
    }

    pub fn reset(&mut self) {
        self.fields.iter_mut().for_each(BlockBuilder::reset);
        self.nulls.clear();
        self.entry_open = false;
    }

    pub fn reserve(&mut self, additional: usize) {
        self.fields.iter_mut().for_each(|f| f.reserve(additional));
        self.nulls.reserve(additional);
    }

    pub fn new_like(&self) -> RowBlockBuilder {
        RowBlockBuilder::new(
            self.fields.iter().map(BlockBuilder::new_block_builder_like).collect(),
            calculate_block_reset_size(self.position_count()),
        )
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.fields.iter_mut().for_each(|f| f.truncate(len));
        self.nulls.truncate(len);
        self.entry_open = false;
    }
}
