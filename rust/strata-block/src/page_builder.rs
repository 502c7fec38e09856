//! Accumulates rows into per-column builders and produces pages.
//!
//! Writers append one value per column to the builders exposed by
//! [`PageBuilder::block_builder`], then register the completed row with
//! [`PageBuilder::declare_position`]. [`PageBuilder::is_full`] tells the
//! caller when the accumulated page should be built and flushed.

use serde::{Deserialize, Serialize};
use strata_common::{Error, Result, verify_index};

use crate::builder::BlockBuilder;
use crate::page::Page;
use crate::size::instance_size;
use crate::types::Type;

/// Flush thresholds and sizing of a [`PageBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageBuilderOptions {
    /// Accumulated logical size at which the page is full.
    pub max_page_size_in_bytes: usize,
    /// Number of declared positions at which the page is full.
    pub max_positions: usize,
    /// Expected entries of the initial column builders.
    pub initial_expected_entries: usize,
}

impl PageBuilderOptions {
    pub const DEFAULT_MAX_PAGE_SIZE_IN_BYTES: usize = 1024 * 1024;

    pub fn with_max_page_size_in_bytes(&self, size: usize) -> Self {
        let mut options = self.clone();
        options.max_page_size_in_bytes = size;
        options
    }

    pub fn with_max_positions(&self, positions: usize) -> Self {
        let mut options = self.clone();
        options.max_positions = positions;
        options
    }

    pub fn with_initial_expected_entries(&self, entries: usize) -> Self {
        let mut options = self.clone();
        options.initial_expected_entries = entries;
        options
    }
}

impl Default for PageBuilderOptions {
    fn default() -> Self {
        Self {
            max_page_size_in_bytes: Self::DEFAULT_MAX_PAGE_SIZE_IN_BYTES,
            max_positions: u32::MAX as usize,
            initial_expected_entries: 8,
        }
    }
}

/// One builder per column plus the count of declared rows.
#[derive(Debug)]
pub struct PageBuilder {
    types: Vec<Type>,
    builders: Vec<BlockBuilder>,
    declared_positions: usize,
    options: PageBuilderOptions,
}

impl PageBuilder {
    pub fn new(types: Vec<Type>) -> PageBuilder {
        PageBuilder::with_options(types, PageBuilderOptions::default())
    }

    pub fn with_options(types: Vec<Type>, options: PageBuilderOptions) -> PageBuilder {
        let builders = types
            .iter()
            .map(|t| t.create_block_builder(options.initial_expected_entries))
            .collect();
        PageBuilder {
            types,
            builders,
            declared_positions: 0,
            options,
        }
    }

    #[inline]
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    #[inline]
    pub fn options(&self) -> &PageBuilderOptions {
        &self.options
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.builders.len()
    }

    pub fn block_builder(&mut self, channel: usize) -> Result<&mut BlockBuilder> {
        verify_index!(channel, self.builders.len());
        Ok(&mut self.builders[channel])
    }

    #[inline]
    pub fn block_builders(&mut self) -> &mut [BlockBuilder] {
        &mut self.builders
    }

    /// Registers one row appended to every column builder.
    pub fn declare_position(&mut self) {
        self.declared_positions += 1;
    }

    pub fn declare_positions(&mut self, positions: usize) {
        self.declared_positions += positions;
    }

    /// Appends the row at `position` of `page` to every column and declares
    /// it.
    pub fn append_row(&mut self, page: &Page, position: usize) -> Result<()> {
        if page.channel_count() != self.builders.len() {
            return Err(Error::invalid_arg(
                "page",
                format!(
                    "page of {} channels appended to a page builder of {} channels",
                    page.channel_count(),
                    self.builders.len()
                ),
            ));
        }
        for (builder, block) in self.builders.iter_mut().zip(page.blocks()) {
            builder.append_position(block, position)?;
        }
        self.declare_position();
        Ok(())
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.declared_positions
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.declared_positions == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.builders.iter().map(BlockBuilder::size_in_bytes).sum()
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>() + self.builders.iter().map(BlockBuilder::retained_size_in_bytes).sum::<usize>()
    }

    /// `true` once the declared rows or the accumulated size reach the
    /// configured limits.
    pub fn is_full(&self) -> bool {
        self.declared_positions >= self.options.max_positions
            || self.size_in_bytes() >= self.options.max_page_size_in_bytes
    }

    /// Discards the accumulated rows, keeping the builders' allocations.
    pub fn reset(&mut self) {
        if self.is_empty() && self.builders.iter().all(|b| b.position_count() == 0) {
            return;
        }
        log::debug!("resetting page builder with {} declared positions", self.declared_positions);
        self.builders.iter_mut().for_each(BlockBuilder::reset);
        self.declared_positions = 0;
    }

    /// Builds the accumulated rows into a page. Each column continues with a
    /// fresh builder sized after the one just built.
    ///
    /// Every column is checked before any of them is built, so a failed
    /// build leaves all builders and the declared rows untouched.
    pub fn build(&mut self) -> Result<Page> {
        for (channel, builder) in self.builders.iter().enumerate() {
            if builder.position_count() != self.declared_positions {
                return Err(Error::invalid_operation(format!(
                    "channel {channel} has {} positions but {} were declared",
                    builder.position_count(),
                    self.declared_positions
                )));
            }
            if let Err(e) = builder.verify_buildable() {
                log::debug!("page build rejected by channel {channel}: {e}");
                return Err(e);
            }
        }
        log::debug!(
            "building page: {} positions, {} channels, {} bytes",
            self.declared_positions,
            self.builders.len(),
            self.size_in_bytes()
        );
        let blocks = self
            .builders
            .iter_mut()
            .map(|builder| {
                let fresh = builder.new_block_builder_like();
                std::mem::replace(builder, fresh).build()
            })
            .collect::<Result<Vec<_>>>()?;
        let position_count = std::mem::take(&mut self.declared_positions);
        Page::with_position_count(position_count, blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bigint_varchar() -> PageBuilder {
        PageBuilder::new(vec![Type::BigInt, Type::Varchar])
    }

    fn write_row(builder: &mut PageBuilder, id: i64, name: &str) {
        builder.block_builder(0).unwrap().write_long(id).unwrap();
        let names = builder.block_builder(1).unwrap();
        names.write_bytes(name.as_bytes()).unwrap();
        names.close_entry().unwrap();
        builder.declare_position();
    }

    #[test]
    fn test_build() {
        let mut builder = bigint_varchar();
        write_row(&mut builder, 1, "one");
        write_row(&mut builder, 2, "two");
        let page = builder.build().unwrap();
        assert_eq!(page.position_count(), 2);
        assert_eq!(page.block(1).unwrap().get_slice(1).unwrap(), b"two");
        assert!(builder.is_empty());
        assert_eq!(builder.block_builder(0).unwrap().position_count(), 0);
    }

    #[test]
    fn test_undeclared_rows_rejected() {
        let mut builder = bigint_varchar();
        builder.block_builder(0).unwrap().write_long(1).unwrap();
        assert!(builder.build().is_err());
        builder.reset();
        assert!(builder.build().unwrap().position_count() == 0);
    }

    #[test]
    fn test_failed_build_keeps_rows() {
        let mut builder = bigint_varchar();
        write_row(&mut builder, 7, "ab");
        builder.block_builder(1).unwrap().write_bytes(b"pending").unwrap();
        assert!(builder.build().is_err());
        assert_eq!(builder.position_count(), 1);
        assert_eq!(builder.block_builder(0).unwrap().position_count(), 1);
        assert_eq!(builder.block_builder(1).unwrap().position_count(), 1);
        assert!(builder.block_builder(1).unwrap().has_open_entry());

        builder.block_builder(0).unwrap().write_long(8).unwrap();
        builder.block_builder(1).unwrap().close_entry().unwrap();
        builder.declare_position();
        let page = builder.build().unwrap();
        assert_eq!(page.position_count(), 2);
        assert_eq!(page.block(0).unwrap().get_long(0, 0).unwrap(), 7);
        assert_eq!(page.block(0).unwrap().get_long(1, 0).unwrap(), 8);
        assert_eq!(page.block(1).unwrap().get_slice(0).unwrap(), b"ab");
        assert_eq!(page.block(1).unwrap().get_slice(1).unwrap(), b"pending");
    }

    #[test]
    fn test_failed_nested_build_keeps_rows() {
        let mut builder = PageBuilder::new(vec![Type::BigInt, Type::array(Type::BigInt)]);
        builder.block_builder(0).unwrap().write_long(1).unwrap();
        builder.block_builder(1).unwrap().append_null().unwrap();
        builder.declare_position();
        let BlockBuilder::Array(arrays) = builder.block_builder(1).unwrap() else {
            unreachable!()
        };
        arrays.elements().write_long(5).unwrap();

        assert!(builder.build().is_err());
        assert_eq!(builder.position_count(), 1);
        assert_eq!(builder.block_builder(0).unwrap().position_count(), 1);
        assert_eq!(builder.block_builder(1).unwrap().position_count(), 1);
    }

    #[test]
    fn test_is_full() {
        let options = PageBuilderOptions::default().with_max_positions(2);
        let mut builder = PageBuilder::with_options(vec![Type::BigInt], options);
        builder.block_builder(0).unwrap().write_long(1).unwrap();
        builder.declare_position();
        assert!(!builder.is_full());
        builder.block_builder(0).unwrap().write_long(2).unwrap();
        builder.declare_position();
        assert!(builder.is_full());

        let options = PageBuilderOptions::default().with_max_page_size_in_bytes(20);
        let mut builder = PageBuilder::with_options(vec![Type::BigInt], options);
        builder.block_builder(0).unwrap().append_null().unwrap();
        builder.block_builder(0).unwrap().write_long(2).unwrap();
        builder.declare_positions(2);
        assert!(!builder.is_full());
        builder.block_builder(0).unwrap().write_long(3).unwrap();
        builder.declare_position();
        assert!(builder.is_full());
    }

    #[test]
    fn test_append_row() {
        let mut source = bigint_varchar();
        write_row(&mut source, 7, "seven");
        let page = source.build().unwrap();

        let mut builder = bigint_varchar();
        builder.append_row(&page, 0).unwrap();
        builder.append_row(&page, 0).unwrap();
        let copy = builder.build().unwrap();
        assert_eq!(copy.position_count(), 2);
        assert_eq!(copy.block(0).unwrap().get_long(1, 0).unwrap(), 7);
    }

    #[test]
    fn test_options_serde() {
        let options = PageBuilderOptions::default().with_initial_expected_entries(64);
        let json = serde_json::to_string(&options).unwrap();
        let parsed: PageBuilderOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, options);
        let partial: PageBuilderOptions = serde_json::from_str(r#"{"max_positions": 10}"#).unwrap();
        assert_eq!(partial.max_positions, 10);
        assert_eq!(partial.max_page_size_in_bytes, PageBuilderOptions::DEFAULT_MAX_PAGE_SIZE_IN_BYTES);
    }
}
