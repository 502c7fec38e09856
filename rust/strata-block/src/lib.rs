//! Columnar blocks: the unit of data exchanged between query operators.
//!
//! This crate provides the positional, type-erased columnar memory model of
//! the Strata execution engine, along with the builders that produce it and
//! the encodings that move it across process boundaries.
//!
//! # Core Concepts
//!
//! ## Blocks
//!
//! A [`Block`] is an immutable sequence of `position_count` values of one
//! [`Type`], each possibly null. Blocks are cheap to clone and support:
//! - Random access reads through fixed-width accessors (`get_long`, ...),
//!   byte slices and nested views ([`SqlMap`], [`SqlRow`])
//! - Zero-copy regions (`get_region`) and compacting copies (`copy_region`,
//!   `copy_positions`)
//! - Size accounting: `size_in_bytes` measures the addressed values,
//!   `retained_size_in_bytes` everything kept alive, including spare
//!   capacity and shared storage
//!
//! ## Block kinds
//!
//! The representation is one of a closed set of kinds ([`BlockKind`]):
//! - Flat: [`FixedWidthBlock`], [`VariableWidthBlock`]
//! - Structural: [`ArrayBlock`], [`MapBlock`], [`RowBlock`]
//! - Indirect: [`DictionaryBlock`] (positions resolved through ids into a
//!   shared dictionary) and [`RunLengthBlock`] (one value repeated)
//!
//! ## Builders
//!
//! A [`BlockBuilder`] appends values and is frozen into a block by `build()`.
//! [`Type::create_block_builder`] creates the builder matching a type.
//!
//! ## Pages
//!
//! A [`Page`] is a set of same-length blocks, one per column. A
//! [`PageBuilder`] drives one builder per column and reports when the
//! accumulated page should be flushed.
//!
//! ## Encodings
//!
//! [`encoding::BlockEncodingSerde`] serializes blocks and pages using one
//! named encoding per block kind.

pub mod block;
pub mod buffer;
pub mod builder;
pub mod encoding;
pub mod nulls;
pub mod offsets;
pub mod page;
pub mod page_builder;
pub mod positions_appender;
pub mod size;
pub mod types;
pub mod value;

pub use block::{
    ArrayBlock, Block, BlockKind, Capabilities, DictionaryBlock, DictionaryId, FixedWidthBlock, MapBlock,
    RowBlock, RunLengthBlock, VariableWidthBlock,
};
pub use buffer::{PartId, SharedBuffer};
pub use builder::{BlockBuilder, EntryBuilder};
pub use page::Page;
pub use page_builder::{PageBuilder, PageBuilderOptions};
pub use positions_appender::PositionsAppender;
pub use types::{StorageClass, Type};
pub use value::{SqlMap, SqlRow, Value};
