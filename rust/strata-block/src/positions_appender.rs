//! Gathers selected positions of many input blocks into one output block.
//!
//! Run-length input is kept as a run for as long as every appended run
//! repeats the same value; the output is then a [`RunLengthBlock`]. Any other
//! input flattens the accumulated run into a regular builder.

use strata_common::{Result, verify_arg};

use crate::block::{Block, RunLengthBlock};
use crate::builder::BlockBuilder;
use crate::size::instance_size;
use crate::types::Type;

/// Output of a gather: while only one run-length value has been appended,
/// `run` holds it; the first other input moves everything into `builder`.
pub struct PositionsAppender {
    ty: Type,
    expected_entries: usize,
    run: Option<(Block, usize)>,
    builder: Option<BlockBuilder>,
}

impl PositionsAppender {
    pub fn new(ty: Type, expected_entries: usize) -> PositionsAppender {
        PositionsAppender {
            ty,
            expected_entries,
            run: None,
            builder: None,
        }
    }

    #[inline]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Appends `positions` of `block`, in order.
    pub fn append(&mut self, block: &Block, positions: &[u32]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        block.verify_positions(positions)?;
        if let Some(rle) = block.as_rle() {
            return self.append_rle(rle.value(), positions.len());
        }
        self.flat()?.append_positions(block, positions)
    }

    /// Appends the single-position `value` `count` times. Equivalent to
    /// appending `value` position by position `count` times.
    pub fn append_rle(&mut self, value: &Block, count: usize) -> Result<()> {
        verify_arg!(value, value.position_count() == 1);
        if count == 0 {
            return Ok(());
        }
        if self.builder.is_none() {
            match &mut self.run {
                None => {
                    self.run = Some((value.clone(), count));
                    return Ok(());
                }
                Some((current, current_count)) if current.ptr_eq(value) => {
                    *current_count += count;
                    return Ok(());
                }
                Some(_) => {}
            }
        }
        self.flat()?.append_repeated(value, 0, count)
    }

    /// Appends the value at `position` of `block`.
    pub fn append_row(&mut self, block: &Block, position: usize) -> Result<()> {
        self.flat()?.append_position(block, position)
    }

    pub fn position_count(&self) -> usize {
        match (&self.run, &self.builder) {
            (_, Some(builder)) => builder.position_count(),
            (Some((_, count)), None) => *count,
            (None, None) => 0,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match (&self.run, &self.builder) {
            (_, Some(builder)) => builder.size_in_bytes(),
            (Some((value, _)), None) => value.size_in_bytes(),
            (None, None) => 0,
        }
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>()
            + self.run.as_ref().map_or(0, |(value, _)| value.retained_size_in_bytes())
            + self.builder.as_ref().map_or(0, BlockBuilder::retained_size_in_bytes)
    }

    /// Builds the appended positions and returns the appender to its empty
    /// state.
    pub fn build(&mut self) -> Result<Block> {
        let run = self.run.take();
        match (run, self.builder.take()) {
            (_, Some(mut builder)) => builder.build(),
            (Some((value, count)), None) => Ok(RunLengthBlock::create_unchecked(value, count)),
            (None, None) => self.ty.create_block_builder(0).build(),
        }
    }

    pub fn reset(&mut self) {
        self.run = None;
        self.builder = None;
    }

    /// The regular builder, expanding an accumulated run into it first.
    fn flat(&mut self) -> Result<&mut BlockBuilder> {
        if let Some((value, count)) = self.run.take() {
            log::trace!("flattening run of {count} positions");
            let builder = self
                .builder
                .get_or_insert_with(|| self.ty.create_block_builder(self.expected_entries));
            builder.append_repeated(&value, 0, count)?;
        }
        Ok(self
            .builder
            .get_or_insert_with(|| self.ty.create_block_builder(self.expected_entries)))
    }
}
