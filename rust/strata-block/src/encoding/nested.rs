//! Encodings of array, map and row blocks.
//!
//! Child blocks are written first, through the registry, and only the range
//! addressed by the nested block is written. Offsets are rebased to that range.

use std::io::{Read, Write};

use strata_common::Result;

use super::{
    BlockEncoding, BlockEncodingSerde, capacity_hint, malformed, read_count, read_nulls, read_offsets,
    unexpected_block, write_count, write_nulls, write_offsets,
};
use crate::block::{ArrayBlock, Block, BlockKind, MapBlock, RowBlock};

#[derive(Debug, Clone, Copy)]
pub struct ArrayEncoding;

impl BlockEncoding for ArrayEncoding {
    fn name(&self) -> &'static str {
        "ARRAY"
    }

    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::Array(array) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        let count = block.position_count();
        let offsets = array.offsets();
        let elements = array.raw_values().region_unchecked(offsets.first(), offsets.span());
        serde.write_block(output, &elements)?;
        write_count(output, count, self.name())?;
        write_offsets(output, offsets)?;
        write_nulls(output, array.nulls(), count)
    }

    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let elements = serde.read_block(input)?;
        let count = read_count(input)?;
        let offsets = read_offsets(input, count)?;
        let nulls = read_nulls(input, count)?;
        ArrayBlock::from_element_block(count, nulls, offsets, elements).map_err(malformed(self.name()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapEncoding;

impl BlockEncoding for MapEncoding {
    fn name(&self) -> &'static str {
        "MAP"
    }

    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::Map(map) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        let count = block.position_count();
        let offsets = map.offsets();
        let (start, len) = (offsets.first(), offsets.span());
        serde.write_block(output, &map.raw_keys().region_unchecked(start, len))?;
        serde.write_block(output, &map.raw_values().region_unchecked(start, len))?;
        write_count(output, count, self.name())?;
        write_offsets(output, offsets)?;
        write_nulls(output, map.nulls(), count)
    }

    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let keys = serde.read_block(input)?;
        let values = serde.read_block(input)?;
        let count = read_count(input)?;
        let offsets = read_offsets(input, count)?;
        let nulls = read_nulls(input, count)?;
        MapBlock::from_key_value_blocks(count, nulls, offsets, keys, values).map_err(malformed(self.name()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowEncoding;

impl BlockEncoding for RowEncoding {
    fn name(&self) -> &'static str {
        "ROW"
    }

    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::Row(row) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        write_count(output, row.fields().len(), self.name())?;
        for field in row.fields() {
            serde.write_block(output, field)?;
        }
        let count = block.position_count();
        write_count(output, count, self.name())?;
        write_nulls(output, row.nulls(), count)
    }

    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let field_count = read_count(input)?;
        let mut fields = Vec::with_capacity(capacity_hint(field_count));
        for _ in 0..field_count {
            fields.push(serde.read_block(input)?);
        }
        let count = read_count(input)?;
        let nulls = read_nulls(input, count)?;
        RowBlock::from_field_blocks(count, nulls, fields).map_err(malformed(self.name()))
    }
}
