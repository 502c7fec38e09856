//! Encodings of fixed-width and variable-width blocks.

use std::io::{Read, Write};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use strata_common::{Error, Result};

use super::{
    BlockEncoding, BlockEncodingSerde, capacity_hint, malformed, read_bytes, read_count, read_nulls,
    read_offsets, unexpected_block, write_count, write_nulls, write_offsets,
};
use crate::block::{Block, BlockKind, FixedWidthBlock, VariableWidthBlock};
use crate::buffer::into_exact;
use crate::nulls;

/// Values of one width: position count, null flags, then the non-null values
/// in position order.
#[derive(Debug, Clone, Copy)]
pub struct FixedWidthEncoding {
    width: usize,
}

impl FixedWidthEncoding {
    /// # Panics
    ///
    /// Panics if `width` is not 1, 2, 4 or 8.
    pub fn new(width: usize) -> FixedWidthEncoding {
        assert!(matches!(width, 1 | 2 | 4 | 8), "unsupported value width {width}");
        FixedWidthEncoding { width }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    fn write_value(&self, output: &mut dyn Write, value: &[u8]) -> Result<()> {
        match self.width {
            1 => output.write_all(value)?,
            2 => output.write_i16::<LE>(bytemuck::pod_read_unaligned(value))?,
            4 => output.write_i32::<LE>(bytemuck::pod_read_unaligned(value))?,
            _ => output.write_i64::<LE>(bytemuck::pod_read_unaligned(value))?,
        }
        Ok(())
    }

    fn read_value(&self, input: &mut dyn Read, values: &mut Vec<u8>) -> Result<()> {
        match self.width {
            1 => values.push(input.read_u8()?),
            2 => values.extend_from_slice(&input.read_i16::<LE>()?.to_ne_bytes()),
            4 => values.extend_from_slice(&input.read_i32::<LE>()?.to_ne_bytes()),
            _ => values.extend_from_slice(&input.read_i64::<LE>()?.to_ne_bytes()),
        }
        Ok(())
    }
}

impl BlockEncoding for FixedWidthEncoding {
    fn name(&self) -> &'static str {
        match self.width {
            1 => "BYTE_ARRAY",
            2 => "SHORT_ARRAY",
            4 => "INT_ARRAY",
            _ => "LONG_ARRAY",
        }
    }

    fn write_block(&self, _serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::FixedWidth(fixed) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        if fixed.width() != self.width {
            return Err(unexpected_block(self.name(), block));
        }
        let count = block.position_count();
        write_count(output, count, self.name())?;
        write_nulls(output, fixed.nulls(), count)?;
        for (position, value) in fixed.values().chunks_exact(self.width).enumerate() {
            if !nulls::is_null(fixed.nulls(), position) {
                self.write_value(output, value)?;
            }
        }
        Ok(())
    }

    fn read_block(&self, _serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let count = read_count(input)?;
        let nulls = read_nulls(input, count)?;
        let mut values = Vec::with_capacity(capacity_hint(count) * self.width);
        for position in 0..count {
            if nulls.as_ref().is_some_and(|flags| flags[position]) {
                values.resize(values.len() + self.width, 0);
            } else {
                self.read_value(input, &mut values)?;
            }
        }
        let block = FixedWidthBlock::new(self.width, into_exact(values), nulls).map_err(malformed(self.name()))?;
        Ok(block.into())
    }
}

/// Byte strings: position count, null flags, end offsets rebased to zero,
/// then the referenced bytes.
#[derive(Debug, Clone, Copy)]
pub struct VariableWidthEncoding;

impl BlockEncoding for VariableWidthEncoding {
    fn name(&self) -> &'static str {
        "VARIABLE_WIDTH"
    }

    fn write_block(&self, _serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::VariableWidth(variable) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        let count = block.position_count();
        let offsets = variable.offsets();
        write_count(output, count, self.name())?;
        write_nulls(output, variable.nulls(), count)?;
        write_offsets(output, offsets)?;
        let bytes = &variable.raw_bytes()[offsets.first()..offsets.last()];
        output.write_all(bytes)?;
        Ok(())
    }

    fn read_block(&self, _serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let count = read_count(input)?;
        let nulls = read_nulls(input, count)?;
        let offsets = read_offsets(input, count)?;
        if offsets.first() != Some(&0) {
            return Err(Error::invalid_format(self.name(), "offsets must start at zero"));
        }
        let len = offsets.last().copied().unwrap_or_default() as usize;
        let bytes = read_bytes(input, len, self.name())?;
        let block = VariableWidthBlock::new(bytes, offsets, nulls).map_err(malformed(self.name()))?;
        Ok(block.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(block: &Block) -> Block {
        let serde = BlockEncodingSerde::default();
        serde.decode_block(&serde.encode_block(block).unwrap()).unwrap()
    }

    #[test]
    fn test_fixed_width_layout() {
        let block: Block = FixedWidthBlock::from_longs(&[0, 42, 0, 42], Some(vec![true, false, true, false]))
            .unwrap()
            .into();
        let bytes = BlockEncodingSerde::default().encode_block(&block).unwrap();
        // name, count, null flags, two values
        assert_eq!(bytes.len(), 4 + 10 + 4 + 2 + 16);
        assert_eq!(&bytes[4..14], b"LONG_ARRAY");
        assert_eq!(bytes[18..20], [1u8, 0b1010_0000]);
        assert_eq!(bytes[20..28], 42i64.to_le_bytes());

        let decoded = round_trip(&block);
        assert_eq!(decoded.position_count(), 4);
        assert!(decoded.is_null(0).unwrap());
        assert_eq!(decoded.get_long(3, 0).unwrap(), 42);
    }

    #[test]
    fn test_fixed_width_widths() {
        for width in [1usize, 2, 4] {
            let values = (0..3 * width as u8).collect::<Vec<u8>>();
            let block: Block = FixedWidthBlock::new(width, values.clone(), None).unwrap().into();
            let decoded = round_trip(&block);
            match decoded.kind() {
                BlockKind::FixedWidth(fixed) => {
                    assert_eq!(fixed.width(), width);
                    assert_eq!(fixed.values(), values.as_slice());
                    assert!(fixed.nulls().is_none());
                }
                _ => panic!("expected a fixed-width block"),
            }
        }
    }

    #[test]
    fn test_region_is_written_compact() {
        let block: Block = VariableWidthBlock::from_slices([Some(&b"aa"[..]), Some(&b"bbb"[..]), None, Some(&b"c"[..])]).unwrap()
            .into();
        let region = block.get_region(1, 3).unwrap();
        let decoded = round_trip(&region);
        assert_eq!(decoded.position_count(), 3);
        assert_eq!(decoded.get_slice(0).unwrap(), b"bbb");
        assert!(decoded.is_null(1).unwrap());
        assert_eq!(decoded.get_slice(2).unwrap(), b"c");
        assert!(decoded.is_compact());
    }

    #[test]
    fn test_wrong_width_rejected() {
        let block: Block = FixedWidthBlock::from_longs(&[1], None).unwrap().into();
        let mut bytes = Vec::new();
        let serde = BlockEncodingSerde::default();
        assert!(FixedWidthEncoding::new(4).write_block(&serde, &mut bytes, &block).is_err());
        assert!(VariableWidthEncoding.write_block(&serde, &mut bytes, &block).is_err());
    }
}
