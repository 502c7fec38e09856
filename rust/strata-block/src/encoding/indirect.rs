//! Encodings of dictionary and run-length blocks.

use std::io::{Read, Write};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use strata_common::{Error, Result};
use uuid::Uuid;

use super::{BlockEncoding, BlockEncodingSerde, capacity_hint, malformed, read_count, unexpected_block, write_count};
use crate::block::{Block, BlockKind, DictionaryBlock, DictionaryId, RunLengthBlock};
use crate::buffer::{SharedBuffer, into_exact};

/// Position count, the dictionary, one id per position, then the dictionary
/// id. The block is compacted before writing, so unreferenced dictionary
/// entries are never written.
#[derive(Debug, Clone, Copy)]
pub struct DictionaryEncoding;

impl BlockEncoding for DictionaryEncoding {
    fn name(&self) -> &'static str {
        "DICTIONARY"
    }

    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::Dictionary(dictionary) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        let compacted = dictionary.compact();
        write_count(output, compacted.ids().len(), self.name())?;
        serde.write_block(output, compacted.dictionary())?;
        for &id in compacted.ids().iter() {
            output.write_u32::<LE>(id)?;
        }
        let dictionary_id = compacted.dictionary_id();
        output.write_u128::<LE>(dictionary_id.source().as_u128())?;
        output.write_u64::<LE>(dictionary_id.sequence())?;
        Ok(())
    }

    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let count = read_count(input)?;
        let dictionary = serde.read_block(input)?;
        let dictionary_size = dictionary.position_count();
        let mut ids = Vec::with_capacity(capacity_hint(count));
        for position in 0..count {
            let id = input.read_u32::<LE>()?;
            if id as usize >= dictionary_size {
                return Err(Error::invalid_format(
                    self.name(),
                    format!("id {id} at position {position} exceeds dictionary of {dictionary_size} entries"),
                ));
            }
            ids.push(id);
        }
        let source = Uuid::from_u128(input.read_u128::<LE>()?);
        let sequence = input.read_u64::<LE>()?;
        Ok(DictionaryBlock::new_unchecked(
            SharedBuffer::from_vec(into_exact(ids)),
            dictionary,
            DictionaryId::new(source, sequence),
        )
        .into())
    }
}

/// Position count followed by the single-position value.
#[derive(Debug, Clone, Copy)]
pub struct RunLengthEncoding;

impl BlockEncoding for RunLengthEncoding {
    fn name(&self) -> &'static str {
        "RLE"
    }

    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()> {
        let BlockKind::Rle(rle) = block.kind() else {
            return Err(unexpected_block(self.name(), block));
        };
        write_count(output, block.position_count(), self.name())?;
        serde.write_block(output, rle.value())
    }

    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block> {
        let count = read_count(input)?;
        let value = serde.read_block(input)?;
        RunLengthBlock::create(value, count).map_err(malformed(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{FixedWidthBlock, VariableWidthBlock};

    fn round_trip(block: &Block) -> Block {
        let serde = BlockEncodingSerde::default();
        serde.decode_block(&serde.encode_block(block).unwrap()).unwrap()
    }

    #[test]
    fn test_dictionary_written_compacted() {
        let dictionary: Block = FixedWidthBlock::from_longs(&[10, 20, 30, 40, 50], None).unwrap().into();
        let block = DictionaryBlock::create(4, dictionary, vec![4u32, 1, 4, 1]).unwrap();
        let decoded = round_trip(&block);
        let decoded_dictionary = decoded.as_dictionary().unwrap();
        assert_eq!(decoded_dictionary.dictionary().position_count(), 2);
        let values = (0..4).map(|p| decoded.get_long(p, 0).unwrap()).collect::<Vec<_>>();
        assert_eq!(values, vec![50, 20, 50, 20]);
    }

    #[test]
    fn test_dictionary_id_preserved() {
        let dictionary: Block = FixedWidthBlock::from_longs(&[10, 20], None).unwrap().into();
        let block = DictionaryBlock::create(3, dictionary, vec![1u32, 0, 1]).unwrap();
        let decoded = round_trip(&block);
        assert_eq!(
            decoded.as_dictionary().unwrap().dictionary_id(),
            block.as_dictionary().unwrap().dictionary_id()
        );
    }

    #[test]
    fn test_dictionary_id_out_of_range() {
        let serde = BlockEncodingSerde::default();
        let dictionary: Block = FixedWidthBlock::from_longs(&[10, 20], None).unwrap().into();
        let block = DictionaryBlock::create(2, dictionary, vec![1u32, 0]).unwrap();
        let mut bytes = serde.encode_block(&block).unwrap();
        // "DICTIONARY" name and count, then the dictionary block of 2 longs
        let ids_start = 4 + 10 + 4 + (4 + 10 + 4 + 1 + 16);
        bytes[ids_start] = 7;
        assert!(serde.decode_block(&bytes).is_err());
    }

    #[test]
    fn test_run_length_region() {
        let value: Block = VariableWidthBlock::from_slices([Some(&b"x"[..])]).unwrap().into();
        let block = RunLengthBlock::create(value, 10).unwrap();
        let region = block.get_region(2, 3).unwrap();
        let decoded = round_trip(&region);
        assert!(decoded.as_rle().is_some());
        assert_eq!(decoded.position_count(), 3);
        assert_eq!(decoded.get_slice(2).unwrap(), b"x");
    }
}
