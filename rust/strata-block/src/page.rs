//! A batch of rows stored column by column.

use ahash::{AHashMap, AHashSet};
use strata_common::{Error, Result, verify_index, verify_range};

use crate::block::{Block, DictionaryBlock, DictionaryId};
use crate::buffer::SharedBuffer;
use crate::size::instance_size;

/// A set of blocks (channels) sharing one position count.
#[derive(Clone)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Creates a page over at least one block; all blocks must have the same
    /// position count.
    pub fn new(blocks: Vec<Block>) -> Result<Page> {
        let Some(first) = blocks.first() else {
            return Err(Error::invalid_arg("blocks", "a page without blocks needs a position count"));
        };
        let position_count = first.position_count();
        Page::with_position_count(position_count, blocks)
    }

    /// Creates a page with an explicit position count, which allows pages
    /// without channels.
    pub fn with_position_count(position_count: usize, blocks: Vec<Block>) -> Result<Page> {
        if let Some((channel, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.position_count() != position_count)
        {
            return Err(Error::invalid_arg(
                "blocks",
                format!(
                    "block of channel {channel} has {} positions, expected {position_count}",
                    block.position_count()
                ),
            ));
        }
        Ok(Page { blocks, position_count })
    }

    #[inline]
    pub fn position_count(&self) -> usize {
        self.position_count
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, channel: usize) -> Result<&Block> {
        verify_index!(channel, self.blocks.len());
        Ok(&self.blocks[channel])
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn size_in_bytes(&self) -> usize {
        self.blocks.iter().map(Block::size_in_bytes).sum()
    }

    /// Memory retained by the page. Storage shared between channels, such as
    /// a common dictionary, is counted once.
    pub fn retained_size_in_bytes(&self) -> usize {
        let mut seen = AHashSet::new();
        let mut size = instance_size::<Self>() + self.blocks.capacity() * std::mem::size_of::<Block>();
        for block in &self.blocks {
            block.for_each_retained_part(&mut |part, bytes| {
                if seen.insert(part) {
                    size += bytes;
                }
            });
        }
        size
    }

    pub fn get_region(&self, start: usize, len: usize) -> Result<Page> {
        verify_range!("region", start, len, self.position_count);
        Ok(Page {
            blocks: self.blocks.iter().map(|b| b.region_unchecked(start, len)).collect(),
            position_count: len,
        })
    }

    pub fn copy_positions(&self, positions: &[u32], offset: usize, length: usize) -> Result<Page> {
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.copy_positions(positions, offset, length))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page { blocks, position_count: length })
    }

    /// Dictionary views of `positions[offset..offset + length]`. All
    /// channels share one ids buffer.
    pub fn get_positions(&self, positions: &SharedBuffer<u32>, offset: usize, length: usize) -> Result<Page> {
        verify_range!("positions", offset, length, positions.len());
        let ids = if offset == 0 && length == positions.len() {
            positions.clone()
        } else {
            SharedBuffer::copy_from_slice(&positions[offset..offset + length])
        };
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.get_positions(&ids, 0, length))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page { blocks, position_count: length })
    }

    /// Page of the listed channels, in the listed order.
    pub fn columns(&self, channels: &[usize]) -> Result<Page> {
        let blocks = channels
            .iter()
            .map(|&c| self.block(c).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Page { blocks, position_count: self.position_count })
    }

    /// This page with `block` as an additional last channel.
    pub fn append_column(&self, block: Block) -> Result<Page> {
        if block.position_count() != self.position_count {
            return Err(Error::invalid_arg(
                "block",
                format!(
                    "block has {} positions, page has {}",
                    block.position_count(),
                    self.position_count
                ),
            ));
        }
        let mut blocks = Vec::with_capacity(self.blocks.len() + 1);
        blocks.extend(self.blocks.iter().cloned());
        blocks.push(block);
        Ok(Page { blocks, position_count: self.position_count })
    }

    /// Copies every channel into compact storage. Dictionary channels that
    /// share a dictionary are compacted against one shared dictionary.
    pub fn compact(&self) -> Page {
        let mut blocks = self.blocks.clone();
        let mut related: AHashMap<DictionaryId, Vec<usize>> = AHashMap::new();
        for (channel, block) in self.blocks.iter().enumerate() {
            match block.as_dictionary() {
                Some(dictionary) => related.entry(dictionary.dictionary_id()).or_default().push(channel),
                None => blocks[channel] = block.copy_region_unchecked(0, block.position_count()),
            }
        }
        for channels in related.into_values() {
            let group = channels
                .iter()
                .filter_map(|&c| self.blocks[c].as_dictionary().cloned())
                .collect::<Vec<DictionaryBlock>>();
            // Equal ids over distinct dictionary instances are compacted one
            // by one.
            let compacted = DictionaryBlock::compact_related(&group)
                .unwrap_or_else(|_| group.iter().map(DictionaryBlock::compact).collect());
            for (channel, block) in channels.into_iter().zip(compacted) {
                blocks[channel] = block.into();
            }
        }
        Page { blocks, position_count: self.position_count }
    }

    /// One-position page holding the row at `position`.
    pub fn single_value_page(&self, position: usize) -> Result<Page> {
        verify_index!(position, self.position_count);
        Ok(Page {
            blocks: self
                .blocks
                .iter()
                .map(|b| b.ops().single_value_block(position))
                .collect(),
            position_count: 1,
        })
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("position_count", &self.position_count)
            .field("blocks", &self.blocks)
            .finish()
    }
}
