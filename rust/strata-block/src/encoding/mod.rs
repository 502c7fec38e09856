//! Serialization of blocks and pages.
//!
//! Every block is written as the length-prefixed name of its encoding followed
//! by the encoding's payload. Nested blocks (array elements, map keys and
//! values, row fields, dictionaries, run values) are written recursively
//! through the same [`BlockEncodingSerde`], so a reader only needs the set of
//! encodings the writer used.
//!
//! All integers are little-endian. Null flags are written as a `u8` presence
//! flag followed, when set, by one bit per position packed most significant
//! bit first.

use std::io::{Read, Write};
use std::sync::Arc;

use ahash::AHashMap;
use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use strata_common::{Error, Result};

use crate::block::Block;
use crate::buffer::into_exact;
use crate::nulls::NullMask;
use crate::offsets::Offsets;
use crate::page::Page;

mod flat;
mod indirect;
mod nested;

pub use flat::{FixedWidthEncoding, VariableWidthEncoding};
pub use indirect::{DictionaryEncoding, RunLengthEncoding};
pub use nested::{ArrayEncoding, MapEncoding, RowEncoding};

/// Upper bound of the capacity reserved up front from a decoded count.
/// Larger inputs grow as they are actually read.
const MAX_PREALLOCATED_ITEMS: usize = 1 << 16;

/// A named wire format for one block kind.
pub trait BlockEncoding: Send + Sync + 'static {
    /// Name written ahead of the payload. Must be unique within a
    /// [`BlockEncodingSerde`].
    fn name(&self) -> &'static str;

    /// Writes the payload of `block`. Nested blocks are written through
    /// `serde`.
    fn write_block(&self, serde: &BlockEncodingSerde, output: &mut dyn Write, block: &Block) -> Result<()>;

    /// Reads a payload written by [`BlockEncoding::write_block`].
    fn read_block(&self, serde: &BlockEncodingSerde, input: &mut dyn Read) -> Result<Block>;
}

/// Registry of block encodings by name, and the entry point for writing and
/// reading blocks and pages.
///
/// `BlockEncodingSerde::default()` knows every built-in encoding;
/// [`BlockEncodingSerde::empty`] starts with none.
#[derive(Clone)]
pub struct BlockEncodingSerde {
    encodings: AHashMap<String, Arc<dyn BlockEncoding>>,
}

impl BlockEncodingSerde {
    pub fn empty() -> BlockEncodingSerde {
        BlockEncodingSerde {
            encodings: AHashMap::new(),
        }
    }

    /// Adds `encoding`, replacing any encoding registered under the same
    /// name.
    pub fn register(&mut self, encoding: Arc<dyn BlockEncoding>) {
        self.encodings.insert(encoding.name().to_string(), encoding);
    }

    pub fn encoding(&self, name: &str) -> Result<&Arc<dyn BlockEncoding>> {
        self.encodings.get(name).ok_or_else(|| {
            log::debug!("unknown block encoding '{name}'");
            Error::invalid_format("block encoding", format!("unknown block encoding '{name}'"))
        })
    }

    pub fn encoding_names(&self) -> Vec<&str> {
        let mut names = self.encodings.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn write_block(&self, output: &mut dyn Write, block: &Block) -> Result<()> {
        let encoding = self.encoding(block.encoding_name())?;
        write_name(output, encoding.name())?;
        encoding.write_block(self, output, block)
    }

    pub fn read_block(&self, input: &mut dyn Read) -> Result<Block> {
        let name = read_name(input)?;
        self.encoding(&name)?.read_block(self, input)
    }

    /// Writes the position count, the channel count and every channel.
    pub fn write_page(&self, output: &mut dyn Write, page: &Page) -> Result<()> {
        write_count(output, page.position_count(), "page positions")?;
        write_count(output, page.channel_count(), "page channels")?;
        for block in page.blocks() {
            self.write_block(output, block)?;
        }
        Ok(())
    }

    pub fn read_page(&self, input: &mut dyn Read) -> Result<Page> {
        let position_count = read_count(input)?;
        let channel_count = read_count(input)?;
        let mut blocks = Vec::with_capacity(channel_count.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..channel_count {
            blocks.push(self.read_block(input)?);
        }
        Page::with_position_count(position_count, blocks)
            .map_err(|e| Error::invalid_format("page", e.to_string()))
    }

    /// Serializes `block` into a new buffer.
    pub fn encode_block(&self, block: &Block) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(block.size_in_bytes() + 64);
        self.write_block(&mut buffer, block)?;
        Ok(buffer)
    }

    /// Deserializes a block that must span all of `bytes`.
    pub fn decode_block(&self, bytes: &[u8]) -> Result<Block> {
        let mut input = bytes;
        let block = self.read_block(&mut input)?;
        if !input.is_empty() {
            return Err(Error::invalid_format(
                "block",
                format!("{} trailing bytes after the encoded block", input.len()),
            ));
        }
        Ok(block)
    }
}

impl Default for BlockEncodingSerde {
    fn default() -> Self {
        let mut serde = BlockEncodingSerde::empty();
        for width in [1, 2, 4, 8] {
            serde.register(Arc::new(FixedWidthEncoding::new(width)));
        }
        serde.register(Arc::new(VariableWidthEncoding));
        serde.register(Arc::new(ArrayEncoding));
        serde.register(Arc::new(MapEncoding));
        serde.register(Arc::new(RowEncoding));
        serde.register(Arc::new(DictionaryEncoding));
        serde.register(Arc::new(RunLengthEncoding));
        serde
    }
}

impl std::fmt::Debug for BlockEncodingSerde {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEncodingSerde")
            .field("encodings", &self.encoding_names())
            .finish()
    }
}

fn write_name(output: &mut dyn Write, name: &str) -> Result<()> {
    write_count(output, name.len(), "encoding name")?;
    output.write_all(name.as_bytes())?;
    Ok(())
}

fn read_name(input: &mut dyn Read) -> Result<String> {
    let len = read_count(input)?;
    let bytes = read_bytes(input, len, "encoding name")?;
    String::from_utf8(bytes).map_err(|e| Error::invalid_format("encoding name", e.to_string()))
}

pub(crate) fn write_count(output: &mut dyn Write, count: usize, what: &str) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| Error::invalid_format(what, format!("{count} does not fit the encoded width")))?;
    output.write_u32::<LE>(count)?;
    Ok(())
}

pub(crate) fn read_count(input: &mut dyn Read) -> Result<usize> {
    Ok(input.read_u32::<LE>()? as usize)
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
/// Decoded vectors carry no spare capacity.
pub(crate) fn read_bytes(input: &mut dyn Read, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOCATED_ITEMS));
    Read::take(&mut *input, len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(Error::invalid_format(
            what,
            format!("expected {len} bytes, input ended after {}", bytes.len()),
        ));
    }
    Ok(into_exact(bytes))
}

#[inline]
pub(crate) fn capacity_hint(count: usize) -> usize {
    count.min(MAX_PREALLOCATED_ITEMS)
}

/// Writes the flags of `count` positions. A mask without nulls is written as
/// an absent mask.
pub(crate) fn write_nulls(output: &mut dyn Write, nulls: &NullMask, count: usize) -> Result<()> {
    let Some(flags) = nulls.as_ref().filter(|flags| flags[..count].contains(&true)) else {
        output.write_u8(0)?;
        return Ok(());
    };
    output.write_u8(1)?;
    let mut packed = vec![0u8; count.div_ceil(8)];
    for (position, _) in flags[..count].iter().enumerate().filter(|(_, is_null)| **is_null) {
        packed[position / 8] |= 0x80 >> (position % 8);
    }
    output.write_all(&packed)?;
    Ok(())
}

pub(crate) fn read_nulls(input: &mut dyn Read, count: usize) -> Result<Option<Vec<bool>>> {
    match input.read_u8()? {
        0 => Ok(None),
        1 => {
            let packed = read_bytes(input, count.div_ceil(8), "null flags")?;
            Ok(Some(
                (0..count)
                    .map(|position| packed[position / 8] & (0x80 >> (position % 8)) != 0)
                    .collect(),
            ))
        }
        flag => Err(Error::invalid_format("null flags", format!("invalid presence flag {flag}"))),
    }
}

/// Writes the `item_count + 1` offsets rebased to start at zero.
pub(crate) fn write_offsets(output: &mut dyn Write, offsets: &Offsets) -> Result<()> {
    let first = offsets.as_slice()[0];
    for &offset in offsets.as_slice() {
        output.write_u32::<LE>(offset - first)?;
    }
    Ok(())
}

pub(crate) fn read_offsets(input: &mut dyn Read, item_count: usize) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(capacity_hint(item_count + 1));
    for _ in 0..=item_count {
        offsets.push(input.read_u32::<LE>()?);
    }
    Ok(into_exact(offsets))
}

pub(crate) fn unexpected_block(encoding: &str, block: &Block) -> Error {
    Error::invalid_arg(
        "block",
        format!("{encoding} encoding cannot write a {} block", block.kind_name()),
    )
}

/// Wraps a validation failure of decoded parts as a format error.
pub(crate) fn malformed(encoding: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |e| Error::invalid_format(encoding, e.to_string())
}
