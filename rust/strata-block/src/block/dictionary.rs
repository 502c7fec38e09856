//! Dictionary-encoded blocks.
//!
//! A dictionary block maps each of its positions to a position of a shared
//! dictionary block through a vector of ids. Blocks cut from the same
//! dictionary (regions, position views) carry the same [`DictionaryId`], which
//! lets a page compact related columns against one shared dictionary.

use std::sync::OnceLock;

use strata_common::{Result, verify_arg};
use uuid::Uuid;

use crate::block::{Block, BlockKind, BlockOps, RunLengthBlock, instance_part_id};
use crate::buffer::{PartId, SharedBuffer, exact_vec};
use crate::size::{SIZE_OF_ID, instance_size};

/// Identity of a dictionary and the blocks derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictionaryId {
    source: u128,
    sequence: u64,
}

impl DictionaryId {
    /// A fresh id with a random source.
    pub fn random() -> DictionaryId {
        DictionaryId {
            source: Uuid::new_v4().as_u128(),
            sequence: 0,
        }
    }

    pub fn new(source: Uuid, sequence: u64) -> DictionaryId {
        DictionaryId {
            source: source.as_u128(),
            sequence,
        }
    }

    /// An id sharing this id's source with a different sequence number.
    pub fn with_sequence(&self, sequence: u64) -> DictionaryId {
        DictionaryId {
            source: self.source,
            sequence,
        }
    }

    pub fn source(&self) -> Uuid {
        Uuid::from_u128(self.source)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Positions resolving through `ids` into a shared dictionary.
#[derive(Clone)]
pub struct DictionaryBlock {
    ids: SharedBuffer<u32>,
    dictionary: Block,
    dictionary_id: DictionaryId,
    /// Logical size and the number of distinct referenced entries.
    usage: OnceLock<(usize, usize)>,
}

impl DictionaryBlock {
    /// Creates a block of the first `position_count` ids over `dictionary`.
    ///
    /// Every id is validated against the dictionary. The result is simplified
    /// where possible: no positions yield an empty block, a single position
    /// yields a region of the dictionary, a dictionary over a dictionary is
    /// flattened, and a dictionary over a run-length block becomes run-length
    /// encoded.
    pub fn create(position_count: usize, dictionary: Block, ids: impl Into<SharedBuffer<u32>>) -> Result<Block> {
        let ids = ids.into();
        verify_arg!(ids, ids.len() >= position_count);
        let ids = ids.slice(0..position_count);
        dictionary.verify_positions(&ids)?;
        Ok(DictionaryBlock::create_unchecked(ids, dictionary, DictionaryId::random()))
    }

    /// Creates a dictionary block without simplification.
    pub fn try_new(dictionary: Block, ids: impl Into<SharedBuffer<u32>>) -> Result<DictionaryBlock> {
        let ids = ids.into();
        dictionary.verify_positions(&ids)?;
        Ok(DictionaryBlock::new_unchecked(ids, dictionary, DictionaryId::random()))
    }

    pub(crate) fn new_unchecked(ids: SharedBuffer<u32>, dictionary: Block, dictionary_id: DictionaryId) -> DictionaryBlock {
        DictionaryBlock {
            ids,
            dictionary,
            dictionary_id,
            usage: OnceLock::new(),
        }
    }

    pub(crate) fn create_unchecked(ids: SharedBuffer<u32>, dictionary: Block, dictionary_id: DictionaryId) -> Block {
        match ids.len() {
            0 => return dictionary.copy_region_unchecked(0, 0),
            1 => return dictionary.region_unchecked(ids[0] as usize, 1),
            _ => {}
        }
        match dictionary.kind() {
            BlockKind::Rle(rle) => RunLengthBlock::create_unchecked(rle.value().clone(), ids.len()),
            BlockKind::Dictionary(inner) => {
                let flattened = exact_vec(ids.iter().map(|&id| inner.ids[id as usize]), ids.len());
                DictionaryBlock::new_unchecked(
                    SharedBuffer::from_vec(flattened),
                    inner.dictionary.clone(),
                    dictionary_id,
                )
                .into()
            }
            _ => DictionaryBlock::new_unchecked(ids, dictionary, dictionary_id).into(),
        }
    }

    #[inline]
    pub fn ids(&self) -> &SharedBuffer<u32> {
        &self.ids
    }

    /// Dictionary position of `position`.
    #[inline]
    pub fn id(&self, position: usize) -> usize {
        self.ids[position] as usize
    }

    #[inline]
    pub fn dictionary(&self) -> &Block {
        &self.dictionary
    }

    #[inline]
    pub fn dictionary_id(&self) -> DictionaryId {
        self.dictionary_id
    }

    /// Number of distinct dictionary entries referenced by this block.
    pub fn unique_ids(&self) -> usize {
        self.usage().1
    }

    /// Returns a block referencing only the used dictionary entries,
    /// renumbered in dictionary order.
    pub fn compact(&self) -> DictionaryBlock {
        if self.is_compact() {
            return self.clone();
        }
        log::trace!(
            "compacting dictionary of {} entries to {} referenced entries",
            self.dictionary.position_count(),
            self.unique_ids()
        );
        self.compact_ids(&self.ids, DictionaryId::random())
    }

    /// Compacts blocks that share one dictionary against a single compacted
    /// dictionary, preserving their relationship.
    pub fn compact_related(blocks: &[DictionaryBlock]) -> Result<Vec<DictionaryBlock>> {
        let Some(first) = blocks.first() else {
            return Ok(Vec::new());
        };
        let dictionary = &first.dictionary;
        verify_arg!(blocks, blocks.iter().all(|b| b.dictionary.ptr_eq(dictionary)));

        let mut used = vec![false; dictionary.position_count()];
        let mut unique = 0;
        for block in blocks {
            mark_used(block.ids.iter().copied(), &mut used, &mut unique);
        }

        if unique == dictionary.position_count() && dictionary.is_compact() {
            return Ok(blocks
                .iter()
                .map(|b| {
                    DictionaryBlock::new_unchecked(
                        b.ids.compact_range(0..b.ids.len()),
                        dictionary.clone(),
                        b.dictionary_id,
                    )
                })
                .collect());
        }

        log::trace!(
            "compacting {} related blocks: dictionary of {} entries to {} referenced entries",
            blocks.len(),
            dictionary.position_count(),
            unique
        );
        let (remap, kept) = renumber(&used, unique);
        let compacted = dictionary.ops().copy_positions(&kept)?;
        let dictionary_id = DictionaryId::random();
        Ok(blocks
            .iter()
            .map(|b| {
                DictionaryBlock::new_unchecked(remap_ids(&b.ids, &remap), compacted.clone(), dictionary_id)
            })
            .collect())
    }

    fn usage(&self) -> (usize, usize) {
        *self.usage.get_or_init(|| {
            let (used, unique) = self.used_entries(self.ids.iter().copied());
            (self.size_of_selection(&used, unique, self.ids.len()), unique)
        })
    }

    fn used_entries(&self, ids: impl IntoIterator<Item = u32>) -> (Vec<bool>, usize) {
        let mut used = vec![false; self.dictionary.position_count()];
        let mut unique = 0;
        mark_used(ids, &mut used, &mut unique);
        (used, unique)
    }

    fn size_of_selection(&self, used: &[bool], unique: usize, position_count: usize) -> usize {
        self.dictionary.ops().positions_size_in_bytes(used, unique) + position_count * SIZE_OF_ID
    }

    fn compact_ids(&self, ids: &[u32], dictionary_id: DictionaryId) -> DictionaryBlock {
        let (used, unique) = self.used_entries(ids.iter().copied());
        if unique == self.dictionary.position_count() && self.dictionary.is_compact() {
            return DictionaryBlock::new_unchecked(
                SharedBuffer::copy_from_slice(ids),
                self.dictionary.clone(),
                dictionary_id,
            );
        }
        let (remap, kept) = renumber(&used, unique);
        match self.dictionary.ops().copy_positions(&kept) {
            Ok(compacted) => DictionaryBlock::new_unchecked(remap_ids(ids, &remap), compacted, dictionary_id),
            Err(e) => {
                log::debug!("keeping the full dictionary, compaction failed: {e}");
                DictionaryBlock::new_unchecked(SharedBuffer::copy_from_slice(ids), self.dictionary.clone(), dictionary_id)
            }
        }
    }
}

pub(crate) fn mark_used(ids: impl IntoIterator<Item = u32>, used: &mut [bool], unique: &mut usize) {
    for id in ids {
        let slot = &mut used[id as usize];
        if !*slot {
            *slot = true;
            *unique += 1;
        }
    }
}

/// New id of every used dictionary entry, and the used entries in order.
pub(crate) fn renumber(used: &[bool], unique: usize) -> (Vec<u32>, Vec<u32>) {
    let mut remap = vec![u32::MAX; used.len()];
    let mut kept = Vec::with_capacity(unique);
    for (position, _) in used.iter().enumerate().filter(|(_, u)| **u) {
        remap[position] = kept.len() as u32;
        kept.push(position as u32);
    }
    (remap, kept)
}

pub(crate) fn remap_ids(ids: &[u32], remap: &[u32]) -> SharedBuffer<u32> {
    SharedBuffer::from_vec(exact_vec(ids.iter().map(|&id| remap[id as usize]), ids.len()))
}

impl BlockOps for DictionaryBlock {
    #[inline]
    fn position_count(&self) -> usize {
        self.ids.len()
    }

    fn may_have_null(&self) -> bool {
        self.dictionary.may_have_null()
    }

    fn is_null_unchecked(&self, position: usize) -> bool {
        self.dictionary.ops().is_null_unchecked(self.id(position))
    }

    fn size_in_bytes(&self) -> usize {
        self.usage().0
    }

    fn region_size_in_bytes(&self, start: usize, len: usize) -> usize {
        if start == 0 && len == self.ids.len() {
            return self.size_in_bytes();
        }
        let (used, unique) = self.used_entries(self.ids[start..start + len].iter().copied());
        self.size_of_selection(&used, unique, len)
    }

    fn positions_size_in_bytes(&self, selected: &[bool], selected_count: usize) -> usize {
        let ids = self
            .ids
            .iter()
            .zip(selected)
            .filter(|(_, s)| **s)
            .map(|(&id, _)| id);
        let (used, unique) = self.used_entries(ids);
        self.size_of_selection(&used, unique, selected_count)
    }

    fn retained_size_in_bytes(&self) -> usize {
        instance_size::<Self>() + self.ids.retained_size_in_bytes() + self.dictionary.retained_size_in_bytes()
    }

    fn for_each_retained_part(&self, consumer: &mut dyn FnMut(PartId, usize)) {
        consumer(instance_part_id(self), instance_size::<Self>());
        consumer(self.ids.part_id(), self.ids.retained_size_in_bytes());
        self.dictionary.for_each_retained_part(consumer);
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        self.dictionary.ops().estimated_data_size_for_stats(self.id(position))
    }

    fn is_compact(&self) -> bool {
        self.ids.is_compact()
            && self.dictionary.is_compact()
            && self.unique_ids() == self.dictionary.position_count()
    }

    fn get_region(&self, start: usize, len: usize) -> Block {
        DictionaryBlock::new_unchecked(
            self.ids.slice(start..start + len),
            self.dictionary.clone(),
            self.dictionary_id,
        )
        .into()
    }

    fn copy_region(&self, start: usize, len: usize) -> Block {
        self.compact_ids(&self.ids[start..start + len], DictionaryId::random()).into()
    }

    fn copy_positions(&self, positions: &[u32]) -> Result<Block> {
        let ids = exact_vec(positions.iter().map(|&p| self.ids[p as usize]), positions.len());
        Ok(self.compact_ids(&ids, DictionaryId::random()).into())
    }

    fn single_value_block(&self, position: usize) -> Block {
        self.dictionary.ops().single_value_block(self.id(position))
    }

    fn copy_with_appended_null(&self) -> Block {
        let existing_null = if self.dictionary.may_have_null() {
            (0..self.dictionary.position_count()).find(|&p| self.dictionary.ops().is_null_unchecked(p))
        } else {
            None
        };
        let (dictionary, null_id) = match existing_null {
            Some(p) => (self.dictionary.clone(), p),
            None => (self.dictionary.copy_with_appended_null(), self.dictionary.position_count()),
        };
        let ids = self.ids.with_appended(null_id as u32);
        DictionaryBlock::new_unchecked(ids, dictionary, DictionaryId::random()).into()
    }

    fn children(&self) -> Vec<Block> {
        vec![self.dictionary.clone()]
    }

    fn encoding_name(&self) -> &'static str {
        "DICTIONARY"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{FixedWidthBlock, VariableWidthBlock};

    fn words() -> Block {
        VariableWidthBlock::from_slices([Some("alpha"), Some("beta"), None, Some("delta")].map(|v| v.map(str::as_bytes))).unwrap()
            .into()
    }

    #[test]
    fn test_create_validates_ids() {
        assert!(DictionaryBlock::create(2, words(), vec![0u32, 4]).is_err());
        assert!(DictionaryBlock::create(3, words(), vec![0u32, 1]).is_err());
        assert!(DictionaryBlock::create(1, words(), vec![0u32, 4]).is_ok());
    }

    #[test]
    fn test_create_simplifies() {
        let dictionary = words();
        let empty = DictionaryBlock::create(0, dictionary.clone(), Vec::<u32>::new()).unwrap();
        assert_eq!(empty.position_count(), 0);
        assert!(empty.as_dictionary().is_none());

        let single = DictionaryBlock::create(1, dictionary.clone(), vec![3u32]).unwrap();
        assert!(single.as_dictionary().is_none());
        assert_eq!(single.get_slice(0).unwrap(), b"delta");

        let inner = DictionaryBlock::create(3, dictionary.clone(), vec![3u32, 0, 1]).unwrap();
        let outer = DictionaryBlock::create(2, inner, vec![2u32, 0]).unwrap();
        let flattened = outer.as_dictionary().unwrap();
        assert!(flattened.dictionary().ptr_eq(&dictionary));
        assert_eq!(&**flattened.ids(), &[1, 3]);

        let rle = RunLengthBlock::create(dictionary.get_single_value_block(1).unwrap(), 5).unwrap();
        let over_rle = DictionaryBlock::create(3, rle, vec![0u32, 4, 2]).unwrap();
        assert!(over_rle.as_rle().is_some());
        assert_eq!(over_rle.get_slice(2).unwrap(), b"beta");
    }

    #[test]
    fn test_region_shares_dictionary_and_id() {
        let block = DictionaryBlock::create(4, words(), vec![3u32, 3, 0, 2]).unwrap();
        let region = block.get_region(1, 2).unwrap();
        let original = block.as_dictionary().unwrap();
        let sliced = region.as_dictionary().unwrap();
        assert!(sliced.dictionary().ptr_eq(original.dictionary()));
        assert_eq!(sliced.dictionary_id(), original.dictionary_id());
        assert_eq!(sliced.ids().part_id(), original.ids().part_id());
    }

    #[test]
    fn test_size_counts_used_entries() {
        let dictionary = words();
        let block = DictionaryBlock::create(3, dictionary.clone(), vec![0u32, 0, 3]).unwrap();
        // "alpha" + "delta", two offsets and two null flags, three ids.
        assert_eq!(block.size_in_bytes(), 10 + 2 * 4 + 2 + 3 * 4);
        let copy = block.copy_region(0, 3).unwrap();
        assert_eq!(copy.size_in_bytes(), block.size_in_bytes());
        assert_eq!(copy.as_dictionary().unwrap().dictionary().position_count(), 2);
    }

    #[test]
    fn test_compact() {
        let block = DictionaryBlock::create(3, words(), vec![3u32, 1, 3]).unwrap();
        let dictionary = block.as_dictionary().unwrap();
        assert!(!dictionary.is_compact());
        let compact = dictionary.compact();
        assert_eq!(compact.unique_ids(), 2);
        assert_eq!(&**compact.ids(), &[1, 0, 1]);
        assert_ne!(compact.dictionary_id(), dictionary.dictionary_id());
        let compact: Block = compact.into();
        assert!(compact.is_compact());
        assert!(compact.copy_region(0, 3).unwrap().ptr_eq(&compact));
        assert_eq!(compact.get_slice(0).unwrap(), b"delta");
    }

    #[test]
    fn test_compact_related() {
        let dictionary = words();
        let a = DictionaryBlock::try_new(dictionary.clone(), vec![0u32, 3]).unwrap();
        let b = DictionaryBlock::try_new(dictionary.clone(), vec![3u32, 3]).unwrap();
        let compacted = DictionaryBlock::compact_related(&[a, b]).unwrap();
        assert!(compacted[0].dictionary().ptr_eq(compacted[1].dictionary()));
        assert_eq!(compacted[0].dictionary_id(), compacted[1].dictionary_id());
        assert_eq!(compacted[0].dictionary().position_count(), 2);
        assert_eq!(&**compacted[1].ids(), &[1, 1]);

        let other = DictionaryBlock::try_new(words(), vec![0u32]).unwrap();
        let c = DictionaryBlock::try_new(dictionary, vec![0u32]).unwrap();
        assert!(DictionaryBlock::compact_related(&[c, other]).is_err());
    }

    #[test]
    fn test_appended_null_reuses_dictionary_null() {
        let block = DictionaryBlock::create(2, words(), vec![0u32, 1]).unwrap();
        let extended = block.copy_with_appended_null();
        let dictionary = extended.as_dictionary().unwrap();
        assert_eq!(dictionary.dictionary().position_count(), 4);
        assert_eq!(dictionary.id(2), 2);
        assert!(extended.is_null(2).unwrap());

        let longs: Block = FixedWidthBlock::from_longs(&[1, 2], None).unwrap().into();
        let block = DictionaryBlock::create(2, longs, vec![1u32, 1]).unwrap();
        let extended = block.copy_with_appended_null();
        let dictionary = extended.as_dictionary().unwrap();
        assert_eq!(dictionary.dictionary().position_count(), 3);
        assert!(extended.is_null(2).unwrap());
        assert_eq!(extended.get_long(1, 0).unwrap(), 2);
    }

    #[test]
    fn test_shared_dictionary_parts() {
        let dictionary = words();
        let a: Block = DictionaryBlock::try_new(dictionary.clone(), vec![0u32, 3]).unwrap().into();
        let b: Block = DictionaryBlock::try_new(dictionary.clone(), vec![1u32]).unwrap().into();
        let mut parts = std::collections::HashMap::new();
        a.for_each_retained_part(&mut |id, bytes| {
            parts.insert(id, bytes);
        });
        b.for_each_retained_part(&mut |id, bytes| {
            parts.insert(id, bytes);
        });
        let deduplicated: usize = parts.values().sum();
        assert_eq!(
            deduplicated,
            a.retained_size_in_bytes() + b.retained_size_in_bytes() - dictionary.retained_size_in_bytes()
        );
    }
}
