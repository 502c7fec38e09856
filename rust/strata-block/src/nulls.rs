//! Null masks for blocks and builders.
//!
//! A block's null mask is optional: `None` means the block is statically known
//! to contain no nulls. When present, the mask view has exactly one flag per
//! position (`true` - the value is null).

use strata_common::{Result, verify_arg};

use crate::buffer::{PartId, SharedBuffer, exact_vec};

/// Optional per-position null flags of a block.
pub type NullMask = Option<SharedBuffer<bool>>;

/// Builds a mask from caller-supplied flags, validating its length.
pub(crate) fn mask_from_vec(nulls: Option<Vec<bool>>, position_count: usize) -> Result<NullMask> {
    match nulls {
        Some(nulls) => {
            verify_arg!(nulls, nulls.len() == position_count);
            Ok(Some(SharedBuffer::from_vec(nulls)))
        }
        None => Ok(None),
    }
}

#[inline]
pub(crate) fn is_null(mask: &NullMask, position: usize) -> bool {
    match mask {
        Some(flags) => flags[position],
        None => false,
    }
}

/// Zero-copy view of the flags of `[start, start + len)`.
pub(crate) fn region(mask: &NullMask, start: usize, len: usize) -> NullMask {
    mask.as_ref().map(|flags| flags.slice(start..start + len))
}

/// Compact copy of the flags of `[start, start + len)`; reuses the mask when
/// it is already compact and fully covered.
pub(crate) fn compact_region(mask: &NullMask, start: usize, len: usize) -> NullMask {
    mask.as_ref().map(|flags| flags.compact_range(start..start + len))
}

pub(crate) fn copy_positions(mask: &NullMask, positions: &[u32]) -> NullMask {
    mask.as_ref().map(|flags| flags.copy_positions(positions))
}

/// Mask of `position_count + 1` flags with a trailing null.
pub(crate) fn with_appended_null(mask: &NullMask, position_count: usize) -> SharedBuffer<bool> {
    match mask {
        Some(flags) => flags.with_appended(true),
        None => {
            let mut flags = vec![false; position_count + 1];
            flags[position_count] = true;
            SharedBuffer::from_vec(flags)
        }
    }
}

/// Mask for a single position.
pub(crate) fn single(is_null: bool) -> NullMask {
    is_null.then(|| SharedBuffer::from_vec(vec![true]))
}

#[inline]
pub(crate) fn is_compact(mask: &NullMask) -> bool {
    mask.as_ref().is_none_or(|flags| flags.is_compact())
}

#[inline]
pub(crate) fn retained_size(mask: &NullMask) -> usize {
    mask.as_ref().map_or(0, |flags| flags.retained_size_in_bytes())
}

pub(crate) fn report_part(mask: &NullMask, consumer: &mut dyn FnMut(PartId, usize)) {
    if let Some(flags) = mask {
        consumer(flags.part_id(), flags.retained_size_in_bytes());
    }
}

/// Accumulates null flags for a builder.
///
/// Flags are recorded for every position; the mask is handed to the built
/// block only when at least one null was appended.
#[derive(Debug, Default)]
pub(crate) struct NullsBuilder {
    flags: Vec<bool>,
    null_count: usize,
}

impl NullsBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        NullsBuilder {
            flags: Vec::with_capacity(capacity),
            null_count: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, is_null: bool) {
        self.flags.push(is_null);
        self.null_count += usize::from(is_null);
    }

    pub fn push_n(&mut self, is_null: bool, count: usize) {
        self.flags.resize(self.flags.len() + count, is_null);
        if is_null {
            self.null_count += count;
        }
    }

    #[inline]
    pub fn is_null(&self, position: usize) -> bool {
        self.flags[position]
    }

    #[inline]
    pub fn has_null(&self) -> bool {
        self.null_count > 0
    }

    #[inline]
    pub fn has_non_null(&self) -> bool {
        self.null_count < self.flags.len()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    pub fn reserve(&mut self, additional: usize) {
        self.flags.reserve(additional);
    }

    /// Drops the flags past `len`. Only the dropped tail is scanned.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.flags.len() {
            return;
        }
        self.null_count -= self.flags[len..].iter().filter(|&&f| f).count();
        self.flags.truncate(len);
    }

    /// Clears the flags, keeping the allocation.
    pub fn clear(&mut self) {
        self.flags.clear();
        self.null_count = 0;
    }

    pub fn retained_size_in_bytes(&self) -> usize {
        self.flags.capacity() * std::mem::size_of::<bool>()
    }

    /// Moves the flags out, returning a mask only when a null was recorded.
    pub fn take_mask(&mut self) -> NullMask {
        let flags = std::mem::take(&mut self.flags);
        let has_null = self.has_null();
        self.null_count = 0;
        has_null.then(|| SharedBuffer::from_vec(flags))
    }

    /// Compact copy of the flags of `[start, start + len)`, present only when
    /// a null was recorded.
    pub fn copy_region(&self, start: usize, len: usize) -> NullMask {
        self.has_null()
            .then(|| SharedBuffer::copy_from_slice(&self.flags[start..start + len]))
    }

    /// Flags of the listed positions, present only when a null was recorded.
    pub fn copy_positions(&self, positions: &[u32]) -> NullMask {
        self.has_null().then(|| {
            SharedBuffer::from_vec(exact_vec(
                positions.iter().map(|&p| self.flags[p as usize]),
                positions.len(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_length_is_validated() {
        assert!(mask_from_vec(Some(vec![true, false]), 2).is_ok());
        assert!(mask_from_vec(Some(vec![true]), 2).is_err());
        assert!(mask_from_vec(None, 2).unwrap().is_none());
    }

    #[test]
    fn test_appended_null() {
        let mask = with_appended_null(&None, 3);
        assert_eq!(&*mask, &[false, false, false, true]);
        let mask = with_appended_null(&Some(mask), 4);
        assert_eq!(&*mask, &[false, false, false, true, true]);
    }

    #[test]
    fn test_builder_drops_mask_without_nulls() {
        let mut builder = NullsBuilder::with_capacity(4);
        builder.push(false);
        builder.push(false);
        assert!(builder.take_mask().is_none());

        builder.push(false);
        builder.push(true);
        let mask = builder.take_mask().unwrap();
        assert_eq!(&*mask, &[false, true]);
        assert_eq!(builder.len(), 0);
    }

    #[test]
    fn test_builder_truncate_recomputes_markers() {
        let mut builder = NullsBuilder::default();
        builder.push(false);
        builder.push(true);
        assert!(builder.has_null());
        builder.truncate(1);
        assert!(!builder.has_null());
        assert!(builder.has_non_null());
    }

    #[test]
    fn test_builder_truncate_keeps_earlier_nulls() {
        let mut builder = NullsBuilder::default();
        builder.push(true);
        builder.push_n(false, 3);
        builder.push_n(true, 2);
        builder.truncate(7);
        assert_eq!(builder.len(), 6);

        builder.truncate(4);
        assert!(builder.has_null());
        assert!(builder.has_non_null());
        builder.truncate(1);
        assert!(builder.has_null());
        assert!(!builder.has_non_null());
        builder.push(false);
        assert!(builder.has_non_null());

        builder.truncate(0);
        assert!(!builder.has_null());
        assert!(!builder.has_non_null());
        builder.push_n(true, 0);
        assert!(builder.take_mask().is_none());
    }
}
