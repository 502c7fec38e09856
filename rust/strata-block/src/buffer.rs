//! Shared storage behind block arrays.
//!
//! [`SharedBuffer`] backs every array owned by a block. Region views of a block
//! share the backing allocation with the block they were cut from, so the
//! buffer keeps track of both the logical view (`offset`, `len`) and the full
//! allocation, which is what retained-size accounting has to report.

use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

/// Identity of a retained memory part.
///
/// Two parts with the same id refer to the same allocation. Consumers that
/// aggregate retained sizes across several blocks use it to avoid counting a
/// shared allocation more than once.
pub type PartId = usize;

/// A view `[offset, offset + len)` over a shared vector. Slicing and cloning
/// never copy elements.
pub struct SharedBuffer<T> {
    inner: Arc<Vec<T>>,
    offset: usize,
    len: usize,
}

impl<T> SharedBuffer<T> {
    /// Creates a buffer viewing the whole vector. The vector's spare capacity is
    /// retained and reported by [`retained_size_in_bytes`](Self::retained_size_in_bytes).
    pub fn from_vec(vec: Vec<T>) -> Self {
        let len = vec.len();
        SharedBuffer {
            inner: Arc::new(vec),
            offset: 0,
            len,
        }
    }

    /// Returns an empty buffer.
    pub fn empty() -> Self {
        SharedBuffer::from_vec(Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.inner[self.offset..self.offset + self.len]
    }

    /// Returns a reference to the element at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds of the view.
    #[inline]
    pub fn at(&self, index: usize) -> &T {
        assert!(index < self.len, "index {index} out of bounds {}", self.len);
        &self.inner[self.offset + index]
    }

    /// Returns a zero-copy view of a sub-range of this buffer.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "slice {range:?} out of bounds {}",
            self.len
        );
        SharedBuffer {
            inner: self.inner.clone(),
            offset: self.offset + range.start,
            len: range.end - range.start,
        }
    }

    /// Returns `true` if the view covers the entire allocation and the
    /// allocation carries no spare capacity.
    #[inline]
    pub fn is_compact(&self) -> bool {
        self.offset == 0 && self.len == self.inner.len() && self.inner.capacity() == self.len
    }

    /// Bytes held by the backing allocation, including spare capacity and the
    /// elements outside of this view.
    #[inline]
    pub fn retained_size_in_bytes(&self) -> usize {
        self.inner.capacity() * std::mem::size_of::<T>()
    }

    /// Identity of the backing allocation.
    #[inline]
    pub fn part_id(&self) -> PartId {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Returns `true` if both buffers view the same range of the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) && self.offset == other.offset && self.len == other.len
    }
}

impl<T: Clone> SharedBuffer<T> {
    /// Creates a compact buffer holding a copy of the slice.
    pub fn copy_from_slice(slice: &[T]) -> Self {
        SharedBuffer::from_vec(exact_vec(slice.iter().cloned(), slice.len()))
    }

    /// Returns a compact buffer with the elements of `range`.
    ///
    /// When the range covers the whole view and the buffer is already compact,
    /// the buffer itself is returned (sharing the allocation).
    pub fn compact_range(&self, range: Range<usize>) -> Self {
        if range.start == 0 && range.end == self.len && self.is_compact() {
            return self.clone();
        }
        SharedBuffer::copy_from_slice(&self.as_slice()[range])
    }

    /// Returns a compact buffer with the elements at the given indices, in order.
    ///
    /// # Panics
    ///
    /// Panics if any of the indices is out of bounds.
    pub fn copy_positions(&self, positions: &[u32]) -> Self {
        let slice = self.as_slice();
        SharedBuffer::from_vec(exact_vec(
            positions.iter().map(|&p| slice[p as usize].clone()),
            positions.len(),
        ))
    }

    /// Returns a compact copy of this view extended with one more element.
    pub fn with_appended(&self, value: T) -> Self {
        let mut vec = Vec::with_capacity(self.len + 1);
        vec.extend_from_slice(self.as_slice());
        vec.push(value);
        SharedBuffer::from_vec(into_exact(vec))
    }
}

/// Collects `len` items into a vector whose capacity equals its length.
pub(crate) fn exact_vec<T>(items: impl Iterator<Item = T>, len: usize) -> Vec<T> {
    let mut vec = Vec::with_capacity(len);
    vec.extend(items);
    into_exact(vec)
}

/// Drops any spare capacity of the vector.
pub(crate) fn into_exact<T>(mut vec: Vec<T>) -> Vec<T> {
    vec.shrink_to_fit();
    vec
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        SharedBuffer {
            inner: self.inner.clone(),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<T> Deref for SharedBuffer<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> AsRef<[T]> for SharedBuffer<T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedBuffer").field(&self.as_slice()).finish()
    }
}

impl<T: PartialEq> PartialEq for SharedBuffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T> Default for SharedBuffer<T> {
    fn default() -> Self {
        SharedBuffer::empty()
    }
}

impl<T> From<Vec<T>> for SharedBuffer<T> {
    fn from(vec: Vec<T>) -> Self {
        SharedBuffer::from_vec(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_shares_allocation() {
        let buffer = SharedBuffer::from_vec(vec![1u32, 2, 3, 4, 5]);
        let sub = buffer.slice(1..4);
        assert_eq!(&*sub, &[2, 3, 4]);
        assert_eq!(sub.part_id(), buffer.part_id());
        assert_eq!(sub.retained_size_in_bytes(), buffer.retained_size_in_bytes());
        assert!(!sub.is_compact());
    }

    #[test]
    fn test_compact_range_identity() {
        let buffer = SharedBuffer::copy_from_slice(&[1u8, 2, 3]);
        assert!(buffer.is_compact());
        let same = buffer.compact_range(0..3);
        assert!(same.ptr_eq(&buffer));

        let copy = buffer.compact_range(1..3);
        assert!(!copy.ptr_eq(&buffer));
        assert!(copy.is_compact());
        assert_eq!(&*copy, &[2, 3]);
    }

    #[test]
    fn test_spare_capacity_is_not_compact() {
        let mut vec = Vec::with_capacity(16);
        vec.extend_from_slice(&[1u64, 2]);
        let buffer = SharedBuffer::from_vec(vec);
        assert!(!buffer.is_compact());
        assert_eq!(buffer.retained_size_in_bytes(), 16 * 8);

        let compact = buffer.compact_range(0..2);
        assert!(compact.is_compact());
        assert_eq!(compact.retained_size_in_bytes(), 2 * 8);
    }

    #[test]
    fn test_copy_positions_and_append() {
        let buffer = SharedBuffer::copy_from_slice(&[10i32, 20, 30, 40]);
        let picked = buffer.copy_positions(&[3, 0, 0]);
        assert_eq!(&*picked, &[40, 10, 10]);
        assert!(picked.is_compact());

        let appended = buffer.slice(1..2).with_appended(99);
        assert_eq!(&*appended, &[20, 99]);
        assert!(appended.is_compact());
    }
}
