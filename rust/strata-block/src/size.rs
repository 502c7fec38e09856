//! Size constants shared by the block size-accounting protocol.
//!
//! `size_in_bytes` figures are logical: they count exactly the bytes a compact
//! copy of the addressed positions would need. Retained figures count real
//! allocations, including spare capacity and shared backing storage.

/// Bytes accounted per position for an offsets entry (`u32`).
pub const SIZE_OF_OFFSET: usize = std::mem::size_of::<u32>();

/// Bytes accounted per position for a null flag.
pub const SIZE_OF_NULL_FLAG: usize = std::mem::size_of::<bool>();

/// Bytes accounted per position for a dictionary id (`u32`).
pub const SIZE_OF_ID: usize = std::mem::size_of::<u32>();

/// Fixed per-instance overhead of a value of type `T`.
#[inline]
pub fn instance_size<T>() -> usize {
    std::mem::size_of::<T>()
}

/// Bytes accounted for the null flags of `count` positions, when a mask exists.
#[inline]
pub fn null_mask_size(has_mask: bool, count: usize) -> usize {
    if has_mask { count * SIZE_OF_NULL_FLAG } else { 0 }
}
