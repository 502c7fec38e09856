//! Assertion oracles over blocks.
//!
//! The helpers panic with a descriptive message on the first violated
//! property, which makes them usable directly from `#[test]` functions.

use fastrand::Rng;
use strata_block::encoding::BlockEncodingSerde;
use strata_block::{Block, Type, Value};
use strata_common::Result;

/// Builds a block of type `ty` holding `values`, through the type's builder.
pub fn create_block(ty: &Type, values: &[Value]) -> Result<Block> {
    let mut builder = ty.create_block_builder(values.len());
    for value in values {
        ty.write_native_value(&mut builder, value)?;
    }
    builder.build()
}

/// Reads every position of `block` as a native value.
pub fn block_values(ty: &Type, block: &Block) -> Vec<Value> {
    (0..block.position_count())
        .map(|position| {
            ty.read_native_value(block, position)
                .unwrap_or_else(|e| panic!("reading position {position}: {e}"))
        })
        .collect()
}

/// Asserts that `block` holds exactly `expected`, position by position, and
/// that its single-value blocks agree.
pub fn assert_block_equals(ty: &Type, block: &Block, expected: &[Value]) {
    assert_eq!(block.position_count(), expected.len(), "position count of {block:?}");
    for (position, value) in expected.iter().enumerate() {
        let is_null = block.is_null(position).unwrap();
        assert_eq!(is_null, value.is_null(), "null flag at position {position}");
        let actual = ty.read_native_value(block, position).unwrap();
        assert_eq!(&actual, value, "value at position {position}");
    }
    if let Some(last) = expected.len().checked_sub(1) {
        for position in [0, last] {
            let single = block.get_single_value_block(position).unwrap();
            assert_eq!(single.position_count(), 1);
            assert_eq!(
                &ty.read_native_value(&single, 0).unwrap(),
                &expected[position],
                "single value block of position {position}"
            );
        }
    }
    if !block.may_have_null() {
        assert!(expected.iter().all(|v| !v.is_null()), "block without nulls holds a null");
    }
}

/// Asserts that two blocks of type `ty` hold equal values.
pub fn assert_blocks_equal(ty: &Type, left: &Block, right: &Block) {
    assert_block_equals(ty, right, &block_values(ty, left));
}

/// Asserts that region and position-subset sizes equal the sizes of the
/// corresponding compact copies, for a grid of regions and `subsets` random
/// position subsets.
pub fn assert_size_accounting(block: &Block, subsets: usize, rng: &mut Rng) {
    let count = block.position_count();
    assert_eq!(block.size_in_bytes(), block.region_size_in_bytes(0, count).unwrap());
    let step = (count / 8).max(1);
    for start in (0..=count).step_by(step) {
        for len in (0..=count - start).step_by(step) {
            let expected = block.region_size_in_bytes(start, len).unwrap();
            let copy = block.copy_region(start, len).unwrap();
            assert_eq!(copy.size_in_bytes(), expected, "copy of region ({start}, {len})");
            let region = block.get_region(start, len).unwrap();
            assert_eq!(region.size_in_bytes(), expected, "view of region ({start}, {len})");
        }
    }
    for _ in 0..subsets {
        let selected = (0..count).map(|_| rng.bool()).collect::<Vec<_>>();
        let positions = selected
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(p, _)| p as u32)
            .collect::<Vec<_>>();
        let expected = block.positions_size_in_bytes(&selected, positions.len()).unwrap();
        let copy = block.copy_positions(&positions, 0, positions.len()).unwrap();
        assert_eq!(copy.size_in_bytes(), expected, "copy of positions {positions:?}");
    }
}

/// Asserts that a full copy of `block` is compact, holds the same values,
/// and is returned unchanged when copied again. A block that is already
/// compact must be its own copy.
pub fn assert_compaction(ty: &Type, block: &Block) {
    let count = block.position_count();
    let copy = block.copy_region(0, count).unwrap();
    assert!(copy.is_compact(), "copy of {block:?} is not compact");
    assert_blocks_equal(ty, block, &copy);
    assert!(copy.copy_region(0, count).unwrap().ptr_eq(&copy));
    if block.is_compact() {
        assert!(copy.ptr_eq(block), "compact {block:?} was copied");
    }
}

/// Sum of the retained parts reported by `block`.
pub fn retained_size_from_parts(block: &Block) -> usize {
    let mut size = 0;
    block.for_each_retained_part(&mut |_, bytes| size += bytes);
    size
}

/// Asserts that the retained size of `block` is the sum of its reported
/// parts, and covers at least the logical size.
pub fn assert_retained_size(block: &Block) {
    let retained = block.retained_size_in_bytes();
    assert_eq!(retained, retained_size_from_parts(block), "retained parts of {block:?}");
    assert!(retained >= block.size_in_bytes(), "retained size below logical size of {block:?}");
}

/// Encodes and decodes `block` with the default encodings, asserts that the
/// result holds the same values, and returns it.
pub fn assert_round_trip(ty: &Type, block: &Block) -> Block {
    let serde = BlockEncodingSerde::default();
    let bytes = serde.encode_block(block).unwrap();
    let decoded = serde.decode_block(&bytes).unwrap();
    assert_blocks_equal(ty, block, &decoded);
    decoded
}
