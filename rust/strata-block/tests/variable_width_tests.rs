use std::cmp::Ordering;

use fastrand::Rng;
use strata_block::{Block, BlockBuilder, Type, Value, VariableWidthBlock};
use strata_testkit::assertions::{
    assert_block_equals, assert_compaction, assert_retained_size, assert_round_trip, assert_size_accounting,
    create_block, retained_size_from_parts,
};
use strata_testkit::data_gen::random_values;

fn words(values: &[Option<&str>]) -> Block {
    VariableWidthBlock::from_slices(values.iter().map(|v| v.map(str::as_bytes))).unwrap().into()
}

#[test]
fn test_entry_protocol() {
    let mut builder = BlockBuilder::variable_width(4, 16);
    builder.write_bytes(b"hel").unwrap();
    builder.write_bytes(b"lo").unwrap();
    assert!(builder.has_open_entry());
    assert_eq!(builder.position_count(), 0);
    assert!(builder.append_null().is_err());
    assert!(builder.build().is_err());
    builder.close_entry().unwrap();
    builder.append_null().unwrap();
    builder.close_entry().unwrap();
    assert_eq!(builder.position_count(), 3);

    let block = builder.build().unwrap();
    assert_block_equals(
        &Type::Varchar,
        &block,
        &[Value::text("hello"), Value::Null, Value::text("")],
    );
    // three offsets, five payload bytes, three null flags
    assert_eq!(block.size_in_bytes(), 3 * 4 + 5 + 3);
    assert!(BlockBuilder::fixed_width(8, 1).write_bytes(b"x").is_err());
}

#[test]
fn test_byte_accessors() {
    let block = words(&[Some("apple"), None, Some("banana")]);
    assert_eq!(block.get_slice(2).unwrap(), b"banana");
    assert_eq!(block.slice_length(0).unwrap(), 5);
    assert!(block.bytes_equal(2, 1, b"anan").unwrap());
    assert!(!block.bytes_equal(0, 0, b"apply").unwrap());
    assert!(block.bytes_equal(0, 3, b"les").is_err());
    assert_eq!(block.bytes_compare(0, 0, 3, b"apq").unwrap(), Ordering::Less);
    assert_eq!(block.bytes_compare(2, 2, 4, b"nana").unwrap(), Ordering::Equal);
    assert!(block.get_long(0, 0).is_err());

    let mut target = Type::Varchar.create_block_builder(2);
    block.write_bytes_to(2, 1, 3, &mut target).unwrap();
    block.write_bytes_to(0, 0, 0, &mut target).unwrap();
    let copied = target.build().unwrap();
    assert_block_equals(&Type::Varchar, &copied, &[Value::text("ana"), Value::text("")]);

    assert_eq!(block.estimated_data_size_for_stats(0).unwrap(), 5);
    assert_eq!(block.estimated_data_size_for_stats(1).unwrap(), 0);
}

#[test]
fn test_random_blocks() {
    let mut rng = Rng::with_seed(2002);
    for ty in [Type::Varchar, Type::Varbinary] {
        for null_rate in [0.0, 0.2] {
            let values = random_values(&ty, 50, null_rate, &mut rng);
            let block = create_block(&ty, &values).unwrap();
            assert_block_equals(&ty, &block, &values);
            assert_size_accounting(&block, 6, &mut rng);
            assert_compaction(&ty, &block);
            assert_retained_size(&block);
            assert_round_trip(&ty, &block);

            let region = block.get_region(10, 30).unwrap();
            assert_block_equals(&ty, &region, &values[10..40]);
            assert_size_accounting(&region, 3, &mut rng);
            assert_round_trip(&ty, &region);
        }
    }
}

#[test]
fn test_region_shares_storage() {
    let block = words(&[Some("aaaa"), Some("bbbb"), Some("cccc"), Some("dddd")]);
    let region = block.get_region(1, 2).unwrap();
    assert_eq!(region.size_in_bytes(), 2 * 4 + 8);
    // The view retains the whole backing buffers of its origin.
    assert!(region.retained_size_in_bytes() >= block.retained_size_in_bytes());
    assert_eq!(region.retained_size_in_bytes(), retained_size_from_parts(&region));

    let copy = block.copy_region(1, 2).unwrap();
    assert!(copy.is_compact());
    assert!(copy.retained_size_in_bytes() < block.retained_size_in_bytes());
    assert_eq!(copy.get_slice(0).unwrap(), b"bbbb");
}

#[test]
fn test_copy_positions_and_appended_null() {
    let block = words(&[Some("x"), Some("yy"), None, Some("zzz")]);
    let copy = block.copy_positions(&[3, 3, 0, 2], 0, 4).unwrap();
    assert_block_equals(
        &Type::Varchar,
        &copy,
        &[Value::text("zzz"), Value::text("zzz"), Value::text("x"), Value::Null],
    );
    assert!(block.copy_positions(&[4], 0, 1).is_err());
    assert!(block.copy_positions(&[0, 1], 1, 2).is_err());

    let extended = block.get_region(0, 2).unwrap().copy_with_appended_null();
    assert_block_equals(
        &Type::Varchar,
        &extended,
        &[Value::text("x"), Value::text("yy"), Value::Null],
    );
}

#[test]
fn test_builder_reads_before_build() {
    let mut builder = Type::Varchar.create_block_builder(4);
    for word in ["one", "two", "three"] {
        builder.write_bytes(word.as_bytes()).unwrap();
        builder.close_entry().unwrap();
    }
    builder.append_null().unwrap();
    assert!(builder.is_null(3).unwrap());
    assert_eq!(
        builder.region_size_in_bytes(1, 2).unwrap(),
        builder.copy_region(1, 2).unwrap().size_in_bytes()
    );
    let selected = [true, false, true, true];
    assert_eq!(
        builder.positions_size_in_bytes(&selected, 3).unwrap(),
        builder.copy_positions(&[0, 2, 3], 0, 3).unwrap().size_in_bytes()
    );
    let single = builder.get_single_value_block(2).unwrap();
    assert_eq!(single.get_slice(0).unwrap(), b"three");
    assert!(builder.retained_size_in_bytes() > 0);
    assert_eq!(builder.build().unwrap().position_count(), 4);
}
