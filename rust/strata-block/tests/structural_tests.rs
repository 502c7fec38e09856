use fastrand::Rng;
use strata_block::{Block, BlockBuilder, BlockKind, EntryBuilder, RowBlock, Type, Value};
use strata_common::{ErrorCategory, ErrorKind};
use strata_testkit::assertions::{
    assert_block_equals, assert_compaction, assert_retained_size, assert_round_trip, assert_size_accounting,
    block_values, create_block,
};
use strata_testkit::data_gen::random_values;

fn long_array_block(element_counts: &[usize]) -> Block {
    let mut builder = Type::array(Type::BigInt).create_block_builder(element_counts.len());
    let mut next = 0i64;
    for &count in element_counts {
        builder
            .build_entry(|entry| {
                let EntryBuilder::Array(elements) = entry else {
                    panic!("expected an array entry");
                };
                for _ in 0..count {
                    elements.write_long(next)?;
                    next += 1;
                }
                Ok(())
            })
            .unwrap();
    }
    builder.build().unwrap()
}

fn array_lengths(block: &Block) -> Vec<usize> {
    (0..block.position_count())
        .map(|p| block.get_array(p).unwrap().position_count())
        .collect()
}

#[test]
fn test_array_selection_and_compaction() {
    let block = long_array_block(&[16, 0, 13, 1, 2, 11, 4, 7]);
    assert_eq!(array_lengths(&block), vec![16, 0, 13, 1, 2, 11, 4, 7]);

    let selected = block.copy_positions(&[0, 1, 3, 4, 7], 0, 5).unwrap();
    assert_eq!(array_lengths(&selected), vec![16, 0, 1, 2, 7]);
    assert!(selected.is_compact());
    let BlockKind::Array(array) = selected.kind() else {
        panic!("expected an array block");
    };
    assert_eq!(array.raw_values().position_count(), 26);
    assert_eq!(array.offsets().as_slice(), &[0, 16, 16, 17, 19, 26]);

    // First element of the last selected array is element 16 + 13 + 1 + 2 + 11 + 4.
    assert_eq!(selected.get_array(4).unwrap().get_long(0, 0).unwrap(), 47);
    assert_eq!(
        block.positions_size_in_bytes(&[true, true, false, true, true, false, false, true], 5).unwrap(),
        selected.size_in_bytes()
    );

    let region = block.get_region(2, 4).unwrap();
    assert_eq!(array_lengths(&region), vec![13, 1, 2, 11]);
    let compacted = region.copy_region(0, 4).unwrap();
    assert!(compacted.is_compact());
    assert_eq!(array_lengths(&compacted), vec![13, 1, 2, 11]);
    assert_eq!(compacted.get_array(0).unwrap().get_long(0, 0).unwrap(), 16);
}

fn varchar_to_varchar_map() -> BlockBuilder {
    BlockBuilder::map(
        Type::Varchar,
        Type::Varchar.create_block_builder(4),
        Type::Varchar.create_block_builder(4),
        4,
    )
}

fn write_entries(builder: &mut BlockBuilder, entries: &[(Option<&str>, Option<&str>)]) -> strata_common::Result<()> {
    builder.build_entry(|entry| {
        let EntryBuilder::Map { keys, values } = entry else {
            panic!("expected a map entry");
        };
        for (key, value) in entries {
            match key {
                Some(key) => {
                    keys.write_bytes(key.as_bytes())?;
                    keys.close_entry()?;
                }
                None => keys.append_null()?,
            }
            match value {
                Some(value) => {
                    values.write_bytes(value.as_bytes())?;
                    values.close_entry()?;
                }
                None => values.append_null()?,
            }
        }
        Ok(())
    })
}

#[test]
fn test_map_null_key_rejected_and_builder_reusable() {
    let mut builder = varchar_to_varchar_map();
    write_entries(&mut builder, &[(Some("k1"), Some("v1")), (Some("k2"), None)]).unwrap();

    let err = write_entries(&mut builder, &[(Some("k3"), Some("v3")), (None, Some("v4"))]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::User);
    assert!(matches!(err.kind(), ErrorKind::InvalidFunctionArgument { .. }));
    assert_eq!(builder.position_count(), 1);
    assert!(!builder.has_open_entry());

    write_entries(&mut builder, &[(Some("k5"), Some("v5"))]).unwrap();
    builder.append_null().unwrap();
    let block = builder.build().unwrap();

    let ty = Type::map(Type::Varchar, Type::Varchar);
    assert_block_equals(
        &ty,
        &block,
        &[
            Value::Map(vec![
                (Value::text("k1"), Value::text("v1")),
                (Value::text("k2"), Value::Null),
            ]),
            Value::Map(vec![(Value::text("k5"), Value::text("v5"))]),
            Value::Null,
        ],
    );
    let map = block.get_map(0).unwrap();
    assert_eq!(map.cardinality(), 2);
    assert_eq!(map.position_count(), 4);
    assert_eq!(map.seek_key(&Type::Varchar, &Value::text("k2")).unwrap(), Some(1));
    assert_eq!(map.seek_key(&Type::Varchar, &Value::text("k3")).unwrap(), None);
    assert!(map.seek_key(&Type::Varchar, &Value::Null).is_err());
    let (keys, index) = map.interleaved(2).unwrap();
    assert_eq!(keys.get_slice(index).unwrap(), b"k2");
    assert!(map.interleaved(3).unwrap().0.is_null(1).unwrap());
}

#[test]
fn test_map_duplicate_key_rejected() {
    let mut builder = varchar_to_varchar_map();
    let err = write_entries(&mut builder, &[(Some("a"), Some("1")), (Some("a"), Some("2"))]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::User);
    assert_eq!(builder.position_count(), 0);
    write_entries(&mut builder, &[(Some("a"), Some("1")), (Some("b"), Some("2"))]).unwrap();
    assert_eq!(builder.build().unwrap().position_count(), 1);
}

#[test]
fn test_row_fields_and_nulls() {
    let mut builder = Type::row(vec![Type::BigInt, Type::Varchar]).create_block_builder(3);
    for (id, name) in [(1, Some("one")), (2, None)] {
        builder
            .build_entry(|entry| {
                let EntryBuilder::Row(fields) = entry else {
                    panic!("expected a row entry");
                };
                fields[0].write_long(id)?;
                match name {
                    Some(name) => {
                        fields[1].write_bytes(name.as_bytes())?;
                        fields[1].close_entry()
                    }
                    None => fields[1].append_null(),
                }
            })
            .unwrap();
    }
    builder.append_null().unwrap();

    // A row entry must write every field exactly once.
    let err = builder
        .build_entry(|entry| {
            let EntryBuilder::Row(fields) = entry else {
                panic!("expected a row entry");
            };
            fields[0].write_long(3)
        })
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Internal);
    assert_eq!(builder.position_count(), 3);

    let block = builder.build().unwrap();
    assert!(block.is_null(2).unwrap());
    let row = block.get_row(1).unwrap();
    assert_eq!(row.field_count(), 2);
    assert_eq!(row.field_block(0).unwrap().get_long(row.raw_index(), 0).unwrap(), 2);
    assert!(row.is_field_null(1).unwrap());
    assert!(row.field_block(2).is_err());
    assert!(block.get_array(0).is_err());
}

#[test]
fn test_row_block_construction_validated() {
    let ids: Block = strata_block::FixedWidthBlock::from_longs(&[1, 2], None).unwrap().into();
    assert!(RowBlock::from_field_blocks(3, None, vec![ids.clone()]).is_err());
    assert!(RowBlock::from_field_blocks(2, None, vec![]).is_err());
    assert!(RowBlock::from_field_blocks(2, Some(vec![true]), vec![ids.clone()]).is_err());
    let block = RowBlock::from_field_blocks(2, Some(vec![false, true]), vec![ids]).unwrap();
    assert_eq!(block.children().len(), 1);
}

#[test]
fn test_random_nested_blocks() {
    let mut rng = Rng::with_seed(3003);
    let types = [
        Type::array(Type::Varchar),
        Type::array(Type::array(Type::SmallInt)),
        Type::map(Type::BigInt, Type::Varchar),
        Type::map(Type::Varchar, Type::array(Type::Double)),
        Type::row(vec![Type::Integer, Type::Varchar, Type::array(Type::BigInt)]),
        Type::array(Type::row(vec![Type::Boolean, Type::map(Type::Integer, Type::Integer)])),
    ];
    for ty in &types {
        let values = random_values(ty, 30, 0.2, &mut rng);
        let block = create_block(ty, &values).unwrap();
        assert_block_equals(ty, &block, &values);
        assert_size_accounting(&block, 4, &mut rng);
        assert_compaction(ty, &block);
        assert_retained_size(&block);
        assert_round_trip(ty, &block);

        let region = block.get_region(7, 15).unwrap();
        assert_block_equals(ty, &region, &values[7..22]);
        assert_compaction(ty, &region);
        assert_round_trip(ty, &region);

        let positions = [29u32, 0, 7, 7, 15];
        let copy = block.copy_positions(&positions, 0, positions.len()).unwrap();
        let expected = positions.iter().map(|&p| values[p as usize].clone()).collect::<Vec<_>>();
        assert_block_equals(ty, &copy, &expected);
    }
}

#[test]
fn test_nested_append_from_blocks() {
    let ty = Type::array(Type::Varchar);
    let mut rng = Rng::with_seed(3004);
    let values = random_values(&ty, 12, 0.25, &mut rng);
    let source = create_block(&ty, &values).unwrap();

    let mut builder = ty.create_block_builder(4);
    builder.append_range(&source, 2, 5).unwrap();
    builder.append_positions(&source, &[11, 0]).unwrap();
    builder.append_repeated(&source, 3, 2).unwrap();
    let block = builder.build().unwrap();

    let mut expected = values[2..7].to_vec();
    expected.push(values[11].clone());
    expected.push(values[0].clone());
    expected.push(values[3].clone());
    expected.push(values[3].clone());
    assert_eq!(block_values(&ty, &block), expected);
}

#[test]
fn test_entry_protocol_misuse() {
    let mut builder = Type::array(Type::BigInt).create_block_builder(2);
    assert!(builder.close_entry().is_err());
    let EntryBuilder::Array(elements) = builder.begin_block_entry().unwrap() else {
        panic!("expected an array entry");
    };
    elements.write_long(1).unwrap();
    assert!(builder.has_open_entry());
    assert!(builder.append_null().is_err());
    assert!(builder.begin_block_entry().is_err());
    assert!(builder.build().is_err());
    builder.close_entry().unwrap();
    assert_eq!(builder.build().unwrap().position_count(), 1);

    assert!(BlockBuilder::fixed_width(4, 1).begin_block_entry().is_err());
}
