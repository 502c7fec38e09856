//! Logical types and their operator bindings.
//!
//! A [`Type`] knows how its values are laid out in blocks ([`StorageClass`]),
//! how to read a value out of a block, how to write a value into a builder,
//! and how values compare, hash, and test for equality.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::{Error, Result};
use xxhash_rust::xxh3::Xxh3;

use crate::block::Block;
use crate::builder::{BlockBuilder, EntryBuilder};
use crate::value::Value;

/// Hash of a null value.
pub const NULL_HASH: u64 = 0;

/// A logical value domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    /// Days since the epoch.
    Date,
    Varchar,
    Varbinary,
    Array(Arc<Type>),
    Map(Arc<Type>, Arc<Type>),
    Row(Arc<[Type]>),
}

/// Physical representation of a type's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Values of `n` bytes packed at `position * n`.
    FixedWidth(usize),
    VariableWidth,
    Array,
    Map,
    Row,
}

impl Type {
    pub fn array(element: Type) -> Type {
        Type::Array(Arc::new(element))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Arc::new(key), Arc::new(value))
    }

    pub fn row(fields: impl Into<Vec<Type>>) -> Type {
        Type::Row(fields.into().into())
    }

    pub fn storage_class(&self) -> StorageClass {
        match self {
            Type::Boolean | Type::TinyInt => StorageClass::FixedWidth(1),
            Type::SmallInt => StorageClass::FixedWidth(2),
            Type::Integer | Type::Real | Type::Date => StorageClass::FixedWidth(4),
            Type::BigInt | Type::Double => StorageClass::FixedWidth(8),
            Type::Varchar | Type::Varbinary => StorageClass::VariableWidth,
            Type::Array(_) => StorageClass::Array,
            Type::Map(_, _) => StorageClass::Map,
            Type::Row(_) => StorageClass::Row,
        }
    }

    /// Value width in bytes for fixed-width types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self.storage_class() {
            StorageClass::FixedWidth(width) => Some(width),
            _ => None,
        }
    }

    /// Whether values of this type can be ordered.
    pub fn is_orderable(&self) -> bool {
        match self {
            Type::Map(_, _) => false,
            Type::Array(element) => element.is_orderable(),
            Type::Row(fields) => fields.iter().all(Type::is_orderable),
            _ => true,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Type::Boolean => "boolean".into(),
            Type::TinyInt => "tinyint".into(),
            Type::SmallInt => "smallint".into(),
            Type::Integer => "integer".into(),
            Type::BigInt => "bigint".into(),
            Type::Real => "real".into(),
            Type::Double => "double".into(),
            Type::Date => "date".into(),
            Type::Varchar => "varchar".into(),
            Type::Varbinary => "varbinary".into(),
            Type::Array(element) => format!("array({})", element.name()),
            Type::Map(key, value) => format!("map({}, {})", key.name(), value.name()),
            Type::Row(fields) => {
                let names = fields.iter().map(Type::name).collect::<Vec<_>>();
                format!("row({})", names.join(", "))
            }
        }
    }

    /// Creates an empty builder for values of this type.
    pub fn create_block_builder(&self, expected_entries: usize) -> BlockBuilder {
        BlockBuilder::for_type(self, expected_entries)
    }

    /// Reads the value at `position` of `block`.
    pub fn read_native_value(&self, block: &Block, position: usize) -> Result<Value> {
        if block.is_null(position)? {
            return Ok(Value::Null);
        }
        let value = match self {
            Type::Boolean => Value::Boolean(block.get_byte(position, 0)? != 0),
            Type::TinyInt => Value::Long(block.get_byte(position, 0)? as i64),
            Type::SmallInt => Value::Long(block.get_short(position, 0)? as i64),
            Type::Integer | Type::Date => Value::Long(block.get_int(position, 0)? as i64),
            Type::BigInt => Value::Long(block.get_long(position, 0)?),
            Type::Real => Value::Real(f32::from_bits(block.get_int(position, 0)? as u32)),
            Type::Double => Value::Double(f64::from_bits(block.get_long(position, 0)? as u64)),
            Type::Varchar | Type::Varbinary => Value::Bytes(block.get_slice(position)?.to_vec()),
            Type::Array(element) => {
                let elements = block.get_array(position)?;
                let values = (0..elements.position_count())
                    .map(|i| element.read_native_value(&elements, i))
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(values)
            }
            Type::Map(key_type, value_type) => {
                let map = block.get_map(position)?;
                let entries = (0..map.cardinality())
                    .map(|i| {
                        Ok((
                            key_type.read_native_value(map.keys(), i)?,
                            value_type.read_native_value(map.values(), i)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Map(entries)
            }
            Type::Row(fields) => {
                let row = block.get_row(position)?;
                let values = fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| field.read_native_value(row.field_block(i)?, row.raw_index()))
                    .collect::<Result<Vec<_>>>()?;
                Value::Row(values)
            }
        };
        Ok(value)
    }

    /// Appends `value` to `builder` as one complete position.
    pub fn write_native_value(&self, builder: &mut BlockBuilder, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null) => builder.append_null(),
            (Type::Boolean, Value::Boolean(v)) => builder.write_byte(*v as i8),
            (Type::TinyInt, Value::Long(v)) => builder.write_byte(narrow::<i8>(*v, self)?),
            (Type::SmallInt, Value::Long(v)) => builder.write_short(narrow::<i16>(*v, self)?),
            (Type::Integer | Type::Date, Value::Long(v)) => {
                builder.write_int(narrow::<i32>(*v, self)?)
            }
            (Type::BigInt, Value::Long(v)) => builder.write_long(*v),
            (Type::Real, Value::Real(v)) => builder.write_int(v.to_bits() as i32),
            (Type::Double, Value::Double(v)) => builder.write_long(v.to_bits() as i64),
            (Type::Varchar | Type::Varbinary, Value::Bytes(bytes)) => {
                builder.write_bytes(bytes)?;
                builder.close_entry()
            }
            (Type::Array(element), Value::Array(values)) => builder.build_entry(|entry| {
                let EntryBuilder::Array(elements) = entry else {
                    return Err(Error::invalid_operation("array entry on non-array builder"));
                };
                for v in values {
                    element.write_native_value(elements, v)?;
                }
                Ok(())
            }),
            (Type::Map(key_type, value_type), Value::Map(entries)) => builder.build_entry(|entry| {
                let EntryBuilder::Map { keys, values } = entry else {
                    return Err(Error::invalid_operation("map entry on non-map builder"));
                };
                for (k, v) in entries {
                    key_type.write_native_value(keys, k)?;
                    value_type.write_native_value(values, v)?;
                }
                Ok(())
            }),
            (Type::Row(field_types), Value::Row(field_values)) => {
                if field_types.len() != field_values.len() {
                    return Err(Error::invalid_arg(
                        "value",
                        format!(
                            "row of {} fields for {}",
                            field_values.len(),
                            self.name()
                        ),
                    ));
                }
                builder.build_entry(|entry| {
                    let EntryBuilder::Row(fields) = entry else {
                        return Err(Error::invalid_operation("row entry on non-row builder"));
                    };
                    for ((ty, field), v) in field_types.iter().zip(fields.iter_mut()).zip(field_values) {
                        ty.write_native_value(field, v)?;
                    }
                    Ok(())
                })
            }
            (_, v) => Err(Error::invalid_arg(
                "value",
                format!("{} value for {}", v.variant_name(), self.name()),
            )),
        }
    }

    /// Appends the value at `position` of `block` to `builder`.
    pub fn append_to(&self, block: &Block, position: usize, builder: &mut BlockBuilder) -> Result<()> {
        builder.append_position(block, position)
    }

    /// Null-safe equality: two nulls are equal, a null never equals a value.
    pub fn equals(&self, left: &Block, left_position: usize, right: &Block, right_position: usize) -> Result<bool> {
        let l = self.read_native_value(left, left_position)?;
        let r = self.read_native_value(right, right_position)?;
        self.value_equals(&l, &r)
    }

    /// Hash consistent with [`equals`](Self::equals).
    pub fn hash(&self, block: &Block, position: usize) -> Result<u64> {
        let value = self.read_native_value(block, position)?;
        self.value_hash(&value)
    }

    /// Total order with nulls first. Fails for types without an ordering.
    pub fn compare(&self, left: &Block, left_position: usize, right: &Block, right_position: usize) -> Result<Ordering> {
        let l = self.read_native_value(left, left_position)?;
        let r = self.read_native_value(right, right_position)?;
        self.value_compare(&l, &r)
    }

    pub fn value_equals(&self, left: &Value, right: &Value) -> Result<bool> {
        let equal = match (self, left, right) {
            (_, Value::Null, Value::Null) => true,
            (_, Value::Null, _) | (_, _, Value::Null) => false,
            (_, Value::Real(l), Value::Real(r)) => {
                canonical_f64(*l as f64).to_bits() == canonical_f64(*r as f64).to_bits()
            }
            (_, Value::Double(l), Value::Double(r)) => {
                canonical_f64(*l).to_bits() == canonical_f64(*r).to_bits()
            }
            (Type::Array(element), Value::Array(l), Value::Array(r)) => {
                if l.len() != r.len() {
                    return Ok(false);
                }
                for (a, b) in l.iter().zip(r) {
                    if !element.value_equals(a, b)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Type::Map(key_type, value_type), Value::Map(l), Value::Map(r)) => {
                if l.len() != r.len() {
                    return Ok(false);
                }
                // Entry order is not significant.
                for (key, value) in l {
                    let mut found = false;
                    for (other_key, other_value) in r {
                        if key_type.value_equals(key, other_key)? {
                            found = value_type.value_equals(value, other_value)?;
                            break;
                        }
                    }
                    if !found {
                        return Ok(false);
                    }
                }
                true
            }
            (Type::Row(fields), Value::Row(l), Value::Row(r)) => {
                if l.len() != fields.len() || r.len() != fields.len() {
                    return Ok(false);
                }
                for ((ty, a), b) in fields.iter().zip(l).zip(r) {
                    if !ty.value_equals(a, b)? {
                        return Ok(false);
                    }
                }
                true
            }
            (_, l, r) => l == r,
        };
        Ok(equal)
    }

    pub fn value_hash(&self, value: &Value) -> Result<u64> {
        let hash = match (self, value) {
            (_, Value::Null) => NULL_HASH,
            (_, Value::Boolean(v)) => xxhash_rust::xxh3::xxh3_64(&[*v as u8]),
            (_, Value::Long(v)) => xxhash_rust::xxh3::xxh3_64(&v.to_le_bytes()),
            (_, Value::Real(v)) => {
                xxhash_rust::xxh3::xxh3_64(&canonical_f64(*v as f64).to_bits().to_le_bytes())
            }
            (_, Value::Double(v)) => {
                xxhash_rust::xxh3::xxh3_64(&canonical_f64(*v).to_bits().to_le_bytes())
            }
            (_, Value::Bytes(bytes)) => xxhash_rust::xxh3::xxh3_64(bytes),
            (Type::Array(element), Value::Array(values)) => {
                let mut hasher = Xxh3::new();
                for v in values {
                    hasher.update(&element.value_hash(v)?.to_le_bytes());
                }
                hasher.digest()
            }
            (Type::Map(key_type, value_type), Value::Map(entries)) => {
                // Order-insensitive combination of the entry hashes.
                let mut combined = 0u64;
                for (k, v) in entries {
                    let mut hasher = Xxh3::new();
                    hasher.update(&key_type.value_hash(k)?.to_le_bytes());
                    hasher.update(&value_type.value_hash(v)?.to_le_bytes());
                    combined = combined.wrapping_add(hasher.digest());
                }
                combined
            }
            (Type::Row(fields), Value::Row(values)) => {
                let mut hasher = Xxh3::new();
                for (ty, v) in fields.iter().zip(values) {
                    hasher.update(&ty.value_hash(v)?.to_le_bytes());
                }
                hasher.digest()
            }
            (_, v) => {
                return Err(Error::invalid_arg(
                    "value",
                    format!("{} value for {}", v.variant_name(), self.name()),
                ));
            }
        };
        Ok(hash)
    }

    pub fn value_compare(&self, left: &Value, right: &Value) -> Result<Ordering> {
        if !self.is_orderable() {
            return Err(Error::unsupported("compare", self.name()));
        }
        let ordering = match (self, left, right) {
            (_, Value::Null, Value::Null) => Ordering::Equal,
            (_, Value::Null, _) => Ordering::Less,
            (_, _, Value::Null) => Ordering::Greater,
            (_, Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
            (_, Value::Long(l), Value::Long(r)) => l.cmp(r),
            (_, Value::Real(l), Value::Real(r)) => {
                canonical_f64(*l as f64).total_cmp(&canonical_f64(*r as f64))
            }
            (_, Value::Double(l), Value::Double(r)) => canonical_f64(*l).total_cmp(&canonical_f64(*r)),
            (_, Value::Bytes(l), Value::Bytes(r)) => l.cmp(r),
            (Type::Array(element), Value::Array(l), Value::Array(r)) => {
                for (a, b) in l.iter().zip(r) {
                    let ordering = element.value_compare(a, b)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                l.len().cmp(&r.len())
            }
            (Type::Row(fields), Value::Row(l), Value::Row(r)) => {
                for ((ty, a), b) in fields.iter().zip(l).zip(r) {
                    let ordering = ty.value_compare(a, b)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                Ordering::Equal
            }
            (_, l, r) => {
                return Err(Error::invalid_arg(
                    "value",
                    format!(
                        "cannot compare {} with {} as {}",
                        l.variant_name(),
                        r.variant_name(),
                        self.name()
                    ),
                ));
            }
        };
        Ok(ordering)
    }
}

/// Folds `-0.0` into `0.0` and every NaN into the canonical NaN.
fn canonical_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: &Type) -> Result<T> {
    T::try_from(value).map_err(|_| {
        Error::invalid_function_argument(format!("value {value} is out of range for {}", ty.name()))
    })
}
