//! Materialized native values and zero-copy views of nested positions.

use strata_common::{Error, Result, verify_index};

use crate::block::Block;
use crate::types::Type;

/// A native value read out of a block, or written into a builder.
///
/// Integral types (tinyint through bigint, and date as days since the epoch)
/// share the `Long` representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Real(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Row(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Shorthand for a UTF-8 text value.
    pub fn text(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the value variant, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Long(_) => "long",
            Value::Real(_) => "real",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Row(_) => "row",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// The entries of one map position.
///
/// Keys and values are zero-copy regions of the map's key and value blocks.
/// Viewed as a single block the entries are interleaved
/// (`key0, value0, key1, value1, ...`), so the interleaved position count is
/// twice the cardinality.
#[derive(Clone)]
pub struct SqlMap {
    keys: Block,
    values: Block,
}

impl SqlMap {
    pub(crate) fn new(keys: Block, values: Block) -> SqlMap {
        debug_assert_eq!(keys.position_count(), values.position_count());
        SqlMap { keys, values }
    }

    /// Number of entries.
    #[inline]
    pub fn cardinality(&self) -> usize {
        self.keys.position_count()
    }

    /// Number of positions of the interleaved key/value view.
    #[inline]
    pub fn position_count(&self) -> usize {
        self.cardinality() * 2
    }

    pub fn keys(&self) -> &Block {
        &self.keys
    }

    pub fn values(&self) -> &Block {
        &self.values
    }

    /// Resolves a position of the interleaved view: even positions are keys,
    /// odd positions are values.
    pub fn interleaved(&self, position: usize) -> Result<(&Block, usize)> {
        verify_index!(position, self.position_count());
        if position % 2 == 0 {
            Ok((&self.keys, position / 2))
        } else {
            Ok((&self.values, position / 2))
        }
    }

    /// Finds the entry whose key is not distinct from `key`.
    pub fn seek_key(&self, key_type: &Type, key: &Value) -> Result<Option<usize>> {
        if key.is_null() {
            return Err(Error::invalid_function_argument("map key cannot be null"));
        }
        for entry in 0..self.cardinality() {
            let candidate = key_type.read_native_value(&self.keys, entry)?;
            if key_type.value_equals(&candidate, key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for SqlMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlMap")
            .field("cardinality", &self.cardinality())
            .finish()
    }
}

/// The fields of one row position.
///
/// Holds the row block's field blocks; each field value lives at `raw_index`
/// of the corresponding field block.
#[derive(Clone)]
pub struct SqlRow {
    fields: Vec<Block>,
    raw_index: usize,
}

impl SqlRow {
    pub(crate) fn new(fields: Vec<Block>, raw_index: usize) -> SqlRow {
        SqlRow { fields, raw_index }
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_block(&self, field: usize) -> Result<&Block> {
        verify_index!(field, self.fields.len());
        Ok(&self.fields[field])
    }

    /// Position of this row inside each field block.
    #[inline]
    pub fn raw_index(&self) -> usize {
        self.raw_index
    }

    pub fn is_field_null(&self, field: usize) -> Result<bool> {
        self.field_block(field)?.is_null(self.raw_index)
    }
}

impl std::fmt::Debug for SqlRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlRow")
            .field("field_count", &self.fields.len())
            .field("raw_index", &self.raw_index)
            .finish()
    }
}
