//! Random value generation for testing.
//!
//! Generators take an explicit [`fastrand::Rng`], so tests seed them and stay
//! reproducible.

use fastrand::Rng;
use strata_block::{Type, Value};

/// Longest generated string or binary value.
const MAX_BYTES_LEN: usize = 12;

/// Largest generated array or map.
const MAX_NESTED_LEN: usize = 5;

/// Generates `count` values of type `ty`. Each value, and each nested
/// element, array entry or row field, is null with probability `null_rate`.
/// Map keys are never null and unique within their map.
pub fn random_values(ty: &Type, count: usize, null_rate: f64, rng: &mut Rng) -> Vec<Value> {
    (0..count).map(|_| random_value(ty, null_rate, rng)).collect()
}

/// Generates one value of type `ty`, see [`random_values`].
pub fn random_value(ty: &Type, null_rate: f64, rng: &mut Rng) -> Value {
    if rng.f64() < null_rate {
        return Value::Null;
    }
    random_non_null_value(ty, null_rate, rng)
}

fn random_non_null_value(ty: &Type, null_rate: f64, rng: &mut Rng) -> Value {
    match ty {
        Type::Boolean => Value::Boolean(rng.bool()),
        Type::TinyInt => Value::Long(rng.i8(..) as i64),
        Type::SmallInt => Value::Long(rng.i16(..) as i64),
        Type::Integer => Value::Long(rng.i32(..) as i64),
        Type::Date => Value::Long(rng.i32(-100_000..100_000) as i64),
        Type::BigInt => Value::Long(rng.i64(..)),
        Type::Real => Value::Real(rng.f32() * 2000.0 - 1000.0),
        Type::Double => Value::Double(rng.f64() * 2e6 - 1e6),
        Type::Varchar => {
            let len = rng.usize(0..=MAX_BYTES_LEN);
            Value::Bytes((0..len).map(|_| rng.lowercase() as u8).collect())
        }
        Type::Varbinary => {
            let len = rng.usize(0..=MAX_BYTES_LEN);
            Value::Bytes((0..len).map(|_| rng.u8(..)).collect())
        }
        Type::Array(element) => {
            let len = rng.usize(0..=MAX_NESTED_LEN);
            Value::Array(random_values(element, len, null_rate, rng))
        }
        Type::Map(key, value) => {
            let len = rng.usize(0..=MAX_NESTED_LEN);
            let keys = unique_keys(key, len, rng);
            Value::Map(
                keys.into_iter()
                    .map(|k| (k, random_value(value, null_rate, rng)))
                    .collect(),
            )
        }
        Type::Row(fields) => Value::Row(
            fields
                .iter()
                .map(|field| random_value(field, null_rate, rng))
                .collect(),
        ),
    }
}

/// Up to `len` distinct non-null keys. Small key domains (booleans) may yield
/// fewer.
fn unique_keys(ty: &Type, len: usize, rng: &mut Rng) -> Vec<Value> {
    let mut keys: Vec<Value> = Vec::with_capacity(len);
    for _ in 0..len * 4 {
        if keys.len() == len {
            break;
        }
        let key = random_non_null_value(ty, 0.0, rng);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Generates `count` non-null varchar values drawn from `cardinality`
/// distinct strings.
pub fn random_words(count: usize, cardinality: usize, rng: &mut Rng) -> Vec<Value> {
    assert_ne!(cardinality, 0);
    (0..count)
        .map(|_| Value::text(&format!("word{}", rng.usize(0..cardinality))))
        .collect()
}
