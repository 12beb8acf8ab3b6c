//! Canonical fingerprints for configuration and run records.
//!
//! Two runs with the same privacy parameters must carry the same
//! `config_hash` in the run log, regardless of platform or float formatting.
//!
//! - Floats are quantized to i64 (× 1e6, rounded) before hashing
//! - Struct fields serialize in declaration order
//! - Maps in hashed data use `BTreeMap`

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Quantization factor for float normalization.
pub const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Quantize a float to an i64 for deterministic hashing.
pub fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

/// Serialize a value to canonical JSON bytes.
///
/// # Panics
///
/// Panics if `value` has no JSON form (a map with non-string keys, a failing
/// `Serialize` impl). Hashed types must be plain structs of scalars, strings
/// and `BTreeMap<String, _>`.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical serialization failed")
}

/// xxh64 of the canonical bytes.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// [`canonical_hash`] as 16 hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
