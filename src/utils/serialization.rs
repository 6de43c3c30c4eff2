// src/utils/serialization.rs
//! Serialization utilities for the DID system.
//!
//! Provides:
//! - JSON (de)serialization helpers
//! - A canonical JSON encoding used for ledger hashing
//! - Base64 helpers for keys and signatures crossing the API boundary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serializes a value to a JSON string.
///
/// # Arguments
/// * `data` - The value to serialize (must implement `Serialize`)
///
/// # Returns
/// - `Ok(String)` with JSON representation on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
///
/// # Arguments
/// * `data` - JSON string to deserialize
///
/// # Returns
/// - `Ok(T)` with deserialized value on success
/// - `Err(serde_json::Error)` if deserialization fails
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Encodes a JSON value canonically: compact, with object keys sorted
/// lexicographically at every depth.
///
/// Two values that compare equal always encode to the same string, whatever
/// order their keys were inserted in. The ledger hashes this encoding.
pub fn canonical_json(value: &Value) -> String {
    // Display on Value is compact and infallible.
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Encodes raw bytes as standard (padded) base64.
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::encode(bytes)
}

/// Decodes standard base64 into raw bytes.
///
/// Surrounding whitespace is ignored; anything else that is not valid
/// base64 is an error.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode(data.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"y":[{"c":2,"d":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_ignores_insertion_order() {
        let mut first = Map::new();
        first.insert("name".into(), json!("Alice"));
        first.insert("age".into(), json!(30));
        let mut second = Map::new();
        second.insert("age".into(), json!(30));
        second.insert("name".into(), json!("Alice"));

        assert_eq!(
            canonical_json(&Value::Object(first)),
            canonical_json(&Value::Object(second))
        );
    }

    #[test]
    fn test_decode_bytes_rejects_garbage() {
        assert!(decode_bytes("not base64!!").is_err());
        assert_eq!(decode_bytes(&encode_bytes(b"key")).unwrap(), b"key");
    }
}
