// src/models/block.rs
//! Ledger block data model.
//!
//! A block commits to its own fields and to its predecessor's hash:
//!
//! ```text
//! hash = SHA-256(canonical_json({index, timestamp, payload, previousHash}))
//! ```
//!
//! The canonical encoding sorts object keys at every depth, so a payload
//! that round-trips through storage hashes to the same value.

use crate::utils::crypto::hash_hex;
use crate::utils::serialization::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Opaque event payload carried by a block.
pub type Payload = Map<String, Value>;

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// One entry in the hash chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, starting at 0 for genesis
    pub index: u64,

    /// Creation time, RFC 3339 UTC
    pub timestamp: String,

    /// Event data
    pub payload: Payload,

    /// Hash of the predecessor, or the sentinel for genesis
    pub previous_hash: String,

    /// Hex SHA-256 over the other four fields
    pub hash: String,
}

impl Block {
    /// Builds a block and computes its hash from the given fields.
    pub fn seal(index: u64, timestamp: String, payload: Payload, previous_hash: String) -> Self {
        let hash = block_hash(index, &timestamp, &payload, &previous_hash);
        Block {
            index,
            timestamp,
            payload,
            previous_hash,
            hash,
        }
    }

    /// Recomputes the hash from the stored fields (ignores `self.hash`).
    pub fn compute_hash(&self) -> String {
        block_hash(self.index, &self.timestamp, &self.payload, &self.previous_hash)
    }

    /// The payload's `type` marker, if any (e.g. `DID_CREATION`).
    pub fn event_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

/// Hashes the four committed fields of a block.
pub fn block_hash(index: u64, timestamp: &str, payload: &Payload, previous_hash: &str) -> String {
    let committed = json!({
        "index": index,
        "timestamp": timestamp,
        "payload": payload,
        "previousHash": previous_hash,
    });
    hash_hex(canonical_json(&committed).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kind: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("type".into(), json!(kind));
        p
    }

    #[test]
    fn test_seal_matches_compute_hash() {
        let block = Block::seal(3, "2024-05-01T00:00:00Z".into(), payload("DID_CREATION"), "ab".into());
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.hash.len(), 64);
        assert_eq!(block.event_type(), Some("DID_CREATION"));
    }

    #[test]
    fn test_every_field_is_committed() {
        let base = Block::seal(1, "t".into(), payload("A"), "p".into());

        let mut changed = base.clone();
        changed.index = 2;
        assert_ne!(changed.compute_hash(), base.hash);

        let mut changed = base.clone();
        changed.timestamp = "u".into();
        assert_ne!(changed.compute_hash(), base.hash);

        let mut changed = base.clone();
        changed.payload = payload("B");
        assert_ne!(changed.compute_hash(), base.hash);

        let mut changed = base.clone();
        changed.previous_hash = "q".into();
        assert_ne!(changed.compute_hash(), base.hash);
    }

    #[test]
    fn test_wire_field_names() {
        let block = Block::seal(0, "t".into(), payload("GENESIS"), GENESIS_PREVIOUS_HASH.into());
        let value = serde_json::to_value(&block).unwrap();
        for field in ["index", "timestamp", "payload", "previousHash", "hash"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_hash_survives_storage_round_trip() {
        let mut p = payload("DID_CREATION");
        p.insert("userInfo".into(), json!({"z": 1, "a": [1, 2]}));
        let block = Block::seal(5, "t".into(), p, "prev".into());

        let stored = serde_json::to_string(&block).unwrap();
        let loaded: Block = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded.compute_hash(), block.hash);
    }
}
