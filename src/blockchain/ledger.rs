// src/blockchain/ledger.rs
//! Append-only hash chain of identity events.
//!
//! # Guarantees
//! - Block 0 is the genesis block and carries the `"0"` previous-hash sentinel
//! - Each later block's `previousHash` equals its predecessor's `hash`
//! - Each block's `hash` is the SHA-256 of its own committed fields
//! - Blocks are never reordered or rewritten once appended
//!
//! Loading from persisted blocks keeps the stored hashes as they are and runs
//! [`Ledger::validate`] on the result, so corruption in storage surfaces as a
//! [`ChainIntegrityError`] instead of being papered over.
//!
//! `Ledger` itself is not synchronized. The registry keeps it behind a mutex
//! so that two appends can never compute the same index/previous-hash pair.

use crate::models::block::{Block, Payload, GENESIS_PREVIOUS_HASH};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// What went wrong at the first bad block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    /// Stored hash differs from the hash of the stored fields
    HashMismatch,
    /// `previousHash` differs from the predecessor's hash
    BrokenLink,
    /// Stored index differs from the block's position
    IndexMismatch,
    /// Block 0 does not carry the genesis sentinel
    BadGenesis,
    /// No blocks at all
    EmptyChain,
}

impl fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IntegrityFault::HashMismatch => "hash mismatch",
            IntegrityFault::BrokenLink => "broken link to previous block",
            IntegrityFault::IndexMismatch => "index out of position",
            IntegrityFault::BadGenesis => "invalid genesis block",
            IntegrityFault::EmptyChain => "chain has no blocks",
        };
        f.write_str(text)
    }
}

/// First failure found by [`Ledger::validate`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Chain integrity violated at block {index}: {fault}")]
pub struct ChainIntegrityError {
    pub index: u64,
    pub fault: IntegrityFault,
}

/// In-memory hash chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    // Never empty: every constructor starts from or checks for a genesis block.
    chain: Vec<Block>,
}

impl Ledger {
    /// Starts a new chain holding only a fresh genesis block.
    pub fn new() -> Self {
        Ledger {
            chain: vec![Self::genesis()],
        }
    }

    /// Builds the genesis block: index 0, sentinel previous hash, fixed marker
    /// payload.
    pub fn genesis() -> Block {
        let mut payload = Payload::new();
        payload.insert("type".into(), Value::from("GENESIS"));
        payload.insert("message".into(), Value::from("Genesis Block"));
        Block::seal(0, now(), payload, GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Rebuilds a chain from persisted blocks, in order, without recomputing
    /// anything, then validates it.
    ///
    /// # Errors
    /// `ChainIntegrityError` for an empty snapshot or the first corrupt block.
    pub fn load_from(snapshot: Vec<Block>) -> Result<Self, ChainIntegrityError> {
        if snapshot.is_empty() {
            return Err(ChainIntegrityError {
                index: 0,
                fault: IntegrityFault::EmptyChain,
            });
        }
        let ledger = Ledger { chain: snapshot };
        ledger.validate()?;
        Ok(ledger)
    }

    /// Appends a block carrying `payload` and returns a copy of it.
    pub fn append(&mut self, payload: Payload) -> Block {
        match self.append_with(payload, |_| Ok::<(), std::convert::Infallible>(())) {
            Ok(block) => block,
            Err(never) => match never {},
        }
    }

    /// Prepares the next block, hands it to `persist`, and appends it only if
    /// `persist` succeeds. On failure the chain is left untouched.
    pub fn append_with<E>(
        &mut self,
        payload: Payload,
        persist: impl FnOnce(&Block) -> Result<(), E>,
    ) -> Result<Block, E> {
        let block = Block::seal(
            self.chain.len() as u64,
            now(),
            payload,
            self.latest().hash.clone(),
        );
        persist(&block)?;
        self.chain.push(block.clone());
        Ok(block)
    }

    /// Walks the chain and reports the first block whose position, hash or
    /// link is inconsistent.
    pub fn validate(&self) -> Result<(), ChainIntegrityError> {
        if self.chain.is_empty() {
            return Err(ChainIntegrityError {
                index: 0,
                fault: IntegrityFault::EmptyChain,
            });
        }

        for (position, block) in self.chain.iter().enumerate() {
            let index = position as u64;
            let fail = |fault| Err(ChainIntegrityError { index, fault });

            if block.index != index {
                return fail(IntegrityFault::IndexMismatch);
            }
            if block.hash != block.compute_hash() {
                return fail(IntegrityFault::HashMismatch);
            }
            if position == 0 {
                if block.previous_hash != GENESIS_PREVIOUS_HASH {
                    return fail(IntegrityFault::BadGenesis);
                }
            } else if block.previous_hash != self.chain[position - 1].hash {
                return fail(IntegrityFault::BrokenLink);
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The tail block.
    pub fn latest(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(did: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("type".into(), json!("DID_CREATION"));
        p.insert("did".into(), json!(did));
        p
    }

    fn chain_of(n: usize) -> Ledger {
        let mut ledger = Ledger::new();
        for i in 0..n {
            ledger.append(event(&format!("did:pqc:{}", i)));
        }
        ledger
    }

    #[test]
    fn test_genesis_block() {
        let ledger = Ledger::new();
        let genesis = ledger.latest();
        assert_eq!(ledger.len(), 1);
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.event_type(), Some("GENESIS"));
        assert_eq!(
            Value::Object(genesis.payload.clone()),
            json!({"type": "GENESIS", "message": "Genesis Block"})
        );
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_links_blocks() {
        let ledger = chain_of(3);
        let blocks = ledger.blocks();
        assert_eq!(blocks.len(), 4);
        for i in 1..blocks.len() {
            assert_eq!(blocks[i].index, i as u64);
            assert_eq!(blocks[i].previous_hash, blocks[i - 1].hash);
        }
    }

    #[test]
    fn test_appended_chain_always_validates() {
        for n in [0, 1, 2, 10] {
            assert_eq!(chain_of(n).validate(), Ok(()));
        }
    }

    #[test]
    fn test_tampered_payload_reports_its_index() {
        let mut snapshot = chain_of(4).blocks().to_vec();
        snapshot[2]
            .payload
            .insert("did".into(), json!("did:pqc:mallory"));

        let err = Ledger::load_from(snapshot).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.fault, IntegrityFault::HashMismatch);
    }

    #[test]
    fn test_rehashed_tamper_breaks_next_link() {
        let mut snapshot = chain_of(3).blocks().to_vec();
        snapshot[1].payload.insert("did".into(), json!("x"));
        snapshot[1].hash = snapshot[1].compute_hash();

        let err = Ledger::load_from(snapshot).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.fault, IntegrityFault::BrokenLink);
    }

    #[test]
    fn test_tampered_genesis_reports_zero() {
        let mut snapshot = chain_of(1).blocks().to_vec();
        snapshot[0].payload.insert("type".into(), json!("FORGED"));
        assert_eq!(Ledger::load_from(snapshot).unwrap_err().index, 0);
    }

    #[test]
    fn test_reordered_blocks_are_rejected() {
        let mut snapshot = chain_of(3).blocks().to_vec();
        snapshot.swap(1, 2);
        let err = Ledger::load_from(snapshot).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.fault, IntegrityFault::IndexMismatch);
    }

    #[test]
    fn test_load_keeps_stored_values() {
        let original = chain_of(2);
        let loaded = Ledger::load_from(original.blocks().to_vec()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_empty_snapshot_fails() {
        assert_eq!(
            Ledger::load_from(Vec::new()).unwrap_err().fault,
            IntegrityFault::EmptyChain
        );
    }

    #[test]
    fn test_failed_persist_leaves_chain_untouched() {
        let mut ledger = chain_of(1);
        let before = ledger.clone();

        let result = ledger.append_with(event("did:pqc:x"), |_| Err("disk full"));
        assert_eq!(result.unwrap_err(), "disk full");
        assert_eq!(ledger, before);

        let block = ledger
            .append_with(event("did:pqc:y"), |b| {
                assert_eq!(b.index, 2);
                Ok::<(), ()>(())
            })
            .unwrap();
        assert_eq!(ledger.latest(), &block);
    }
}
