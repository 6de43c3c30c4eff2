// src/storage/mod.rs
//! Storage layer.
//!
//! - [`PersistenceGateway`]: the narrow durable-storage contract the registry
//!   consumes, with [`MemoryStore`] and [`SqliteStore`] implementations
//! - [`ChallengeRepository`]: ephemeral, in-process challenge storage with an
//!   atomic consume step

pub mod challenge_store;
pub mod memory_store;
pub mod sqlite_store;

pub use challenge_store::{ChallengeRepository, ConsumeError, InMemoryChallengeStore};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use crate::error::PersistenceError;
use crate::models::block::Block;
use crate::models::did::DIDDocument;

/// Durable storage for DID documents and ledger blocks.
///
/// Calls are synchronous and may block on I/O. Failures are reported, never
/// retried; retry policy belongs to the caller.
pub trait PersistenceGateway: Send + Sync {
    /// Stores `document` under `did`, replacing any previous version.
    fn save_document(&self, did: &str, document: &DIDDocument) -> Result<(), PersistenceError>;

    /// Fetches the document stored under `did`, if any.
    fn get_document(&self, did: &str) -> Result<Option<DIDDocument>, PersistenceError>;

    fn document_exists(&self, did: &str) -> Result<bool, PersistenceError>;

    /// Persists one block. A block whose index is already stored is a
    /// `BlockConflict`; stored blocks are never replaced.
    fn append_block(&self, block: &Block) -> Result<(), PersistenceError>;

    /// All stored blocks ordered by index.
    fn load_chain(&self) -> Result<Vec<Block>, PersistenceError>;
}
