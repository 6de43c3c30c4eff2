// src/storage/memory_store.rs
//! In-memory persistence collaborator for tests and ephemeral runs.

use crate::error::PersistenceError;
use crate::models::block::Block;
use crate::models::did::DIDDocument;
use crate::storage::PersistenceGateway;
use std::collections::HashMap;
use std::sync::RwLock;

/// Documents and blocks held in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, DIDDocument>>,
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with an existing chain snapshot, as if it had been
    /// persisted earlier. The blocks are stored as given, unchecked.
    pub fn with_chain(blocks: Vec<Block>) -> Self {
        MemoryStore {
            documents: RwLock::new(HashMap::new()),
            blocks: RwLock::new(blocks),
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }
}

impl PersistenceGateway for MemoryStore {
    fn save_document(&self, did: &str, document: &DIDDocument) -> Result<(), PersistenceError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        documents.insert(did.to_string(), document.clone());
        Ok(())
    }

    fn get_document(&self, did: &str) -> Result<Option<DIDDocument>, PersistenceError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(documents.get(did).cloned())
    }

    fn document_exists(&self, did: &str) -> Result<bool, PersistenceError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(documents.contains_key(did))
    }

    fn append_block(&self, block: &Block) -> Result<(), PersistenceError> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        if blocks.iter().any(|stored| stored.index == block.index) {
            return Err(PersistenceError::BlockConflict { index: block.index });
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Block>, PersistenceError> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        let mut ordered = blocks.clone();
        ordered.sort_by_key(|block| block.index);
        Ok(ordered)
    }
}
