// src/error.rs
//! Error taxonomy for the DID system.
//!
//! Each layer owns one enum:
//! - [`CryptoError`]: key and signature handling in the signature provider
//! - [`PersistenceError`]: storage I/O in the persistence collaborators
//! - [`ChainIntegrityError`]: hash or link mismatch found by ledger validation
//! - [`RegistryError`]: everything the identity registry surfaces to callers
//!
//! A malformed key or signature (`CryptoError`) is always distinct from a
//! well-formed signature that simply does not match, which is reported as
//! `authenticated: false` rather than as an error.

use thiserror::Error;

pub use crate::blockchain::ledger::{ChainIntegrityError, IntegrityFault};

/// Failures raised by the signature provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Malformed private key: {0}")]
    MalformedKey(String),

    #[error("Malformed signature or public key: {0}")]
    DecodeError(String),

    #[error("Signature scheme not available: {0}")]
    SchemeUnavailable(String),

    #[error("Signature scheme self-test failed for {0}")]
    SelfTestFailed(String),

    #[error("Key was registered as {registered}, active scheme expects {active}")]
    SchemeMismatch { registered: String, active: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("System random number generator failure")]
    Rng,
}

/// Failures raised by a persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Block {index} is already persisted")]
    BlockConflict { index: u64 },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures surfaced by the identity registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("DID not found: {0}")]
    DidNotFound(String),

    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("Could not mint a unique DID after {attempts} attempts")]
    Duplicate { attempts: u32 },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Challenge already used: {0}")]
    ChallengeReused(String),

    #[error(transparent)]
    ChainIntegrity(#[from] ChainIntegrityError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The DID document was stored but its ledger block was not. The caller
    /// decides whether to compensate; nothing is rolled back automatically.
    #[error("Document for {did} was saved but its ledger block was not: {source}")]
    LedgerAppendFailed {
        did: String,
        #[source]
        source: PersistenceError,
    },
}

impl RegistryError {
    /// True for both an unknown DID and an unknown challenge id.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::DidNotFound(_) | RegistryError::ChallengeNotFound(_)
        )
    }
}
