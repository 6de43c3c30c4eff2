// src/lib.rs

//! # Post-Quantum Decentralized Identity System
//!
//! Issues DIDs bound to post-quantum key pairs, records every creation in a
//! tamper-evident hash chain, and authenticates holders with single-use
//! signed challenges.
//!
//! ## Architecture Overview
//! 1. **Wallet Layer**: ranked signature schemes behind [`SignatureProvider`]
//! 2. **Blockchain Layer**: the append-only [`Ledger`]
//! 3. **Storage Layer**: [`PersistenceGateway`] implementations and the
//!    challenge repository
//! 4. **Services Layer**: the [`IdentityRegistry`] and its HTTP adapter

pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use blockchain::ledger::Ledger;
pub use error::{ChainIntegrityError, CryptoError, PersistenceError, RegistryError};
pub use services::{ApiServer, IdentityRegistry};
pub use storage::PersistenceGateway;
pub use wallet::key_management::{KeyManager, KeyPair, SignatureProvider};
pub use wallet::schemes::SignatureScheme;
