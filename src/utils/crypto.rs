// src/utils/crypto.rs
//! Hashing and randomness primitives shared by the ledger and the registry.
//!
//! Uses SHA-256 from `ring` for all content hashing and `ring`'s system RNG
//! for nonces.

use crate::error::CryptoError;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the digest.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let digest = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// SHA-256 of `data` as a lowercase hex string (64 characters).
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash_data(data))
}

/// Fills a fresh `N`-byte buffer from the operating system RNG.
///
/// # Errors
/// Returns `CryptoError::Rng` if the system RNG is unavailable.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::Rng)?;
    Ok(buf)
}
