// src/wallet/key_management.rs
//! Signature key management for DID holders.
//!
//! Provides key pair generation, signing and verification behind the
//! [`SignatureProvider`] trait, and [`KeyManager`], the provider that picks
//! one scheme at startup from the ranked list in
//! [`RANKED_SCHEMES`](crate::wallet::schemes::RANKED_SCHEMES).
//!
//! # Scheme selection
//! - A pinned scheme must be compiled in and pass its self-test, otherwise
//!   selection fails. There is no silent downgrade.
//! - Without a pin, the first scheme in rank order that passes its self-test
//!   is used. Skipped candidates are logged.
//! - The selected scheme is fixed for the lifetime of the `KeyManager`.

use crate::error::CryptoError;
use crate::wallet::schemes::{SignatureScheme, RANKED_SCHEMES};
use log::{info, warn};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A public/private key pair, opaque outside the signature provider.
///
/// The private key is wiped from memory when the value is dropped. The
/// registry hands it to the caller once and never stores it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    pub fn new(public_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        KeyPair {
            public_key,
            private_key,
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_len", &self.public_key.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Key generation, signing and verification for one signature scheme.
///
/// Implementations are stateless after construction, so a single instance
/// can serve concurrent requests.
pub trait SignatureProvider: Send + Sync {
    /// The scheme every operation uses.
    fn scheme(&self) -> SignatureScheme;

    /// Produces a fresh, independent key pair.
    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError>;

    /// Signs `message` with a private key previously produced by
    /// [`generate_key_pair`](Self::generate_key_pair).
    ///
    /// # Errors
    /// `CryptoError::MalformedKey` if the key cannot be decoded.
    fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Checks `signature` over `message` against `public_key`.
    ///
    /// # Returns
    /// - `Ok(true)` if the signature is valid
    /// - `Ok(false)` if it is well-formed but does not match
    ///
    /// # Errors
    /// `CryptoError::DecodeError` if the signature or key is malformed.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError>;
}

/// Signature provider bound to the scheme chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyManager {
    scheme: SignatureScheme,
}

impl KeyManager {
    /// Selects the active scheme.
    ///
    /// # Arguments
    /// * `pinned` - Scheme required by configuration, or `None` to take the
    ///   best available one
    ///
    /// # Errors
    /// - `SchemeUnavailable` if the pinned scheme is not compiled in, or no
    ///   scheme at all is usable
    /// - `SelfTestFailed` if the pinned scheme fails its self-test
    pub fn select(pinned: Option<SignatureScheme>) -> Result<Self, CryptoError> {
        if let Some(scheme) = pinned {
            scheme.self_test()?;
            info!("Using pinned {} signatures", scheme);
            return Ok(KeyManager { scheme });
        }

        for scheme in RANKED_SCHEMES {
            match scheme.self_test() {
                Ok(()) => {
                    if scheme.is_post_quantum() {
                        info!("Using {} post-quantum signatures", scheme);
                    } else {
                        warn!("No post-quantum scheme usable, falling back to {} signatures", scheme);
                    }
                    return Ok(KeyManager { scheme });
                }
                Err(e) => warn!("Skipping {} signatures: {}", scheme, e),
            }
        }

        Err(CryptoError::SchemeUnavailable("no usable signature scheme".into()))
    }

    /// Shorthand for `select(Some(scheme))`.
    pub fn with_scheme(scheme: SignatureScheme) -> Result<Self, CryptoError> {
        Self::select(Some(scheme))
    }
}

impl SignatureProvider for KeyManager {
    fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        self.scheme.generate_keypair()
    }

    fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.scheme.sign(message, private_key)
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
        self.scheme.verify(message, signature, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::schemes::withhold_for_test;

    #[test]
    fn test_select_picks_best_compiled_scheme() {
        let expected = RANKED_SCHEMES
            .into_iter()
            .find(|s| s.is_compiled())
            .unwrap();
        assert_eq!(KeyManager::select(None).unwrap().scheme(), expected);
    }

    #[test]
    fn test_pinned_scheme_is_honoured() {
        let manager = KeyManager::with_scheme(SignatureScheme::Ed25519).unwrap();
        assert_eq!(manager.scheme(), SignatureScheme::Ed25519);
    }

    #[test]
    fn test_pinned_unavailable_scheme_fails() {
        let best = KeyManager::select(None).unwrap().scheme();
        withhold_for_test(Some(best));
        let pinned = KeyManager::with_scheme(best);
        let fallback = KeyManager::select(None).map(|m| m.scheme());
        withhold_for_test(None);

        assert!(matches!(pinned, Err(CryptoError::SchemeUnavailable(_))));
        if best != SignatureScheme::Ed25519 {
            assert_ne!(fallback.unwrap(), best);
        } else {
            assert!(matches!(fallback, Err(CryptoError::SchemeUnavailable(_))));
        }
    }

    #[test]
    fn test_provider_round_trip() {
        let manager = KeyManager::select(None).unwrap();
        let pair = manager.generate_key_pair().unwrap();
        let sig = manager.sign(b"challenge", pair.private_key()).unwrap();

        assert!(manager.verify(b"challenge", &sig, pair.public_key()).unwrap());
        let stranger = manager.generate_key_pair().unwrap();
        assert!(!manager.verify(b"challenge", &sig, stranger.public_key()).unwrap());
    }

    #[test]
    fn test_key_pair_debug_redacts_private_key() {
        let pair = KeyPair::new(vec![1, 2], vec![0xAA; 4]);
        let shown = format!("{:?}", pair);
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("170"));
    }
}
