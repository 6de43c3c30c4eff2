// src/wallet/schemes.rs
//! Signature scheme backends.
//!
//! Three schemes are supported, ranked from most to least preferred:
//!
//! | Rank | Scheme      | Family                     | Crate             |
//! |------|-------------|----------------------------|-------------------|
//! | 1    | ML-DSA-44   | lattice (FIPS 204)         | `pqcrypto-mldsa`  |
//! | 2    | Falcon-512  | lattice, hash-to-point     | `pqcrypto-falcon` |
//! | 3    | Ed25519     | elliptic curve, deterministic | `ring`         |
//!
//! The post-quantum backends sit behind the `mldsa` and `falcon` cargo
//! features. Ed25519 is always compiled in and is the last resort.
//!
//! Every backend verifies against the actual message and public key. A
//! malformed key or signature is a [`CryptoError`]; a well-formed signature
//! that does not match is `Ok(false)`.

use crate::error::CryptoError;
use crate::wallet::key_management::KeyPair;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// ML-DSA-44 (Dilithium2)
    MlDsa44,
    /// Falcon-512
    Falcon512,
    /// Ed25519 fallback
    Ed25519,
}

/// Startup preference order.
pub const RANKED_SCHEMES: [SignatureScheme; 3] = [
    SignatureScheme::MlDsa44,
    SignatureScheme::Falcon512,
    SignatureScheme::Ed25519,
];

const SELF_TEST_MESSAGE: &[u8] = b"did-system signature self-test";

#[cfg(test)]
thread_local! {
    static WITHHELD: std::cell::Cell<Option<SignatureScheme>> = std::cell::Cell::new(None);
}

/// Makes `scheme` report as not compiled in, on the calling thread only.
#[cfg(test)]
pub(crate) fn withhold_for_test(scheme: Option<SignatureScheme>) {
    WITHHELD.with(|w| w.set(scheme));
}

impl SignatureScheme {
    /// Stable configuration name, e.g. `ml-dsa-44`.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::MlDsa44 => "ml-dsa-44",
            SignatureScheme::Falcon512 => "falcon-512",
            SignatureScheme::Ed25519 => "ed25519",
        }
    }

    /// Verification key type written into DID documents.
    pub fn verification_key_type(&self) -> &'static str {
        match self {
            SignatureScheme::MlDsa44 => "MLDSAVerificationKey2024",
            SignatureScheme::Falcon512 => "FalconVerificationKey2024",
            SignatureScheme::Ed25519 => "Ed25519VerificationKey2020",
        }
    }

    pub fn is_post_quantum(&self) -> bool {
        !matches!(self, SignatureScheme::Ed25519)
    }

    /// Whether this build contains the backend.
    pub fn is_compiled(&self) -> bool {
        let compiled = match self {
            SignatureScheme::MlDsa44 => cfg!(feature = "mldsa"),
            SignatureScheme::Falcon512 => cfg!(feature = "falcon"),
            SignatureScheme::Ed25519 => true,
        };
        #[cfg(test)]
        let compiled = compiled && WITHHELD.with(|w| w.get()) != Some(*self);
        compiled
    }

    /// Generate → sign → verify, plus a negative check on a different
    /// message. A scheme is usable only if this passes.
    ///
    /// # Errors
    /// - `SchemeUnavailable` if the backend is not compiled in
    /// - `SelfTestFailed` if the round trip or the negative check fails
    pub fn self_test(&self) -> Result<(), CryptoError> {
        if !self.is_compiled() {
            return Err(CryptoError::SchemeUnavailable(self.name().to_string()));
        }

        let pair = self.generate_keypair()?;
        let signature = self.sign(SELF_TEST_MESSAGE, pair.private_key())?;
        let accepts = self.verify(SELF_TEST_MESSAGE, &signature, pair.public_key())?;
        let rejects = !self.verify(b"tampered", &signature, pair.public_key())?;

        if accepts && rejects {
            Ok(())
        } else {
            Err(CryptoError::SelfTestFailed(self.name().to_string()))
        }
    }

    pub(crate) fn generate_keypair(&self) -> Result<KeyPair, CryptoError> {
        match self {
            #[cfg(feature = "mldsa")]
            SignatureScheme::MlDsa44 => Ok(mldsa::generate()),
            #[cfg(feature = "falcon")]
            SignatureScheme::Falcon512 => Ok(falcon::generate()),
            SignatureScheme::Ed25519 => ed25519::generate(),
            #[allow(unreachable_patterns)]
            other => Err(CryptoError::SchemeUnavailable(other.name().to_string())),
        }
    }

    pub(crate) fn sign(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            #[cfg(feature = "mldsa")]
            SignatureScheme::MlDsa44 => mldsa::sign(message, private_key),
            #[cfg(feature = "falcon")]
            SignatureScheme::Falcon512 => falcon::sign(message, private_key),
            SignatureScheme::Ed25519 => ed25519::sign(message, private_key),
            #[allow(unreachable_patterns)]
            other => Err(CryptoError::SchemeUnavailable(other.name().to_string())),
        }
    }

    pub(crate) fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError> {
        match self {
            #[cfg(feature = "mldsa")]
            SignatureScheme::MlDsa44 => mldsa::verify(message, signature, public_key),
            #[cfg(feature = "falcon")]
            SignatureScheme::Falcon512 => falcon::verify(message, signature, public_key),
            SignatureScheme::Ed25519 => ed25519::verify(message, signature, public_key),
            #[allow(unreachable_patterns)]
            other => Err(CryptoError::SchemeUnavailable(other.name().to_string())),
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ml-dsa-44" | "mldsa44" | "ml-dsa" | "dilithium2" => Ok(SignatureScheme::MlDsa44),
            "falcon-512" | "falcon512" | "falcon" => Ok(SignatureScheme::Falcon512),
            "ed25519" => Ok(SignatureScheme::Ed25519),
            other => Err(CryptoError::SchemeUnavailable(format!(
                "unknown signature scheme '{}'",
                other
            ))),
        }
    }
}

#[cfg(feature = "mldsa")]
mod mldsa {
    use super::KeyPair;
    use crate::error::CryptoError;
    use pqcrypto_mldsa::mldsa44;
    use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};

    pub fn generate() -> KeyPair {
        let (pk, sk) = mldsa44::keypair();
        KeyPair::new(pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    }

    pub fn sign(message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sk = mldsa44::SecretKey::from_bytes(private_key)
            .map_err(|e| CryptoError::MalformedKey(format!("ml-dsa-44: {:?}", e)))?;
        Ok(mldsa44::detached_sign(message, &sk).as_bytes().to_vec())
    }

    pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
        let pk = mldsa44::PublicKey::from_bytes(public_key)
            .map_err(|e| CryptoError::DecodeError(format!("ml-dsa-44 public key: {:?}", e)))?;
        // from_bytes zero-pads short input; ML-DSA signatures are fixed length.
        if signature.len() != mldsa44::signature_bytes() {
            return Err(CryptoError::DecodeError(format!(
                "ml-dsa-44 signature: expected {} bytes, got {}",
                mldsa44::signature_bytes(),
                signature.len()
            )));
        }
        let sig = mldsa44::DetachedSignature::from_bytes(signature)
            .map_err(|e| CryptoError::DecodeError(format!("ml-dsa-44 signature: {:?}", e)))?;
        Ok(mldsa44::verify_detached_signature(&sig, message, &pk).is_ok())
    }
}

#[cfg(feature = "falcon")]
mod falcon {
    use super::KeyPair;
    use crate::error::CryptoError;
    use pqcrypto_falcon::falcon512;
    use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};

    /// `0x30 + log2(512)`
    const SIGNATURE_HEADER: u8 = 0x39;
    /// Header byte plus 40-byte nonce.
    const SIGNATURE_PREFIX_LEN: usize = 41;

    pub fn generate() -> KeyPair {
        let (pk, sk) = falcon512::keypair();
        KeyPair::new(pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    }

    pub fn sign(message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sk = falcon512::SecretKey::from_bytes(private_key)
            .map_err(|e| CryptoError::MalformedKey(format!("falcon-512: {:?}", e)))?;
        Ok(falcon512::detached_sign(message, &sk).as_bytes().to_vec())
    }

    pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
        let pk = falcon512::PublicKey::from_bytes(public_key)
            .map_err(|e| CryptoError::DecodeError(format!("falcon-512 public key: {:?}", e)))?;
        // Variable length, but always a header byte and the nonce before the
        // compressed body.
        if signature.len() <= SIGNATURE_PREFIX_LEN || signature[0] != SIGNATURE_HEADER {
            return Err(CryptoError::DecodeError(format!(
                "falcon-512 signature: bad header or {} bytes is too short",
                signature.len()
            )));
        }
        let sig = falcon512::DetachedSignature::from_bytes(signature)
            .map_err(|e| CryptoError::DecodeError(format!("falcon-512 signature: {:?}", e)))?;
        Ok(falcon512::verify_detached_signature(&sig, message, &pk).is_ok())
    }
}

mod ed25519 {
    use super::KeyPair;
    use crate::error::CryptoError;
    use ring::rand::SystemRandom;
    use ring::signature::{self, Ed25519KeyPair, KeyPair as _, UnparsedPublicKey};

    const PUBLIC_KEY_LEN: usize = 32;
    const SIGNATURE_LEN: usize = 64;

    /// The private key is the PKCS#8 v2 document ring produces.
    pub fn generate() -> Result<KeyPair, CryptoError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| CryptoError::KeyGeneration("ed25519".into()))?;
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| CryptoError::KeyGeneration(format!("ed25519: {}", e)))?;
        Ok(KeyPair::new(
            pair.public_key().as_ref().to_vec(),
            pkcs8.as_ref().to_vec(),
        ))
    }

    pub fn sign(message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let pair = Ed25519KeyPair::from_pkcs8(private_key)
            .map_err(|e| CryptoError::MalformedKey(format!("ed25519: {}", e)))?;
        Ok(pair.sign(message).as_ref().to_vec())
    }

    pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
        if public_key.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::DecodeError(format!(
                "ed25519 public key: expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                public_key.len()
            )));
        }
        if signature.len() != SIGNATURE_LEN {
            return Err(CryptoError::DecodeError(format!(
                "ed25519 signature: expected {} bytes, got {}",
                SIGNATURE_LEN,
                signature.len()
            )));
        }
        let key = UnparsedPublicKey::new(&signature::ED25519, public_key);
        Ok(key.verify(message, signature).is_ok())
    }
}
