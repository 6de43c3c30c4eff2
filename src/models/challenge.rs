// src/models/challenge.rs
//! Authentication challenge data model.

use crate::error::CryptoError;
use crate::utils::crypto::random_bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single-use value a DID holder must sign to authenticate.
///
/// Lifecycle: created Issued (`consumed == false`); flips to Consumed on the
/// first verification attempt whatever its outcome, and never flips back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Lookup key handed to the client
    pub id: String,

    /// The exact string the client signs
    pub value: String,

    /// DID the challenge was issued for
    pub did: String,

    /// Whether a verification attempt has already been made
    pub consumed: bool,

    /// Issue time, used for expiry
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    /// Mints a fresh challenge for `did`.
    ///
    /// The value embeds a 256-bit nonce from the system RNG:
    /// `auth-challenge-<nonce, base64url>-<did>`.
    ///
    /// # Errors
    /// Returns `CryptoError::Rng` if the system RNG fails.
    pub fn issue(did: &str) -> Result<Self, CryptoError> {
        let nonce = random_bytes::<32>()?;
        Ok(Challenge {
            id: Uuid::new_v4().to_string(),
            value: format!(
                "auth-challenge-{}-{}",
                base64::encode_config(nonce, base64::URL_SAFE_NO_PAD),
                did
            ),
            did: did.to_string(),
            consumed: false,
            issued_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_binds_did_and_is_unpredictable() {
        let a = Challenge::issue("did:pqc:1").unwrap();
        let b = Challenge::issue("did:pqc:1").unwrap();

        assert!(!a.consumed);
        assert_eq!(a.did, "did:pqc:1");
        assert!(a.value.starts_with("auth-challenge-"));
        assert!(a.value.ends_with("-did:pqc:1"));
        assert_ne!(a.id, b.id);
        assert_ne!(a.value, b.value);
    }
}
