// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the DID Document structure following the
//! [DID Core Specification](https://www.w3.org/TR/did-core/), with field
//! names kept stable on the wire (camelCase).

use crate::utils::serialization::encode_bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fixed prefix of every identifier.
pub const DID_PREFIX: &str = "did";

/// Scheme tag (DID method) issued by this registry.
pub const DID_METHOD: &str = "pqc";

/// Fragment of the single verification key each document carries.
pub const PRIMARY_KEY_FRAGMENT: &str = "keys-1";

/// Caller-supplied metadata attached to a document. Opaque to the registry.
pub type UserInfo = Map<String, Value>;

/// A DID Document representing a decentralized identity.
///
/// # DID Format
/// The `id` field follows DID syntax:
/// ```text
/// did:pqc:<uuid-v4>
/// ```
///
/// # Keys
/// `public_key` holds one entry, `<did>#keys-1`, which is also the only
/// reference in `authentication`. Its `type` names the signature scheme the
/// key belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DIDDocument {
    /// The complete DID string identifier
    pub id: String,

    /// Creation time, RFC 3339 UTC
    pub created: String,

    /// Last update time, RFC 3339 UTC
    pub updated: String,

    /// Verification keys controlled by this DID
    pub public_key: Vec<VerificationKey>,

    /// Key references usable for challenge-response authentication
    pub authentication: Vec<String>,

    /// Service endpoints (always empty for now)
    pub service: Vec<Value>,

    /// Caller-supplied metadata
    pub user_info: UserInfo,
}

/// One verification key inside a [`DIDDocument`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationKey {
    /// Key reference, `<did>#keys-1`
    pub id: String,

    /// Verification key type, e.g. `MLDSAVerificationKey2024`
    #[serde(rename = "type")]
    pub key_type: String,

    /// DID that controls this key
    pub controller: String,

    /// Raw public key bytes, standard base64
    #[serde(alias = "publicKeyBase64")]
    pub public_key_encoded: String,
}

impl DIDDocument {
    /// Builds a fresh document for `did` bound to a single public key.
    ///
    /// # Arguments
    /// * `did` - Identifier the document describes
    /// * `key_type` - Verification key type of the active signature scheme
    /// * `public_key` - Raw public key bytes (encoded to base64 here)
    /// * `user_info` - Caller metadata, stored verbatim
    pub fn new(did: &str, key_type: &str, public_key: &[u8], user_info: UserInfo) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let key_id = format!("{}#{}", did, PRIMARY_KEY_FRAGMENT);

        DIDDocument {
            id: did.to_string(),
            created: now.clone(),
            updated: now,
            public_key: vec![VerificationKey {
                id: key_id.clone(),
                key_type: key_type.to_string(),
                controller: did.to_string(),
                public_key_encoded: encode_bytes(public_key),
            }],
            authentication: vec![key_id],
            service: Vec::new(),
            user_info,
        }
    }

    /// The key referenced by the first `authentication` entry.
    ///
    /// Returns `None` when the document has no authentication reference or
    /// the reference does not resolve to a listed key.
    pub fn authentication_key(&self) -> Option<&VerificationKey> {
        let key_ref = self.authentication.first()?;
        self.public_key.iter().find(|key| &key.id == key_ref)
    }
}

/// Mints a candidate identifier: `did:pqc:<uuid-v4>`.
///
/// Uniqueness against persisted documents is the registry's job; this only
/// makes collisions improbable.
pub fn generate_did() -> String {
    format!("{}:{}:{}", DID_PREFIX, DID_METHOD, Uuid::new_v4())
}

/// Checks DID syntax: `did:<method>:<suffix>` where the method is lowercase
/// alphanumeric and the suffix is non-empty without whitespace.
pub fn is_valid_did(did: &str) -> bool {
    let mut parts = did.splitn(3, ':');
    let (Some(prefix), Some(method), Some(suffix)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == DID_PREFIX
        && !method.is_empty()
        && method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && !suffix.is_empty()
        && !suffix.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice() -> UserInfo {
        let mut info = UserInfo::new();
        info.insert("name".into(), json!("Alice"));
        info
    }

    #[test]
    fn test_generate_did_format() {
        let did = generate_did();
        assert!(did.starts_with("did:pqc:"));
        assert!(is_valid_did(&did));
        assert_ne!(did, generate_did());
    }

    #[test]
    fn test_is_valid_did_rejects_malformed() {
        assert!(!is_valid_did("did:pqc:"));
        assert!(!is_valid_did("did::abc"));
        assert!(!is_valid_did("urn:pqc:abc"));
        assert!(!is_valid_did("did:PQC:abc"));
        assert!(!is_valid_did("did:pqc:a b"));
        assert!(!is_valid_did("did"));
    }

    #[test]
    fn test_document_wire_shape() {
        let doc = DIDDocument::new("did:pqc:123", "MLDSAVerificationKey2024", &[1, 2, 3], alice());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["id"], "did:pqc:123");
        assert_eq!(value["publicKey"][0]["id"], "did:pqc:123#keys-1");
        assert_eq!(value["publicKey"][0]["type"], "MLDSAVerificationKey2024");
        assert_eq!(value["publicKey"][0]["controller"], "did:pqc:123");
        assert_eq!(value["publicKey"][0]["publicKeyEncoded"], "AQID");
        assert_eq!(value["authentication"][0], "did:pqc:123#keys-1");
        assert_eq!(value["service"], json!([]));
        assert_eq!(value["userInfo"]["name"], "Alice");
        assert!(value.get("created").is_some());
        assert!(value.get("updated").is_some());
    }

    #[test]
    fn test_legacy_base64_field_is_accepted() {
        let raw = json!({
            "id": "did:pqc:1",
            "created": "2024-01-01T00:00:00Z",
            "updated": "2024-01-01T00:00:00Z",
            "publicKey": [{
                "id": "did:pqc:1#keys-1",
                "type": "MLDSAVerificationKey2024",
                "controller": "did:pqc:1",
                "publicKeyBase64": "AQID"
            }],
            "authentication": ["did:pqc:1#keys-1"],
            "service": [],
            "userInfo": {}
        });
        let doc: DIDDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.authentication_key().unwrap().public_key_encoded, "AQID");
    }

    #[test]
    fn test_authentication_key_requires_resolvable_reference() {
        let mut doc = DIDDocument::new("did:pqc:1", "Ed25519VerificationKey2020", &[9], alice());
        assert!(doc.authentication_key().is_some());

        doc.authentication = vec!["did:pqc:1#keys-2".into()];
        assert!(doc.authentication_key().is_none());
    }
}
