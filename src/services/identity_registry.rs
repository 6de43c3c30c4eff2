// src/services/identity_registry.rs
//! Identity Registry Service
//!
//! Orchestrates the DID lifecycle on top of three collaborators:
//! - a [`SignatureProvider`] for key pairs and signature checks
//! - a [`PersistenceGateway`] for documents and ledger blocks
//! - a [`ChallengeRepository`] for single-use authentication challenges
//!
//! The registry owns the in-memory [`Ledger`] and keeps it in step with the
//! persisted chain: a block joins the in-memory chain only after it has been
//! persisted, and both happen under the ledger lock.

use crate::blockchain::ledger::Ledger;
use crate::error::{CryptoError, RegistryError};
use crate::models::block::{Block, Payload};
use crate::models::challenge::Challenge;
use crate::models::did::{generate_did, is_valid_did, DIDDocument, UserInfo};
use crate::storage::{ChallengeRepository, ConsumeError, PersistenceGateway};
use crate::utils::serialization::{decode_bytes, encode_bytes};
use crate::wallet::key_management::{KeyPair, SignatureProvider};
use crate::wallet::schemes::SignatureScheme;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ledger event type recorded for every new identity.
pub const DID_CREATION_EVENT: &str = "DID_CREATION";

/// Default bound on identifier regeneration after a collision.
pub const DEFAULT_MAX_DID_RETRIES: u32 = 5;

/// Result of [`IdentityRegistry::create_identity`].
///
/// `key_pair` carries the only copy of the private key the registry ever
/// hands out.
#[derive(Debug)]
pub struct CreatedIdentity {
    pub did: String,
    pub document: DIDDocument,
    pub key_pair: KeyPair,
}

/// Result of [`IdentityRegistry::verify_challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub did: String,
}

/// Read-only view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub length: usize,
    pub is_valid: bool,
    pub latest_block: Block,
    pub full_chain: Vec<Block>,
}

type DidGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Service that issues DIDs and authenticates their holders.
pub struct IdentityRegistry {
    signer: Arc<dyn SignatureProvider>,
    store: Arc<dyn PersistenceGateway>,
    challenges: Arc<dyn ChallengeRepository>,
    ledger: Mutex<Ledger>,
    did_generator: DidGenerator,
    max_did_retries: u32,
}

impl IdentityRegistry {
    /// Opens the registry over existing storage.
    ///
    /// An empty store gets a fresh genesis block, which is persisted. A
    /// non-empty store has its chain loaded and validated.
    ///
    /// # Errors
    /// - `PersistenceError` if the chain cannot be read or genesis written
    /// - `ChainIntegrityError` if the stored chain is corrupt
    pub fn open(
        signer: Arc<dyn SignatureProvider>,
        store: Arc<dyn PersistenceGateway>,
        challenges: Arc<dyn ChallengeRepository>,
    ) -> Result<Self, RegistryError> {
        let snapshot = store.load_chain()?;

        let ledger = if snapshot.is_empty() {
            let ledger = Ledger::new();
            store.append_block(ledger.latest())?;
            info!("Started new ledger with genesis block {}", ledger.latest().hash);
            ledger
        } else {
            let ledger = Ledger::load_from(snapshot).map_err(|e| {
                error!("Stored ledger failed validation: {}", e);
                e
            })?;
            info!("Loaded ledger with {} blocks", ledger.len());
            ledger
        };

        Ok(IdentityRegistry {
            signer,
            store,
            challenges,
            ledger: Mutex::new(ledger),
            did_generator: Box::new(generate_did),
            max_did_retries: DEFAULT_MAX_DID_RETRIES,
        })
    }

    /// Caps identifier regeneration attempts (minimum 1).
    pub fn with_max_did_retries(mut self, attempts: u32) -> Self {
        self.max_did_retries = attempts.max(1);
        self
    }

    /// Replaces the identifier source, e.g. to reproduce collisions.
    pub fn with_did_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.did_generator = Box::new(generator);
        self
    }

    /// The signature scheme selected at startup.
    pub fn active_scheme(&self) -> SignatureScheme {
        self.signer.scheme()
    }

    /// Creates a new DID bound to a fresh key pair.
    ///
    /// # Process Flow
    /// 1. Mints an identifier not yet present in storage
    /// 2. Generates a key pair
    /// 3. Builds and persists the DID document
    /// 4. Appends and persists a `DID_CREATION` ledger block
    ///
    /// # Errors
    /// - `Validation` if `user_info` is empty
    /// - `Duplicate` if every candidate identifier already exists; nothing
    ///   has been written at that point
    /// - `Crypto` if key generation fails
    /// - `Persistence` if the document cannot be saved
    /// - `LedgerAppendFailed` if the document was saved but its block was not
    pub fn create_identity(&self, user_info: UserInfo) -> Result<CreatedIdentity, RegistryError> {
        if user_info.is_empty() {
            return Err(RegistryError::Validation("user information required".into()));
        }

        let did = self.mint_unique_did()?;
        let key_pair = self.signer.generate_key_pair()?;
        let document = DIDDocument::new(
            &did,
            self.signer.scheme().verification_key_type(),
            key_pair.public_key(),
            user_info.clone(),
        );

        self.store.save_document(&did, &document)?;

        let mut payload = Payload::new();
        payload.insert("type".into(), Value::from(DID_CREATION_EVENT));
        payload.insert("did".into(), Value::from(did.clone()));
        payload.insert("publicKey".into(), Value::from(encode_bytes(key_pair.public_key())));
        payload.insert("userInfo".into(), Value::Object(user_info));

        let block = self
            .lock_ledger()
            .append_with(payload, |block| self.store.append_block(block))
            .map_err(|source| {
                error!("Saved {} but could not persist its ledger block: {}", did, source);
                RegistryError::LedgerAppendFailed {
                    did: did.clone(),
                    source,
                }
            })?;

        info!("Created {} (ledger block {})", did, block.index);
        Ok(CreatedIdentity {
            did,
            document,
            key_pair,
        })
    }

    fn mint_unique_did(&self) -> Result<String, RegistryError> {
        for attempt in 1..=self.max_did_retries {
            let candidate = (self.did_generator)();
            if !is_valid_did(&candidate) {
                return Err(RegistryError::Validation(format!(
                    "generated identifier is not a DID: {}",
                    candidate
                )));
            }
            if !self.store.document_exists(&candidate)? {
                return Ok(candidate);
            }
            warn!("DID collision on attempt {}: {}", attempt, candidate);
        }

        Err(RegistryError::Duplicate {
            attempts: self.max_did_retries,
        })
    }

    /// Resolves a DID to its stored document.
    ///
    /// # Errors
    /// - `DidNotFound` if nothing is stored under `did`
    /// - `Persistence` if the lookup fails
    pub fn get_document(&self, did: &str) -> Result<DIDDocument, RegistryError> {
        self.store
            .get_document(did)?
            .ok_or_else(|| RegistryError::DidNotFound(did.to_string()))
    }

    /// Issues a single-use challenge for a registered DID.
    ///
    /// Challenges are held by the challenge repository only; no ledger entry
    /// is written.
    ///
    /// # Errors
    /// - `DidNotFound` if the DID is not registered
    pub fn issue_challenge(&self, did: &str) -> Result<Challenge, RegistryError> {
        self.get_document(did)?;

        let challenge = Challenge::issue(did)?;
        self.challenges.insert(challenge.clone());
        debug!("Issued challenge {} for {}", challenge.id, did);
        Ok(challenge)
    }

    /// Consumes a challenge and checks the holder's signature over its value.
    ///
    /// The challenge is consumed before the signature is looked at, so a
    /// failed attempt cannot be retried against the same challenge.
    ///
    /// # Returns
    /// - `authenticated: true` if the signature matches the DID's key
    /// - `authenticated: false` if it is well-formed but does not match
    ///
    /// # Errors
    /// - `ChallengeNotFound` for an unknown or expired id
    /// - `ChallengeReused` if the challenge was already consumed
    /// - `Crypto` if the signature or stored key is malformed, or the key
    ///   belongs to a scheme other than the active one
    pub fn verify_challenge(&self, challenge_id: &str, signature: &[u8]) -> Result<AuthOutcome, RegistryError> {
        let challenge = self.challenges.consume(challenge_id).map_err(|e| match e {
            ConsumeError::Unknown => RegistryError::ChallengeNotFound(challenge_id.to_string()),
            ConsumeError::AlreadyConsumed => RegistryError::ChallengeReused(challenge_id.to_string()),
        })?;
        debug!("Consumed challenge {} for {}", challenge.id, challenge.did);

        let document = self.get_document(&challenge.did)?;
        let key = document.authentication_key().ok_or_else(|| {
            CryptoError::DecodeError(format!("{} has no authentication key", challenge.did))
        })?;

        let active = self.signer.scheme();
        if key.key_type != active.verification_key_type() {
            return Err(CryptoError::SchemeMismatch {
                registered: key.key_type.clone(),
                active: active.verification_key_type().to_string(),
            }
            .into());
        }

        let public_key = decode_bytes(&key.public_key_encoded)
            .map_err(|e| CryptoError::DecodeError(format!("stored public key: {}", e)))?;
        let authenticated = self
            .signer
            .verify(challenge.value.as_bytes(), signature, &public_key)?;

        if authenticated {
            info!("Authenticated {}", challenge.did);
        } else {
            warn!("Signature mismatch for {} on challenge {}", challenge.did, challenge.id);
        }

        Ok(AuthOutcome {
            authenticated,
            did: challenge.did,
        })
    }

    /// Signs `message` with a caller-held private key. Helper for clients and
    /// tests; the registry never stores the key.
    pub fn sign_challenge(&self, message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, RegistryError> {
        Ok(self.signer.sign(message, private_key)?)
    }

    /// Challenges currently held, used or not, that have not expired.
    pub fn pending_challenges(&self) -> usize {
        self.challenges.len()
    }

    /// Length, validity, tail and full contents of the ledger.
    pub fn get_ledger_summary(&self) -> LedgerSummary {
        let ledger = self.lock_ledger();
        LedgerSummary {
            length: ledger.len(),
            is_valid: ledger.is_valid(),
            latest_block: ledger.latest().clone(),
            full_chain: ledger.blocks().to_vec(),
        }
    }

    fn lock_ledger(&self) -> MutexGuard<'_, Ledger> {
        // append_with only pushes after persistence succeeds, so a poisoned
        // lock still guards a consistent chain.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IntegrityFault, PersistenceError};
    use crate::storage::{InMemoryChallengeStore, MemoryStore};
    use crate::wallet::key_management::KeyManager;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn alice() -> UserInfo {
        let mut info = UserInfo::new();
        info.insert("name".into(), json!("Alice"));
        info
    }

    fn signer() -> Arc<dyn SignatureProvider> {
        Arc::new(KeyManager::with_scheme(SignatureScheme::Ed25519).unwrap())
    }

    fn registry_over(store: Arc<MemoryStore>) -> IdentityRegistry {
        IdentityRegistry::open(signer(), store, Arc::new(InMemoryChallengeStore::new())).unwrap()
    }

    fn registry() -> (IdentityRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (registry_over(Arc::clone(&store)), store)
    }

    /// Accepts documents but refuses every block after genesis.
    struct BlockRejectingStore {
        inner: MemoryStore,
    }

    impl PersistenceGateway for BlockRejectingStore {
        fn save_document(&self, did: &str, document: &DIDDocument) -> Result<(), PersistenceError> {
            self.inner.save_document(did, document)
        }
        fn get_document(&self, did: &str) -> Result<Option<DIDDocument>, PersistenceError> {
            self.inner.get_document(did)
        }
        fn document_exists(&self, did: &str) -> Result<bool, PersistenceError> {
            self.inner.document_exists(did)
        }
        fn append_block(&self, block: &Block) -> Result<(), PersistenceError> {
            if block.index == 0 {
                self.inner.append_block(block)
            } else {
                Err(PersistenceError::Unavailable("disk full".into()))
            }
        }
        fn load_chain(&self) -> Result<Vec<Block>, PersistenceError> {
            self.inner.load_chain()
        }
    }

    #[test]
    fn test_open_persists_genesis() {
        let (registry, store) = registry();
        let summary = registry.get_ledger_summary();

        assert_eq!(summary.length, 1);
        assert!(summary.is_valid);
        assert_eq!(summary.latest_block.index, 0);
        assert_eq!(store.load_chain().unwrap(), summary.full_chain);
    }

    #[test]
    fn test_alice_authenticates() {
        let (registry, _) = registry();
        let created = registry.create_identity(alice()).unwrap();
        assert_eq!(created.document.user_info["name"], "Alice");

        let challenge = registry.issue_challenge(&created.did).unwrap();
        let signature = registry
            .sign_challenge(challenge.value.as_bytes(), created.key_pair.private_key())
            .unwrap();

        let outcome = registry.verify_challenge(&challenge.id, &signature).unwrap();
        assert_eq!(
            outcome,
            AuthOutcome {
                authenticated: true,
                did: created.did.clone(),
            }
        );
    }

    #[test]
    fn test_create_identity_side_effects() {
        let (registry, store) = registry();
        let created = registry.create_identity(alice()).unwrap();

        assert_eq!(store.document_count(), 1);
        assert_eq!(registry.get_document(&created.did).unwrap(), created.document);

        let summary = registry.get_ledger_summary();
        assert_eq!(summary.length, 2);
        let block = &summary.latest_block;
        assert_eq!(block.event_type(), Some(DID_CREATION_EVENT));
        assert_eq!(block.payload["did"], json!(created.did));
        assert_eq!(
            block.payload["publicKey"],
            json!(encode_bytes(created.key_pair.public_key()))
        );
        assert_eq!(block.payload["userInfo"], json!({"name": "Alice"}));
        assert_eq!(store.load_chain().unwrap().len(), 2);

        let key = created.document.authentication_key().unwrap();
        assert_eq!(key.key_type, registry.active_scheme().verification_key_type());
    }

    #[test]
    fn test_sequential_identities_are_distinct() {
        let (registry, _) = registry();
        let a = registry.create_identity(alice()).unwrap();
        let b = registry.create_identity(alice()).unwrap();
        assert_ne!(a.did, b.did);
        assert_ne!(a.key_pair.public_key(), b.key_pair.public_key());
    }

    #[test]
    fn test_empty_user_info_is_rejected() {
        let (registry, store) = registry();
        assert!(matches!(
            registry.create_identity(UserInfo::new()),
            Err(RegistryError::Validation(_))
        ));
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn test_crafted_duplicate_is_rejected_before_mutation() {
        let (registry, store) = registry();
        let existing = registry.create_identity(alice()).unwrap().did;
        let registry = registry
            .with_max_did_retries(3)
            .with_did_generator(move || existing.clone());

        let before = registry.get_ledger_summary();
        let err = registry.create_identity(alice()).unwrap_err();

        assert!(matches!(err, RegistryError::Duplicate { attempts: 3 }));
        assert_eq!(store.document_count(), 1);
        assert_eq!(registry.get_ledger_summary(), before);
    }

    #[test]
    fn test_collision_is_retried() {
        let (registry, _) = registry();
        let existing = registry.create_identity(alice()).unwrap().did;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = registry.with_did_generator(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                existing.clone()
            } else {
                "did:pqc:second-try".to_string()
            }
        });

        let created = registry.create_identity(alice()).unwrap();
        assert_eq!(created.did, "did:pqc:second-try");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mismatched_signature_is_not_an_error() {
        let (registry, _) = registry();
        let alice = registry.create_identity(alice()).unwrap();
        let mut bob_info = UserInfo::new();
        bob_info.insert("name".into(), json!("Bob"));
        let bob = registry.create_identity(bob_info).unwrap();

        let challenge = registry.issue_challenge(&alice.did).unwrap();
        let forged = registry
            .sign_challenge(challenge.value.as_bytes(), bob.key_pair.private_key())
            .unwrap();

        let outcome = registry.verify_challenge(&challenge.id, &forged).unwrap();
        assert!(!outcome.authenticated);
        assert_eq!(outcome.did, alice.did);
    }

    #[test]
    fn test_malformed_signature_is_a_crypto_error_and_consumes() {
        let (registry, _) = registry();
        let created = registry.create_identity(alice()).unwrap();
        let challenge = registry.issue_challenge(&created.did).unwrap();

        assert!(matches!(
            registry.verify_challenge(&challenge.id, &[0u8; 3]),
            Err(RegistryError::Crypto(CryptoError::DecodeError(_)))
        ));
        assert!(matches!(
            registry.verify_challenge(&challenge.id, &[0u8; 3]),
            Err(RegistryError::ChallengeReused(_))
        ));
    }

    #[test]
    fn test_malformed_signature_on_default_scheme() {
        let registry = IdentityRegistry::open(
            Arc::new(KeyManager::select(None).unwrap()),
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryChallengeStore::new()),
        )
        .unwrap();
        let created = registry.create_identity(alice()).unwrap();

        for malformed in [&[][..], &[0u8; 3][..]] {
            let challenge = registry.issue_challenge(&created.did).unwrap();
            assert!(
                matches!(
                    registry.verify_challenge(&challenge.id, malformed),
                    Err(RegistryError::Crypto(CryptoError::DecodeError(_)))
                ),
                "{} accepted a {}-byte signature",
                registry.active_scheme(),
                malformed.len()
            );
        }
    }

    #[test]
    fn test_challenge_cannot_be_reused() {
        let (registry, _) = registry();
        let created = registry.create_identity(alice()).unwrap();
        let challenge = registry.issue_challenge(&created.did).unwrap();
        let signature = registry
            .sign_challenge(challenge.value.as_bytes(), created.key_pair.private_key())
            .unwrap();

        assert!(registry.verify_challenge(&challenge.id, &signature).unwrap().authenticated);
        assert!(matches!(
            registry.verify_challenge(&challenge.id, &signature),
            Err(RegistryError::ChallengeReused(_))
        ));
    }

    #[test]
    fn test_unknown_challenge_is_not_found() {
        let (registry, _) = registry();
        let err = registry.verify_challenge("no-such-challenge", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, RegistryError::ChallengeNotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_challenge_for_unknown_did() {
        let (registry, _) = registry();
        let err = registry.issue_challenge("did:pqc:nobody").unwrap_err();
        assert!(matches!(err, RegistryError::DidNotFound(_)));
        assert!(matches!(
            registry.get_document("did:pqc:nobody"),
            Err(RegistryError::DidNotFound(_))
        ));
    }

    #[test]
    fn test_challenge_issue_leaves_ledger_alone() {
        let (registry, _) = registry();
        let created = registry.create_identity(alice()).unwrap();
        let before = registry.get_ledger_summary().length;
        registry.issue_challenge(&created.did).unwrap();
        assert_eq!(registry.get_ledger_summary().length, before);
        assert_eq!(registry.pending_challenges(), 1);
    }

    #[test]
    fn test_concurrent_verification_has_one_winner() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let created = registry.create_identity(alice()).unwrap();
        let challenge = registry.issue_challenge(&created.did).unwrap();
        let signature = registry
            .sign_challenge(challenge.value.as_bytes(), created.key_pair.private_key())
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = challenge.id.clone();
                let signature = signature.clone();
                thread::spawn(move || registry.verify_challenge(&id, &signature))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(RegistryError::ChallengeReused(_))))
                .count(),
            1
        );
    }

    #[test]
    fn test_concurrent_creation_keeps_chain_valid() {
        let (registry, store) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut info = UserInfo::new();
                    info.insert("n".into(), json!(i));
                    registry.create_identity(info).unwrap().did
                })
            })
            .collect();
        let dids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let summary = registry.get_ledger_summary();
        assert_eq!(summary.length, 9);
        assert!(summary.is_valid);
        assert_eq!(store.document_count(), dids.len());
        assert!(Ledger::load_from(store.load_chain().unwrap()).is_ok());
    }

    #[test]
    fn test_reopen_restores_chain_and_documents() {
        let store = Arc::new(MemoryStore::new());
        let first = registry_over(Arc::clone(&store));
        let created = first.create_identity(alice()).unwrap();
        let chain = first.get_ledger_summary().full_chain;
        drop(first);

        let second = registry_over(Arc::clone(&store));
        assert_eq!(second.get_ledger_summary().full_chain, chain);
        assert_eq!(second.get_document(&created.did).unwrap(), created.document);
    }

    #[test]
    fn test_open_rejects_tampered_chain() {
        let (registry, _) = registry();
        registry.create_identity(alice()).unwrap();
        registry.create_identity(alice()).unwrap();
        let mut blocks = registry.get_ledger_summary().full_chain;
        blocks[1].payload.insert("userInfo".into(), json!({"name": "Mallory"}));

        let tampered = Arc::new(MemoryStore::with_chain(blocks));
        let result = IdentityRegistry::open(signer(), tampered, Arc::new(InMemoryChallengeStore::new()));

        match result {
            Err(RegistryError::ChainIntegrity(e)) => {
                assert_eq!(e.index, 1);
                assert_eq!(e.fault, IntegrityFault::HashMismatch);
            }
            other => panic!("expected integrity error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_block_failure_after_document_save_is_surfaced() {
        let store = Arc::new(BlockRejectingStore {
            inner: MemoryStore::new(),
        });
        let registry =
            IdentityRegistry::open(signer(), store.clone(), Arc::new(InMemoryChallengeStore::new())).unwrap();

        match registry.create_identity(alice()) {
            Err(RegistryError::LedgerAppendFailed { did, .. }) => {
                assert!(store.inner.document_exists(&did).unwrap());
            }
            other => panic!("expected partial failure, got {:?}", other.map(|c| c.did)),
        }
        assert_eq!(registry.get_ledger_summary().length, 1);
    }

    #[test]
    fn test_foreign_scheme_key_is_a_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let challenges = Arc::new(InMemoryChallengeStore::new());
        let ed = IdentityRegistry::open(
            signer(),
            store.clone(),
            challenges.clone(),
        )
        .unwrap();
        let created = ed.create_identity(alice()).unwrap();
        drop(ed);

        let active = KeyManager::select(None).unwrap();
        if active.scheme() == SignatureScheme::Ed25519 {
            return;
        }
        let registry = IdentityRegistry::open(Arc::new(active), store, challenges).unwrap();
        let challenge = registry.issue_challenge(&created.did).unwrap();
        assert!(matches!(
            registry.verify_challenge(&challenge.id, &[0u8; 64]),
            Err(RegistryError::Crypto(CryptoError::SchemeMismatch { .. }))
        ));
    }
}
