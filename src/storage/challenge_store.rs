// src/storage/challenge_store.rs
//! Challenge storage for challenge-response authentication.
//!
//! Challenges are ephemeral: they live in process memory only and are never
//! written to the ledger. The repository is injected into the registry, so a
//! shared store (e.g. across processes) can replace the in-memory one.

use crate::models::challenge::Challenge;
use chrono::{Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Why a challenge could not be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    /// No such id (never issued, or expired and evicted)
    Unknown,
    /// A verification attempt has already been made
    AlreadyConsumed,
}

/// Mapping from challenge id to [`Challenge`] with an atomic consume step.
pub trait ChallengeRepository: Send + Sync {
    /// Stores a freshly issued challenge, replacing any with the same id.
    fn insert(&self, challenge: Challenge);

    /// Checks `consumed == false` and sets it to `true` in one indivisible
    /// step, returning the challenge as it was before consumption.
    ///
    /// Of any number of concurrent calls for one id, exactly one succeeds.
    fn consume(&self, id: &str) -> Result<Challenge, ConsumeError>;

    /// Number of live (unexpired) challenges, consumed or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory challenge store with optional time-to-live.
///
/// Consumed challenges are kept until they expire so that a replay is
/// reported as reuse rather than as an unknown id. Without a TTL they are
/// kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryChallengeStore {
    challenges: Mutex<HashMap<String, Challenge>>,
    ttl: Option<Duration>,
}

impl InMemoryChallengeStore {
    /// Store whose challenges never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose challenges expire `ttl` after issue.
    pub fn with_ttl(ttl: Duration) -> Self {
        InMemoryChallengeStore {
            challenges: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Drops every expired challenge and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut challenges = self.lock();
        let before = challenges.len();
        self.evict_expired(&mut challenges);
        before - challenges.len()
    }

    /// Runs [`purge_expired`](Self::purge_expired) once per TTL period so
    /// expired challenges do not wait for the next insert. Returns `None` when
    /// the store has no TTL; without one nothing ever expires and consumed
    /// challenges are kept for the life of the process.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_purge_task(store: Arc<Self>) -> Option<JoinHandle<()>> {
        let period = store.ttl?.to_std().ok()?;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired challenges", purged);
                }
            }
        }))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Challenge>> {
        // The map holds plain values; a panic elsewhere cannot leave it half-updated.
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, challenge: &Challenge) -> bool {
        match self.ttl {
            Some(ttl) => challenge.issued_at + ttl <= Utc::now(),
            None => false,
        }
    }

    fn evict_expired(&self, challenges: &mut HashMap<String, Challenge>) {
        if self.ttl.is_some() {
            challenges.retain(|_, challenge| !self.is_expired(challenge));
        }
    }
}

impl ChallengeRepository for InMemoryChallengeStore {
    fn insert(&self, challenge: Challenge) {
        let mut challenges = self.lock();
        self.evict_expired(&mut challenges);
        challenges.insert(challenge.id.clone(), challenge);
    }

    fn consume(&self, id: &str) -> Result<Challenge, ConsumeError> {
        let mut challenges = self.lock();

        let expired = match challenges.get(id) {
            None => return Err(ConsumeError::Unknown),
            Some(challenge) => self.is_expired(challenge),
        };
        if expired {
            challenges.remove(id);
            debug!("Challenge {} expired before use", id);
            return Err(ConsumeError::Unknown);
        }

        let challenge = challenges.get_mut(id).ok_or(ConsumeError::Unknown)?;
        if challenge.consumed {
            return Err(ConsumeError::AlreadyConsumed);
        }
        let issued = challenge.clone();
        challenge.consumed = true;
        Ok(issued)
    }

    fn len(&self) -> usize {
        let challenges = self.lock();
        challenges
            .values()
            .filter(|challenge| !self.is_expired(challenge))
            .count()
    }
}
