// src/main.rs

//! # Decentralized Identity System - Main Entry Point
//!
//! Initializes the core components and starts the API server.
//!
//! ## Initialization Sequence
//! 1. Load `.env` and initialize logging (`RUST_LOG`, default `info`)
//! 2. Load [`Settings`] from defaults, `did-system.toml` and `DID_*` variables
//! 3. Select the signature scheme (self-tested, logged)
//! 4. Open the SQLite store and the challenge store, with its purge task
//! 5. Open the identity registry, validating the stored ledger
//! 6. Serve the API on `bind_address`

use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use pqc_did_system::config::Settings;
use pqc_did_system::services::{ApiServer, IdentityRegistry};
use pqc_did_system::storage::{InMemoryChallengeStore, SqliteStore};
use pqc_did_system::wallet::key_management::KeyManager;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let addr = settings.socket_addr()?;

    let key_manager = KeyManager::select(settings.signature_scheme()?)
        .context("No usable signature scheme")?;

    let store = SqliteStore::open(&settings.database_path)
        .with_context(|| format!("Failed to open database at {}", settings.database_path))?;

    let challenges = Arc::new(match settings.challenge_ttl() {
        Some(ttl) => InMemoryChallengeStore::with_ttl(ttl),
        None => InMemoryChallengeStore::new(),
    });
    if InMemoryChallengeStore::spawn_purge_task(Arc::clone(&challenges)).is_none() {
        warn!("Challenge expiry disabled; used challenges are kept until restart");
    }

    let registry = IdentityRegistry::open(Arc::new(key_manager), Arc::new(store), challenges)
        .context("Failed to open identity registry")?
        .with_max_did_retries(settings.max_did_retries);

    info!("Available endpoints:");
    info!("- POST /api/register_did");
    info!("- GET  /api/get_did/:did");
    info!("- POST /api/create_challenge");
    info!("- POST /api/authenticate");
    info!("- POST /api/sign_challenge");
    info!("- GET  /api/blockchain_info");
    info!("- GET  /api/health");

    ApiServer::new(Arc::new(registry))
        .run(addr)
        .await
        .context("API server stopped")?;
    Ok(())
}
