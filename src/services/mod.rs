// src/services/mod.rs
//! Application services: the identity registry and its HTTP front end.

pub mod api_server;
pub mod identity_registry;

pub use api_server::ApiServer;
pub use identity_registry::{AuthOutcome, CreatedIdentity, IdentityRegistry, LedgerSummary};
