// src/blockchain/mod.rs
//! Tamper-evident ledger of identity events.

pub mod ledger;
