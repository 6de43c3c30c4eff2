// src/utils/mod.rs
//! Helper functions shared across layers.

pub mod crypto;
pub mod serialization;
