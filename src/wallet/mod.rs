// src/wallet/mod.rs
//! Signature key material and the signature provider.

pub mod key_management;
pub mod schemes;
