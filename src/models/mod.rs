// src/models/mod.rs
//! Data structures shared across the system.

pub mod block;
pub mod challenge;
pub mod did;
