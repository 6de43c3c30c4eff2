// src/config.rs
//! Runtime configuration.
//!
//! Layered with the `config` crate, lowest precedence first:
//! 1. built-in defaults
//! 2. optional `did-system.toml` in the working directory
//! 3. `DID_*` environment variables (e.g. `DID_BIND_ADDRESS`)
//!
//! `.env` is loaded by the binary before [`Settings::load`] runs, so its
//! entries behave like real environment variables.

use crate::services::identity_registry::DEFAULT_MAX_DID_RETRIES;
use crate::wallet::schemes::SignatureScheme;
use chrono::Duration;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5000";
pub const DEFAULT_DATABASE_PATH: &str = "did_blockchain.db";
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;

const CONFIG_FILE: &str = "did-system";
const ENV_PREFIX: &str = "DID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid signature_scheme '{0}'")]
    InvalidScheme(String),

    #[error("Invalid bind_address '{value}': {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("max_did_retries must be at least 1")]
    InvalidRetries,
}

/// Validated application settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    pub database_path: String,
    #[serde(default)]
    pub signature_scheme: Option<String>,
    pub challenge_ttl_secs: u64,
    pub max_did_retries: u32,
}

impl Settings {
    /// Loads settings from defaults, `did-system.toml` and the environment.
    ///
    /// # Errors
    /// `ConfigError` if a source cannot be read or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&[])
    }

    /// Like [`Settings::load`], with `overrides` taking precedence over every
    /// other source.
    pub fn load_with_overrides(overrides: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind_address", DEFAULT_BIND_ADDRESS)?
            .set_default("database_path", DEFAULT_DATABASE_PATH)?
            .set_default("challenge_ttl_secs", DEFAULT_CHALLENGE_TTL_SECS as i64)?
            .set_default("max_did_retries", DEFAULT_MAX_DID_RETRIES as i64)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.signature_scheme()?;
        self.socket_addr()?;
        if self.max_did_retries == 0 {
            return Err(ConfigError::InvalidRetries);
        }
        Ok(())
    }

    /// The pinned signature scheme, or `None` to auto-select.
    pub fn signature_scheme(&self) -> Result<Option<SignatureScheme>, ConfigError> {
        match self.signature_scheme.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => name
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidScheme(name.to_string())),
        }
    }

    /// Challenge lifetime; `None` when expiry is disabled.
    pub fn challenge_ttl(&self) -> Option<Duration> {
        match self.challenge_ttl_secs {
            0 => None,
            secs => Some(Duration::seconds(secs as i64)),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|source| ConfigError::InvalidAddress {
                value: self.bind_address.clone(),
                source,
            })
    }
}
