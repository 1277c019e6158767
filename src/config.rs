//! Configuration management for vaultgate.
//!
//! Configuration can be set via environment variables:
//! - `VAULTGATE_RP_ID` - Optional. WebAuthn relying-party id (domain). Defaults to `localhost`.
//! - `VAULTGATE_ORIGIN` - Optional. Expected origin (scheme + host) checked for strict
//!   equality during verification. Defaults to `http://localhost:<port>`.
//! - `VAULTGATE_HOST` - Optional. Listen address. Defaults to `0.0.0.0`.
//! - `VAULTGATE_PORT` - Optional. Listen port. Defaults to `8091`.
//! - `VAULTGATE_STORAGE_DIR` - Optional. Directory for the persisted credential and
//!   pending-operation documents. Defaults to `$HOME/.vaultgate`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebAuthn relying-party id (the domain ceremonies are scoped to)
    pub rp_id: String,

    /// Expected origin, compared for strict equality during verification
    pub origin: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory holding the persisted state documents
    pub storage_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("VAULTGATE_PORT")
            .unwrap_or_else(|_| "8091".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("VAULTGATE_PORT".to_string(), format!("{}", e))
            })?;

        let rp_id = std::env::var("VAULTGATE_RP_ID").unwrap_or_else(|_| "localhost".to_string());

        let origin = std::env::var("VAULTGATE_ORIGIN")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let host = std::env::var("VAULTGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let storage_dir = std::env::var("VAULTGATE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(crate::util::home_dir()).join(".vaultgate"));

        Ok(Self {
            rp_id,
            origin,
            host,
            port,
            storage_dir,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(rp_id: String, origin: String, storage_dir: PathBuf) -> Self {
        Self {
            rp_id,
            origin,
            host: "127.0.0.1".to_string(),
            port: 8091,
            storage_dir,
        }
    }

    /// Path of the persisted credentials document.
    pub fn credentials_file(&self) -> PathBuf {
        self.storage_dir.join("webauthn-credentials.json")
    }

    /// Path of the persisted pending-operations document.
    pub fn pending_ops_file(&self) -> PathBuf {
        self.storage_dir.join("pending-operations.json")
    }
}
