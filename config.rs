//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating pqvault settings
//! from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `PQVAULT_IDENTITY_PATH`: Override identity file path
//! - `PQVAULT_STORAGE_DIR`: Override container storage directory
//! - `PQVAULT_CONFIG`: Override config file path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::kdf::KdfParams;

/// Environment variable names for configuration overrides
pub const ENV_IDENTITY_PATH: &str = "PQVAULT_IDENTITY_PATH";
pub const ENV_STORAGE_DIR: &str = "PQVAULT_STORAGE_DIR";
pub const ENV_CONFIG_PATH: &str = "PQVAULT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub identity_path: String,
    pub storage_dir: String,
    /// Argon2id cost. Must stay identical for the lifetime of an identity.
    #[serde(default)]
    pub kdf: KdfParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_path: "./pqvault.identity.json".to_string(),
            storage_dir: "./storage".to_string(),
            kdf: KdfParams::default(),
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config = serde_json::from_str(&s)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s)?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(identity_path) = env::var(ENV_IDENTITY_PATH) {
            debug!(identity_path = %identity_path, "overriding identity_path from environment");
            self.identity_path = identity_path;
        }

        if let Ok(storage_dir) = env::var(ENV_STORAGE_DIR) {
            debug!(storage_dir = %storage_dir, "overriding storage_dir from environment");
            self.storage_dir = storage_dir;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity_path.trim().is_empty() {
            anyhow::bail!("identity_path cannot be empty");
        }

        if self.storage_dir.trim().is_empty() {
            anyhow::bail!("storage_dir cannot be empty");
        }

        self.kdf.validate()?;

        if self.kdf != KdfParams::default() {
            warn!(
                mem_cost_kib = self.kdf.mem_cost_kib,
                time_cost = self.kdf.time_cost,
                "non-default kdf parameters; identities sealed with them are not portable"
            );
        }

        let identity_path = Path::new(&self.identity_path);
        if let Some(parent) = identity_path.parent() {
            let parent_str = parent.to_string_lossy().to_lowercase();
            if parent_str.contains("public")
                || parent_str.contains("www")
                || parent_str.contains("htdocs")
            {
                warn!(
                    path = %self.identity_path,
                    "identity file path appears to be in a public directory"
                );
            }
        }

        if self.identity_path.contains("..") {
            warn!("identity_path contains '..' - consider using absolute paths");
        }

        Ok(())
    }

    /// Create a new config with explicit values and format-default kdf
    pub fn new(identity_path: impl Into<String>, storage_dir: impl Into<String>) -> Self {
        Self {
            identity_path: identity_path.into(),
            storage_dir: storage_dir.into(),
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}
