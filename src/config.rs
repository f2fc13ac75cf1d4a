use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::local_socket::default_endpoint;

pub const SECRET_ENV: &str = "MCP_BRIDGE_SECRET";
pub const TIMEOUT_ENV: &str = "MCP_BRIDGE_TIMEOUT_MS";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base64 shared secret. Absence is reported per call, not at startup.
    pub secret: Option<String>,
    pub timeout_ms: u64,
    pub endpoint: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MCP_BRIDGE_TIMEOUT_MS must be a positive number of milliseconds")]
    InvalidTimeout,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(SECRET_ENV)
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty());

        let timeout_ms = lookup(TIMEOUT_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .ok_or(ConfigError::InvalidTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Self {
            secret,
            timeout_ms,
            endpoint: default_endpoint(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
