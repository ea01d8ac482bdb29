//! Bridge configuration
//!
//! Settings resolve in three layers: built-in defaults, an optional
//! JSON config file, then `GALLEY_*` environment variables on top.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// TCP address of the gateway adapter.
pub const ENV_GATEWAY_ADDR: &str = "GALLEY_GATEWAY_ADDR";
/// HTTP endpoint of the gateway adapter, for hosts that only speak HTTP.
pub const ENV_GATEWAY_URL: &str = "GALLEY_GATEWAY_URL";
/// Command line (whitespace-split) spawning a stdio bridge adapter.
pub const ENV_BRIDGE_CMD: &str = "GALLEY_BRIDGE_CMD";
/// Client name reported in the gateway handshake.
pub const ENV_CLIENT_NAME: &str = "GALLEY_CLIENT_NAME";
/// Seconds after which a host evaluation logs a slow-call warning.
pub const ENV_SLOW_EVAL_SECS: &str = "GALLEY_SLOW_EVAL_SECS";

/// How the bridge finds and talks to the host gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// TCP address (`host:port`) of the gateway adapter.
    pub gateway_addr: String,
    /// HTTP endpoint; when set it wins over the TCP address.
    pub gateway_url: Option<String>,
    /// Command line for spawning a stdio adapter; when set it wins
    /// over both network transports.
    pub bridge_command: Option<Vec<String>>,
    /// Client name sent in the gateway handshake.
    pub client_name: String,
    /// Evaluations running longer than this many seconds log a warning.
    pub slow_eval_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gateway_addr: "127.0.0.1:8463".to_string(),
            gateway_url: None,
            bridge_command: None,
            client_name: "galley".to_string(),
            slow_eval_secs: 30,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `GALLEY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `GALLEY_*` environment overrides to this config.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Split out of
    /// [`BridgeConfig::apply_env`] so tests do not mutate the process
    /// environment.
    pub fn apply_env_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = get(ENV_GATEWAY_ADDR) {
            self.gateway_addr = addr;
        }
        if let Some(url) = get(ENV_GATEWAY_URL) {
            self.gateway_url = Some(url);
        }
        if let Some(command) = get(ENV_BRIDGE_CMD) {
            let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
            if !parts.is_empty() {
                self.bridge_command = Some(parts);
            }
        }
        if let Some(name) = get(ENV_CLIENT_NAME) {
            self.client_name = name;
        }
        if let Some(secs) = get(ENV_SLOW_EVAL_SECS)
            && let Ok(secs) = secs.parse()
        {
            self.slow_eval_secs = secs;
        }
    }

    /// Load a config file (JSON).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write this config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// The slow-evaluation warning threshold as a [`Duration`].
    pub fn slow_eval_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_eval_secs)
    }
}

static DEFAULT_CONFIG: Lazy<RwLock<BridgeConfig>> =
    Lazy::new(|| RwLock::new(BridgeConfig::from_env()));

/// Snapshot of the process-wide default config (environment-seeded).
pub fn default_config() -> BridgeConfig {
    DEFAULT_CONFIG.read().clone()
}

/// Replace the process-wide default config.
pub fn set_default_config(config: BridgeConfig) {
    *DEFAULT_CONFIG.write() = config;
}
