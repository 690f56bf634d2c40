//! Configuration loading for ollamuxd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.ollamux/config.toml` (user)
//! 3. `/etc/ollamux/config.toml` (system)
//!
//! Settings are an explicit struct constructed once at startup and passed by
//! ownership into the components; there is no process-global state.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{OllamuxError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Server network and storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:11434, the port the emulated
    /// API's clients expect).
    #[serde(default = "default_address")]
    pub address: String,
    /// Path of the JSON model store file.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_path: default_store_path(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:11434".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/db.json")
}

/// Dispatch loop tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchSettings {
    /// Maximum provider attempts per request. When unset, defaults to one
    /// pass over all configured providers.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// One remote backend entry (`[[providers]]` in TOML).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, stable for the process lifetime.
    pub name: String,
    /// Base URL of the OpenAI-compatible API (e.g. `https://openrouter.ai/api/v1`).
    pub base_url: String,
    /// API key for the backend.
    pub api_key: Credential,
    /// Max requests per second this provider will accept.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    /// Relative weight among simultaneously eligible providers.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Model id used when no override matches the public name.
    pub default_model: String,
    /// Public model name → this provider's own model id.
    #[serde(default)]
    pub model_overrides: HashMap<String, String>,
}

fn default_rate_limit() -> f64 {
    2.0
}

fn default_weight() -> u32 {
    1
}

/// An API key. `Debug` redacts the value so credentials never reach logs.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret for building an Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Settings {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.ollamux/config.toml`
    /// 3. `/etc/ollamux/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            OllamuxError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            OllamuxError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(OllamuxError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ollamux").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/ollamux/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(OllamuxError::Configuration(
            "No config file found. Create ~/.ollamux/config.toml or /etc/ollamux/config.toml"
                .to_string(),
        ))
    }
}
