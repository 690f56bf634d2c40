//! Provider registry: the in-memory set of remote backends.
//!
//! The registry is loaded once at startup and its set of providers never
//! changes afterwards. The only mutable state per provider is the timestamp
//! of its most recent reserved rate-limit slot, guarded by a per-provider
//! mutex so the check-eligibility-then-stamp sequence is atomic with
//! respect to concurrent dispatch tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{Credential, ProviderConfig};
use crate::{OllamuxError, Result};

/// One configured remote backend.
pub struct Provider {
    name: String,
    base_url: String,
    credential: Credential,
    /// Minimum interval between successive requests (`1 / rate_limit`).
    interval: Duration,
    weight: u32,
    default_model: String,
    model_overrides: HashMap<String, String>,
    /// Timestamp of the most recently reserved slot. `None` until the first
    /// reservation. The lock spans every read-decide-stamp sequence.
    last_request: Mutex<Option<Instant>>,
}

impl Provider {
    /// Build a provider from its config entry, validating the invariants
    /// that must hold before any rate-limit arithmetic runs.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(OllamuxError::Configuration(
                "provider name must not be empty".into(),
            ));
        }
        if !config.rate_limit.is_finite() || config.rate_limit <= 0.0 {
            return Err(OllamuxError::Configuration(format!(
                "provider '{}': rate_limit must be a positive number, got {}",
                config.name, config.rate_limit
            )));
        }
        if config.weight == 0 {
            return Err(OllamuxError::Configuration(format!(
                "provider '{}': weight must be at least 1",
                config.name
            )));
        }
        Ok(Self {
            name: config.name,
            base_url: config.base_url,
            credential: config.api_key,
            interval: Duration::from_secs_f64(1.0 / config.rate_limit),
            weight: config.weight,
            default_model: config.default_model,
            model_overrides: config.model_overrides,
            last_request: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Minimum interval between successive requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// This provider's model id for a public model name, falling back to
    /// the default model when no override exists.
    pub fn model_for(&self, public_model: &str) -> &str {
        self.model_overrides
            .get(public_model)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }

    /// Whether an explicit override exists for a public model name.
    pub fn has_override(&self, public_model: &str) -> bool {
        self.model_overrides.contains_key(public_model)
    }

    /// Remaining cooldown before this provider may legally be called again.
    /// Zero means eligible now.
    pub fn wait_at(&self, now: Instant) -> Duration {
        let last = self.last_request.lock().expect("provider lock poisoned");
        match *last {
            None => Duration::ZERO,
            Some(prev) => self.interval.saturating_sub(now.duration_since(prev)),
        }
    }

    /// The instant at which this provider next becomes eligible.
    pub fn next_slot(&self, now: Instant) -> Instant {
        let last = self.last_request.lock().expect("provider lock poisoned");
        match *last {
            None => now,
            Some(prev) => prev + self.interval,
        }
    }

    /// Atomically claim this provider's next rate-limit slot and return how
    /// long the caller must wait before issuing the request.
    ///
    /// The slot is stamped *before* the upstream call is made, so a slow
    /// call cannot let a concurrent dispatch task slip inside the same
    /// rate-limit window. Two concurrent reservations always receive slots
    /// at least `interval` apart.
    pub fn reserve(&self, now: Instant) -> Duration {
        let mut last = self.last_request.lock().expect("provider lock poisoned");
        let slot = match *last {
            None => now,
            Some(prev) => std::cmp::max(prev + self.interval, now),
        };
        *last = Some(slot);
        slot.duration_since(now)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("interval", &self.interval)
            .field("weight", &self.weight)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

/// The full provider set, in configuration order.
///
/// Registry order is the deterministic tie-break for the selector, so it is
/// preserved exactly as configured.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
}

impl ProviderRegistry {
    /// Build the registry from config entries. Fails fast on any malformed
    /// entry, duplicate name, or an empty provider list.
    pub fn from_configs(configs: Vec<ProviderConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(OllamuxError::Configuration(
                "no providers configured".into(),
            ));
        }
        let mut providers = Vec::with_capacity(configs.len());
        for config in configs {
            let provider = Provider::new(config)?;
            if providers
                .iter()
                .any(|p: &Arc<Provider>| p.name() == provider.name())
            {
                return Err(OllamuxError::Configuration(format!(
                    "duplicate provider name '{}'",
                    provider.name()
                )));
            }
            providers.push(Arc::new(provider));
        }
        Ok(Self { providers })
    }

    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Provider>> {
        self.providers.iter().find(|p| p.name() == name)
    }
}
