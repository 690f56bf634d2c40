//! JSON-file model store.
//!
//! Holds the emulated API's model table, the running-model bookkeeping, and
//! the public-name → canonical-model mapping table. The whole store lives
//! in one pretty-printed JSON file; a single coarse async mutex spans every
//! read-modify-write so each call is atomic, and mutations rewrite the
//! file before returning.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::provider::ProviderRegistry;
use crate::{OllamuxError, Result};

/// One model entry; created on create/copy, removed on delete, otherwise
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub digest: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// A model currently "loaded" (the emulation keeps these alive by sliding
/// their expiry forward on every read).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningModel {
    pub name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(rename = "models_db", default)]
    models: BTreeMap<String, ModelEntry>,
    #[serde(rename = "running_models", default)]
    running: BTreeMap<String, RunningModel>,
    #[serde(rename = "model_mappings", default)]
    mappings: BTreeMap<String, String>,
}

/// The JSON-file model registry.
#[derive(Debug)]
pub struct ModelStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl ModelStore {
    /// Open the store, creating a fresh file seeded with the default
    /// mapping table when none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                OllamuxError::Store(format!("failed to parse store file {path:?}: {e}"))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "store file not found, creating a new one");
                let state = StoreState {
                    mappings: default_mappings(),
                    ..Default::default()
                };
                write_state(&path, &state)?;
                state
            }
            Err(e) => {
                return Err(OllamuxError::Store(format!(
                    "failed to read store file {path:?}: {e}"
                )));
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// All model entries, in name order.
    pub async fn list_models(&self) -> Vec<ModelEntry> {
        self.state.lock().await.models.values().cloned().collect()
    }

    pub async fn get_model(&self, name: &str) -> Option<ModelEntry> {
        self.state.lock().await.models.get(name).cloned()
    }

    /// Insert (or replace) a model entry and persist.
    pub async fn insert_model(&self, entry: ModelEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        state.models.insert(entry.name.clone(), entry);
        write_state(&self.path, &state)
    }

    /// Copy an entry under a new name. Returns false when the source is
    /// unknown.
    pub async fn copy_model(&self, source: &str, destination: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(mut entry) = state.models.get(source).cloned() else {
            return Ok(false);
        };
        entry.name = destination.to_string();
        entry.modified_at = Utc::now();
        state.models.insert(destination.to_string(), entry);
        write_state(&self.path, &state)?;
        Ok(true)
    }

    /// Remove an entry. Returns false when it was not present.
    pub async fn remove_model(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.models.remove(name).is_none() {
            return Ok(false);
        }
        write_state(&self.path, &state)?;
        Ok(true)
    }

    /// Running models, with every expiry slid forward five minutes from
    /// now (the emulation never actually unloads anything).
    pub async fn running_models(&self) -> Result<Vec<RunningModel>> {
        let mut state = self.state.lock().await;
        if !state.running.is_empty() {
            let expires = Utc::now() + ChronoDuration::minutes(5);
            for model in state.running.values_mut() {
                match model.expires_at {
                    Some(at) if at > Utc::now() => {}
                    _ => model.expires_at = Some(expires),
                }
            }
            write_state(&self.path, &state)?;
        }
        Ok(state.running.values().cloned().collect())
    }

    /// Mark a model as running and persist.
    pub async fn update_running_model(&self, model: RunningModel) -> Result<()> {
        let mut state = self.state.lock().await;
        state.running.insert(model.name.clone(), model);
        write_state(&self.path, &state)
    }

    /// Resolve a public model name into a per-provider model map.
    ///
    /// A model is *known* when the store lists it, the mapping table names
    /// it, or any provider carries an explicit override for it; anything
    /// else short-circuits with [`OllamuxError::ModelNotMapped`] before the
    /// dispatch loop ever runs. For known models the map holds one entry
    /// per provider: its override if present, otherwise its default model.
    pub async fn resolve_model_mapping(
        &self,
        public_model: &str,
        registry: &ProviderRegistry,
    ) -> Result<HashMap<String, String>> {
        let state = self.state.lock().await;
        let known = state.models.contains_key(public_model)
            || state.mappings.contains_key(public_model)
            || registry
                .providers()
                .iter()
                .any(|p| p.has_override(public_model));
        if !known {
            return Err(OllamuxError::ModelNotMapped(public_model.to_string()));
        }
        Ok(registry
            .providers()
            .iter()
            .map(|p| (p.name().to_string(), p.model_for(public_model).to_string()))
            .collect())
    }
}

fn write_state(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OllamuxError::Store(format!("failed to create store directory {parent:?}: {e}"))
            })?;
        }
    }
    let json = serde_json::to_vec_pretty(state)?;
    std::fs::write(path, json)
        .map_err(|e| OllamuxError::Store(format!("failed to write store file {path:?}: {e}")))
}

/// Seed mapping table for a fresh store, mirroring the names local
/// clients ask for most often.
fn default_mappings() -> BTreeMap<String, String> {
    [
        ("llama2", "meta-llama/llama-3.2-3b-instruct:free"),
        ("mistral", "mistralai/mistral-7b"),
        ("codellama", "meta-llama/codellama-34b"),
        ("mixtral", "mistralai/mixtral-8x7b"),
        ("neural-chat", "anthropic/claude-3-opus"),
        ("openchat", "openchat/openchat-7b"),
        ("phi", "microsoft/phi-2"),
        ("qwen", "qwen/qwen-72b"),
        ("stable-beluga", "stabilityai/stable-beluga-7b"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
