//! Ollamux - Ollama-compatible API multiplexer
//!
//! This crate serves the local Ollama HTTP surface while forwarding chat
//! traffic to a pool of remote OpenAI-compatible providers. Each provider
//! carries its own rate limit, selection weight, and model-name overrides;
//! the dispatcher picks an eligible provider per request, reserves its
//! next rate-limit slot, and fails over on transport errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ollamux::config::{Credential, ProviderConfig};
//! use ollamux::dispatch::{DispatchConfig, Dispatcher};
//! use ollamux::provider::{ProviderRegistry, ProviderSelector};
//! use ollamux::upstream::OpenAiBackend;
//!
//! # fn main() -> ollamux::Result<()> {
//! let registry = Arc::new(ProviderRegistry::from_configs(vec![ProviderConfig {
//!     name: "openrouter".into(),
//!     base_url: "https://openrouter.ai/api/v1".into(),
//!     api_key: Credential::new("sk-or-your-key"),
//!     rate_limit: 2.0,
//!     weight: 1,
//!     default_model: "meta-llama/llama-3.2-3b-instruct:free".into(),
//!     model_overrides: Default::default(),
//! }])?);
//!
//! let dispatcher = Dispatcher::over_http(
//!     registry,
//!     OpenAiBackend::default_http_client(),
//!     ProviderSelector::new(),
//!     DispatchConfig::default(),
//! );
//! # let _ = dispatcher;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod upstream;

// Re-export main types at crate root
pub use config::Settings;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{OllamuxError, Result};
pub use provider::{Provider, ProviderRegistry, ProviderSelector};
pub use store::ModelStore;
pub use types::{ChatChunk, ChatCompletion, DoneReason, Message, Role};
