//! Shared test fixtures: a scripted in-memory backend and dispatcher
//! builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::time::Instant;

use ollamux::config::{Credential, ProviderConfig};
use ollamux::dispatch::{DispatchConfig, Dispatcher};
use ollamux::provider::{ProviderRegistry, ProviderSelector};
use ollamux::types::Message;
use ollamux::upstream::{ChatBackend, OptionsMap, TokenDelta};
use ollamux::{OllamuxError, Result};

/// One scripted upstream call.
pub enum Call {
    /// The call connects and replays these events in order.
    Stream(Vec<Result<TokenDelta>>),
    /// The call fails before any bytes arrive.
    ConnectFail(&'static str),
}

pub fn content(text: &str) -> Result<TokenDelta> {
    Ok(TokenDelta::Content(text.to_string()))
}

pub fn done() -> Result<TokenDelta> {
    Ok(TokenDelta::Done)
}

pub fn broken(message: &str) -> Result<TokenDelta> {
    Err(OllamuxError::Stream(message.to_string()))
}

/// A backend that replays a script, one entry per call, and records the
/// instant of every call it receives.
pub struct MockBackend {
    name: String,
    script: Mutex<VecDeque<Call>>,
    calls: Mutex<Vec<Instant>>,
}

impl MockBackend {
    pub fn new(name: &str, script: Vec<Call>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Instants at which `stream_chat` was called, in call order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_chat(
        &self,
        _model: &str,
        _messages: &[Message],
        _options: &OptionsMap,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<TokenDelta>> + Send>>> {
        self.calls.lock().unwrap().push(Instant::now());
        match self.script.lock().unwrap().pop_front() {
            None => Err(OllamuxError::Http("mock script exhausted".into())),
            Some(Call::ConnectFail(message)) => Err(OllamuxError::Http(message.to_string())),
            Some(Call::Stream(events)) => Ok(Box::pin(futures_util::stream::iter(events))),
        }
    }
}

pub fn provider_config(name: &str, rate_limit: f64, weight: u32) -> ProviderConfig {
    ProviderConfig {
        name: name.into(),
        base_url: format!("http://{name}.test/v1"),
        api_key: Credential::new("test-key"),
        rate_limit,
        weight,
        default_model: "default-model".into(),
        model_overrides: HashMap::new(),
    }
}

/// Wire mock backends to providers and build a dispatcher with a seeded
/// selector.
pub fn build_dispatcher(
    entries: Vec<(ProviderConfig, Arc<MockBackend>)>,
    seed: u64,
    max_attempts: Option<u32>,
) -> (Dispatcher, Arc<ProviderRegistry>) {
    let configs: Vec<_> = entries.iter().map(|(c, _)| c.clone()).collect();
    let registry = Arc::new(ProviderRegistry::from_configs(configs).unwrap());
    let backends: HashMap<String, Arc<dyn ChatBackend>> = entries
        .into_iter()
        .map(|(config, backend)| {
            let backend: Arc<dyn ChatBackend> = backend;
            (config.name, backend)
        })
        .collect();
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        backends,
        ProviderSelector::seeded(seed),
        DispatchConfig { max_attempts },
    );
    (dispatcher, registry)
}

/// The per-provider model map the store would produce for `model`.
pub fn model_map_for(registry: &ProviderRegistry, model: &str) -> HashMap<String, String> {
    registry
        .providers()
        .iter()
        .map(|p| (p.name().to_string(), p.model_for(model).to_string()))
        .collect()
}
