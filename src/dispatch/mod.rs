//! The dispatch loop: select, rate-limit, call, fail over.
//!
//! Each inbound chat request drives one [`Dispatcher::dispatch_stream`]
//! call on its own task. The loop asks the selector for a provider,
//! atomically reserves that provider's next rate-limit slot, issues the
//! upstream call, and re-emits the backend's deltas as normalized
//! [`ChatChunk`]s. Any transport failure abandons the provider and
//! reselects, up to the attempt cap; exhaustion surfaces as a terminal
//! `done_reason="error"` chunk so the response shape survives failure.
//!
//! The stream is lazily driven in the caller's task: dropping it cancels
//! the outstanding upstream call and aborts the retry loop.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::provider::{ProviderRegistry, ProviderSelector};
use crate::telemetry;
use crate::types::{ChatChunk, ChatCompletion, DoneReason, Message};
use crate::upstream::{ChatBackend, OpenAiBackend, OptionsMap, TokenDelta};
use crate::OllamuxError;

/// Per-request provider-name → provider-model-id table, produced by the
/// model store before dispatch begins.
pub type ModelMap = HashMap<String, String>;

/// Dispatch loop tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchConfig {
    /// Maximum provider attempts per request. `None` = one pass over all
    /// configured providers.
    pub max_attempts: Option<u32>,
}

impl DispatchConfig {
    fn effective_attempts(&self, provider_count: usize) -> u32 {
        self.max_attempts.unwrap_or(provider_count as u32).max(1)
    }
}

/// Orchestrates selection, upstream calls, and failover for chat requests.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    backends: HashMap<String, Arc<dyn ChatBackend>>,
    selector: Arc<ProviderSelector>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Build a dispatcher with explicit backends (the seam used by tests
    /// and by [`over_http`](Self::over_http)).
    pub fn new(
        registry: Arc<ProviderRegistry>,
        backends: HashMap<String, Arc<dyn ChatBackend>>,
        selector: ProviderSelector,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            backends,
            selector: Arc::new(selector),
            config,
        }
    }

    /// Build a dispatcher whose backends are OpenAI-compatible HTTP
    /// clients, one per registry provider, sharing `http`'s pool.
    pub fn over_http(
        registry: Arc<ProviderRegistry>,
        http: reqwest::Client,
        selector: ProviderSelector,
        config: DispatchConfig,
    ) -> Self {
        let backends = registry
            .providers()
            .iter()
            .map(|p| {
                let backend: Arc<dyn ChatBackend> =
                    Arc::new(OpenAiBackend::for_provider(p, http.clone()));
                (p.name().to_string(), backend)
            })
            .collect();
        Self::new(registry, backends, selector, config)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Run the dispatch loop, yielding normalized chunks.
    ///
    /// The stream always terminates with exactly one `done=true` chunk:
    /// `done_reason="stop"` on success, `done_reason="error"` once the
    /// attempt cap is reached with no provider succeeding.
    pub fn dispatch_stream(
        &self,
        model_map: ModelMap,
        messages: Vec<Message>,
        options: OptionsMap,
    ) -> Pin<Box<dyn Stream<Item = ChatChunk> + Send + 'static>> {
        let registry = Arc::clone(&self.registry);
        let backends = self.backends.clone();
        let selector = Arc::clone(&self.selector);
        let max_attempts = self.config.effective_attempts(registry.len());

        Box::pin(async_stream::stream! {
            let start = Instant::now();
            let mut last_err: Option<OllamuxError> = None;

            for attempt in 1..=max_attempts {
                let selection = selector.select(registry.providers(), Instant::now());
                let provider = selection.provider;

                // Reserve before calling: the stamp happens under the
                // provider's lock, so concurrent loops get distinct slots.
                let wait = provider.reserve(Instant::now());
                if !wait.is_zero() {
                    debug!(
                        provider = provider.name(),
                        wait_ms = wait.as_millis() as u64,
                        "waiting for rate-limit slot"
                    );
                    metrics::histogram!(telemetry::PROVIDER_WAIT_SECONDS,
                        "provider" => provider.name().to_owned())
                    .record(wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }

                let Some(model) = model_map.get(provider.name()) else {
                    // A provider missing from the map cannot serve this
                    // request; skip it without burning the upstream.
                    last_err = Some(OllamuxError::ModelNotMapped(format!(
                        "no model mapping for provider '{}'",
                        provider.name()
                    )));
                    continue;
                };
                let Some(backend) = backends.get(provider.name()) else {
                    last_err = Some(OllamuxError::Configuration(format!(
                        "no backend registered for provider '{}'",
                        provider.name()
                    )));
                    continue;
                };

                debug!(
                    provider = provider.name(),
                    model, attempt, max_attempts, "dispatching to provider"
                );

                match backend.stream_chat(model, &messages, &options).await {
                    Err(e) => {
                        warn!(
                            provider = provider.name(),
                            attempt,
                            error = %e,
                            "provider attempt failed, failing over"
                        );
                        metrics::counter!(telemetry::FAILOVERS_TOTAL,
                            "provider" => provider.name().to_owned())
                        .increment(1);
                        last_err = Some(e);
                    }
                    Ok(mut upstream) => {
                        let mut failed = None;
                        loop {
                            match upstream.next().await {
                                Some(Ok(TokenDelta::Content(delta))) => {
                                    yield ChatChunk::content(delta);
                                }
                                Some(Ok(TokenDelta::Done)) | None => break,
                                Some(Err(e)) => {
                                    failed = Some(e);
                                    break;
                                }
                            }
                        }
                        match failed {
                            Some(e) => {
                                // Content already emitted for this attempt
                                // is re-streamed from scratch by the next
                                // provider; the terminal chunk still
                                // arrives exactly once.
                                warn!(
                                    provider = provider.name(),
                                    attempt,
                                    error = %e,
                                    "stream broke mid-flight, failing over"
                                );
                                metrics::counter!(telemetry::FAILOVERS_TOTAL,
                                    "provider" => provider.name().to_owned())
                                .increment(1);
                                last_err = Some(e);
                            }
                            None => {
                                metrics::counter!(telemetry::DISPATCH_TOTAL,
                                    "status" => "ok")
                                .increment(1);
                                metrics::histogram!(telemetry::DISPATCH_DURATION_SECONDS)
                                    .record(start.elapsed().as_secs_f64());
                                yield ChatChunk::stop();
                                return;
                            }
                        }
                    }
                }
            }

            let err = OllamuxError::Exhausted {
                attempts: max_attempts,
                last: last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no provider attempted".into()),
            };
            warn!(error = %err, "dispatch exhausted");
            metrics::counter!(telemetry::DISPATCH_TOTAL, "status" => "error").increment(1);
            metrics::histogram!(telemetry::DISPATCH_DURATION_SECONDS)
                .record(start.elapsed().as_secs_f64());
            yield ChatChunk::error(err.to_string());
        })
    }

    /// Non-streaming dispatch: identical selection and failover, but the
    /// content chunks are accumulated into one aggregated response with
    /// `total_duration` measured end-to-end from the first attempt.
    #[instrument(skip(self, model_map, messages, options), fields(model = public_model))]
    pub async fn dispatch(
        &self,
        public_model: &str,
        model_map: ModelMap,
        messages: Vec<Message>,
        options: OptionsMap,
    ) -> ChatCompletion {
        let start = Instant::now();
        let mut content = String::new();
        let mut done_reason = None;

        let mut chunks = self.dispatch_stream(model_map, messages, options);
        while let Some(chunk) = chunks.next().await {
            if chunk.done {
                done_reason = chunk.done_reason;
                if chunk.done_reason == Some(DoneReason::Error) {
                    // Error text replaces any partial content, matching the
                    // streaming shape where the terminal chunk carries it.
                    content = chunk.message.content;
                }
                break;
            }
            content.push_str(&chunk.message.content);
        }

        ChatCompletion {
            model: public_model.to_string(),
            created_at: Utc::now(),
            message: crate::types::ChunkMessage {
                role: crate::types::Role::Assistant,
                content,
            },
            done: true,
            done_reason,
            total_duration: start.elapsed().as_nanos() as i64,
        }
    }
}
