//! Route handlers for the emulated API.
//!
//! The chat/generate pair forwards to the dispatcher; everything else is
//! bookkeeping over the model store plus the progress animations local
//! clients expect from pull/push/create.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::ModelEntry;
use crate::types::{ChatChunk, Message};
use crate::upstream::OptionsMap;
use crate::OllamuxError;

use super::AppState;

/// Chat/generate request body. `prompt` is accepted as the single-turn
/// spelling and converted to one user message.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: OptionsMap,
}

/// One ND-JSON line of a streamed chat response: the normalized chunk
/// wrapped with the public model name and a timestamp.
#[derive(Serialize)]
struct StreamFrame {
    model: String,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    chunk: ChatChunk,
}

pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    run_completion(state, request).await
}

pub async fn generate(
    State(state): State<AppState>,
    Json(mut request): Json<ChatRequest>,
) -> Response {
    if request.messages.is_empty() {
        if let Some(prompt) = request.prompt.take() {
            request.messages.push(Message::user(prompt));
        }
    }
    run_completion(state, request).await
}

async fn run_completion(state: AppState, request: ChatRequest) -> Response {
    if request.messages.is_empty() {
        // Nothing to complete; answer the "load the model" handshake shape.
        return Json(json!({
            "model": request.model,
            "created_at": Utc::now(),
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "load",
        }))
        .into_response();
    }

    let model_map = match state
        .store
        .resolve_model_mapping(&request.model, state.dispatcher.registry())
        .await
    {
        Ok(map) => map,
        Err(OllamuxError::ModelNotMapped(name)) => return model_not_found(&name),
        Err(e) => return internal_error(e),
    };

    if request.stream == Some(false) {
        let completion = state
            .dispatcher
            .dispatch(&request.model, model_map, request.messages, request.options)
            .await;
        return Json(completion).into_response();
    }

    let model = request.model.clone();
    let chunks = state
        .dispatcher
        .dispatch_stream(model_map, request.messages, request.options);
    let body = Body::from_stream(
        chunks.map(move |chunk| Ok::<_, Infallible>(ndjson_frame(&model, chunk))),
    );
    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn ndjson_frame(model: &str, chunk: ChatChunk) -> Bytes {
    let frame = StreamFrame {
        model: model.to_string(),
        created_at: Utc::now(),
        chunk,
    };
    let mut line = serde_json::to_vec(&frame)
        .unwrap_or_else(|_| br#"{"done":true,"done_reason":"error"}"#.to_vec());
    line.push(b'\n');
    Bytes::from(line)
}

fn model_not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("model '{name}' not found, try pulling it first")
        })),
    )
        .into_response()
}

fn internal_error(error: OllamuxError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": error.to_string()})),
    )
        .into_response()
}

// ============================================================================
// Model lifecycle endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(alias = "model")]
    pub name: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

pub async fn create_model(
    State(state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Response {
    let entry = ModelEntry {
        name: request.name.clone(),
        modified_at: Utc::now(),
        size: 0,
        digest: String::new(),
        details: request.details,
    };
    if let Err(e) = state.store.insert_model(entry).await {
        return internal_error(e);
    }

    let body = Body::from_stream(async_stream::stream! {
        for status in ["reading model metadata", "creating system layer", "success"] {
            yield Ok::<_, Infallible>(status_line(status));
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

pub async fn list_models(State(state): State<AppState>) -> Response {
    Json(json!({"models": state.store.list_models().await})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ModelNameRequest {
    #[serde(alias = "name")]
    pub model: String,
}

const MODELFILE: &str = "FROM llama2\nSYSTEM You are a helpful assistant.";
const PARAMETERS: &str = "temperature 0.7\ntop_p 0.9";
const TEMPLATE: &str = "{{ .System }}\nUser: {{ .Prompt }}\nAssistant: {{ .Response }}";

pub async fn show_model(
    State(state): State<AppState>,
    Json(request): Json<ModelNameRequest>,
) -> Response {
    match state.store.get_model(&request.model).await {
        Some(entry) => Json(json!({
            "modelfile": MODELFILE,
            "parameters": PARAMETERS,
            "template": TEMPLATE,
            "details": entry.details,
        }))
        .into_response(),
        None => model_not_found(&request.model),
    }
}

#[derive(Debug, Deserialize)]
pub struct CopyRequest {
    pub source: String,
    pub destination: String,
}

pub async fn copy_model(
    State(state): State<AppState>,
    Json(request): Json<CopyRequest>,
) -> Response {
    match state
        .store
        .copy_model(&request.source, &request.destination)
        .await
    {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => model_not_found(&request.source),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_model(
    State(state): State<AppState>,
    Json(request): Json<ModelNameRequest>,
) -> Response {
    match state.store.remove_model(&request.model).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => model_not_found(&request.model),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// Progress animations (pull/push)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub stream: Option<bool>,
}

const PULL_TOTAL_BYTES: u64 = 4_661_216_384;
const PULL_DIGEST: &str =
    "sha256:8eeb52dfb3bb9aefdf9d1ef24b3bdbcfbe82238798c4b918278320b6fcef18fe";

pub async fn pull_model(Json(request): Json<PullRequest>) -> Response {
    if request.stream == Some(false) {
        return Json(json!({"status": "success"})).into_response();
    }

    let body = Body::from_stream(async_stream::stream! {
        yield Ok::<_, Infallible>(sse_frame(&json!({"status": "pulling manifest"})));
        tokio::time::sleep(Duration::from_millis(500)).await;

        let chunks = 3u64;
        for i in 0..chunks {
            let completed = (PULL_TOTAL_BYTES / chunks) * (i + 1);
            yield Ok(sse_frame(&json!({
                "status": "downloading",
                "digest": PULL_DIGEST,
                "total": PULL_TOTAL_BYTES,
                "completed": completed,
            })));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        yield Ok(sse_frame(&json!({"status": "verifying sha256 digest"})));
        tokio::time::sleep(Duration::from_millis(500)).await;
        yield Ok(sse_frame(&json!({"status": "success"})));
    });
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

pub async fn push_model(Json(_request): Json<PullRequest>) -> Response {
    let body = Body::from_stream(async_stream::stream! {
        for status in ["retrieving manifest", "pushing manifest", "success"] {
            yield Ok::<_, Infallible>(status_line(status));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

fn status_line(status: &str) -> Bytes {
    let mut line = serde_json::to_vec(&json!({"status": status}))
        .unwrap_or_else(|_| b"{}".to_vec());
    line.push(b'\n');
    Bytes::from(line)
}

fn sse_frame(payload: &serde_json::Value) -> Bytes {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".into());
    Bytes::from(format!("data: {data}\n\n"))
}

// ============================================================================
// Embeddings and process listing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: serde_json::Value,
}

pub async fn generate_embeddings(Json(request): Json<EmbedRequest>) -> Response {
    // No real inference behind this endpoint; a fixed vector keeps
    // embedding-consuming clients functional.
    let sample: Vec<f64> = [0.1, -0.2, 0.3, 0.4, -0.5].repeat(2);
    let count = match &request.input {
        serde_json::Value::Array(items) => items.len(),
        _ => 1,
    };
    let embeddings: Vec<_> = std::iter::repeat_n(&sample, count).collect();

    Json(json!({
        "model": request.model,
        "embeddings": embeddings,
        "total_duration": 14_143_917,
        "load_duration": 1_019_500,
        "prompt_eval_count": 8,
    }))
    .into_response()
}

pub async fn list_running_models(State(state): State<AppState>) -> Response {
    match state.store.running_models().await {
        Ok(models) => Json(json!({"models": models})).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}
