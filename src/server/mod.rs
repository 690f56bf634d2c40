//! HTTP front end: the Ollama-compatible surface.
//!
//! Owns request parsing and response framing (ND-JSON, SSE, plain JSON)
//! around the dispatcher and the model store. Every route gets permissive
//! CORS and a request-logging middleware.

pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::store::ModelStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(store: Arc<ModelStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/generate", post(handlers::generate))
        .route("/api/create", post(handlers::create_model))
        .route("/api/tags", get(handlers::list_models))
        .route("/api/show", post(handlers::show_model))
        .route("/api/copy", post(handlers::copy_model))
        .route("/api/delete", delete(handlers::delete_model))
        .route("/api/pull", post(handlers::pull_model))
        .route("/api/push", post(handlers::push_model))
        .route("/api/embed", post(handlers::generate_embeddings))
        .route("/api/ps", get(handlers::list_running_models))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn(log_requests))
        .layer(middleware::from_fn(permissive_cors))
        .with_state(state)
}

/// Allow-everything CORS, as local tooling talking to the emulated API
/// expects.
async fn permissive_cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(&mut response);
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors_headers(&mut response);
    response
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
}

/// Log every request's method, path, and status.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    info!(%method, path, status = response.status().as_u16(), "request");
    response
}
