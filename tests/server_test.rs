//! End-to-end HTTP surface tests: a real server on an ephemeral port, a
//! scripted backend behind the dispatcher, and a temp-file store.

mod common;

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use common::{Call, MockBackend, build_dispatcher, content, done, provider_config};
use ollamux::server::{self, AppState};
use ollamux::store::ModelStore;

/// Spin up a server whose single provider replays `script`. Returns the
/// base URL; the temp dir keeps the store file alive for the test.
async fn spawn_server(script: Vec<Call>) -> (String, TempDir) {
    let backend = MockBackend::new("openrouter", script);
    let (dispatcher, _registry) = build_dispatcher(
        vec![(provider_config("openrouter", 100.0, 1), backend)],
        1,
        None,
    );

    let dir = TempDir::new().unwrap();
    let store = ModelStore::open(dir.path().join("db.json")).unwrap();

    let app = server::router(AppState::new(Arc::new(store), Arc::new(dispatcher)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), dir)
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let (base, _dir) = spawn_server(vec![]).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn chat_with_unknown_model_is_404() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/chat"))
        .json(&json!({
            "model": "definitely-not-a-model",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("try pulling it first")
    );
}

#[tokio::test]
async fn empty_messages_short_circuit_as_load() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/chat"))
        .json(&json!({"model": "llama2", "messages": []}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["done"], true);
    assert_eq!(body["done_reason"], "load");
    assert_eq!(body["message"]["content"], "");
}

#[tokio::test]
async fn non_streaming_chat_aggregates_the_reply() {
    let (base, _dir) =
        spawn_server(vec![Call::Stream(vec![content("Hel"), content("lo"), done()])]).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/chat"))
        .json(&json!({
            "model": "llama2",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": false,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["model"], "llama2");
    assert_eq!(body["message"]["content"], "Hello");
    assert_eq!(body["done"], true);
    assert_eq!(body["done_reason"], "stop");
}

#[tokio::test]
async fn streaming_chat_emits_ndjson_lines() {
    let (base, _dir) =
        spawn_server(vec![Call::Stream(vec![content("Hel"), content("lo"), done()])]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/chat"))
        .json(&json!({
            "model": "llama2",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );

    let text = response.text().await.unwrap();
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    // Every frame carries the public model name and a timestamp.
    for line in &lines {
        assert_eq!(line["model"], "llama2");
        assert!(line["created_at"].is_string());
    }
    let reply: String = lines
        .iter()
        .filter(|l| l["done"] == false)
        .map(|l| l["message"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(reply, "Hello");
    assert_eq!(lines.last().unwrap()["done_reason"], "stop");
}

#[tokio::test]
async fn generate_accepts_a_bare_prompt() {
    let (base, _dir) = spawn_server(vec![Call::Stream(vec![content("pong"), done()])]).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/generate"))
        .json(&json!({"model": "llama2", "prompt": "ping", "stream": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"]["content"], "pong");
}

#[tokio::test]
async fn model_lifecycle_create_show_copy_delete() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();

    // Create streams its progress lines and registers the model.
    let text = client
        .post(format!("{base}/api/create"))
        .json(&json!({"name": "my-model", "details": {"family": "llama"}}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("success"));

    let tags: Value = reqwest::get(format!("{base}/api/tags"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = tags["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"my-model"));

    let shown: Value = client
        .post(format!("{base}/api/show"))
        .json(&json!({"model": "my-model"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(shown["modelfile"].as_str().unwrap().starts_with("FROM"));
    assert_eq!(shown["details"]["family"], "llama");

    let copied = client
        .post(format!("{base}/api/copy"))
        .json(&json!({"source": "my-model", "destination": "my-clone"}))
        .send()
        .await
        .unwrap();
    assert_eq!(copied.status(), 200);

    let deleted = client
        .delete(format!("{base}/api/delete"))
        .json(&json!({"model": "my-clone"}))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    // Second delete: already gone.
    let again = client
        .delete(format!("{base}/api/delete"))
        .json(&json!({"model": "my-clone"}))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn show_unknown_model_is_404() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/show"))
        .json(&json!({"model": "ghost"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn pull_without_stream_returns_success_immediately() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/pull"))
        .json(&json!({"model": "llama2", "stream": false}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn streamed_pull_animates_progress_as_sse() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/pull"))
        .json(&json!({"model": "llama2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let text = response.text().await.unwrap();
    assert!(text.contains("pulling manifest"));
    assert!(text.contains("downloading"));
    assert!(text.contains("\"status\": \"success\"") || text.contains("\"status\":\"success\""));
}

#[tokio::test]
async fn embed_returns_one_vector_per_input() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/embed"))
        .json(&json!({"model": "llama2", "input": ["a", "b", "c"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let embeddings = body["embeddings"].as_array().unwrap();
    assert_eq!(embeddings.len(), 3);
    assert_eq!(embeddings[0].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn ps_lists_running_models() {
    let (base, _dir) = spawn_server(vec![]).await;
    let body: Value = reqwest::get(format!("{base}/api/ps"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["models"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cors_preflight_is_permissive() {
    let (base, _dir) = spawn_server(vec![]).await;
    let client = reqwest::Client::new();
    let response = client
        .request(reqwest::Method::OPTIONS, format!("{base}/api/chat"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers()["access-control-allow-origin"]
            .to_str()
            .unwrap(),
        "*"
    );
}
