//! ollamuxd — Ollama-compatible multiplexing daemon.
//!
//! Serves the local Ollama API surface and fans chat traffic out across
//! the configured OpenAI-compatible providers.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ollamux::config::Settings;
use ollamux::dispatch::{DispatchConfig, Dispatcher};
use ollamux::provider::{ProviderRegistry, ProviderSelector};
use ollamux::server::{self, AppState};
use ollamux::store::ModelStore;
use ollamux::upstream::OpenAiBackend;
use ollamux::OllamuxError;

/// Ollama-compatible API multiplexer daemon.
#[derive(Parser)]
#[command(name = "ollamuxd")]
#[command(version)]
#[command(about = "Ollama API multiplexer daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    let addr: SocketAddr = settings
        .server
        .address
        .parse()
        .map_err(|e| OllamuxError::Configuration(format!("invalid listen address: {e}")))?;

    let registry = Arc::new(ProviderRegistry::from_configs(settings.providers.clone())?);
    let store = Arc::new(ModelStore::open(&settings.server.store_path)?);
    let dispatcher = Arc::new(Dispatcher::over_http(
        Arc::clone(&registry),
        OpenAiBackend::default_http_client(),
        ProviderSelector::new(),
        DispatchConfig {
            max_attempts: settings.dispatch.max_attempts,
        },
    ));

    info!(
        %addr,
        providers = registry.len(),
        store = %settings.server.store_path.display(),
        "ollamuxd starting"
    );

    let app = server::router(AppState::new(store, dispatcher));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
