//! Ollamux error types

/// Ollamux error types
#[derive(Debug, thiserror::Error)]
pub enum OllamuxError {
    // Provider/network errors — absorbed by the dispatch loop's failover
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    /// Every dispatch attempt failed. Carries the last provider error so the
    /// caller-facing error chunk has something useful to say.
    #[error("all providers exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    /// Public model unknown to the model store. Short-circuits dispatch,
    /// never enters the retry loop.
    #[error("model not mapped: {0}")]
    ModelNotMapped(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(String),
}

impl OllamuxError {
    /// Whether this error is a per-provider transport failure that the
    /// dispatch loop recovers from by failing over to another provider.
    ///
    /// Everything else crosses the dispatcher boundary.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OllamuxError::Http(_) | OllamuxError::Api { .. } | OllamuxError::Stream(_)
        )
    }
}

/// Result type alias for Ollamux operations
pub type Result<T> = std::result::Result<T, OllamuxError>;
