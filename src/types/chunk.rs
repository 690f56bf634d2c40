//! Normalized chunk types: the emulated API's uniform streaming unit.
//!
//! Whatever the upstream provider streams, the dispatcher re-emits it as a
//! sequence of [`ChatChunk`] values: zero or more `done=false` content
//! deltas followed by exactly one `done=true` terminator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Role;

/// Why a terminal chunk terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneReason {
    /// Natural end of the upstream stream.
    Stop,
    /// All providers exhausted; the chunk content carries the error text.
    Error,
    /// Request short-circuited before dispatch (e.g. empty messages).
    Load,
}

/// The assistant message fragment inside a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub role: Role,
    pub content: String,
}

/// One normalized streaming unit, independent of which provider produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub message: ChunkMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<DoneReason>,
}

impl ChatChunk {
    /// A `done=false` chunk carrying one content delta.
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            message: ChunkMessage {
                role: Role::Assistant,
                content: delta.into(),
            },
            done: false,
            done_reason: None,
        }
    }

    /// The terminal chunk for a successfully completed stream.
    pub fn stop() -> Self {
        Self {
            message: ChunkMessage {
                role: Role::Assistant,
                content: String::new(),
            },
            done: true,
            done_reason: Some(DoneReason::Stop),
        }
    }

    /// The terminal chunk for an exhausted dispatch. The error text is
    /// embedded as assistant content so clients parsing the stream format
    /// don't crash on failure.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            message: ChunkMessage {
                role: Role::Assistant,
                content: text.into(),
            },
            done: true,
            done_reason: Some(DoneReason::Error),
        }
    }
}

/// Aggregated non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub message: ChunkMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<DoneReason>,
    /// End-to-end duration in nanoseconds, measured from the first
    /// provider attempt.
    pub total_duration: i64,
}
