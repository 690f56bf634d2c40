//! Core types shared across the dispatcher and the HTTP surface.

mod chunk;
mod message;

pub use chunk::{ChatChunk, ChatCompletion, ChunkMessage, DoneReason};
pub use message::{Message, Role};
