//! Provider registry and rate-limit-aware selection.

pub mod registry;
pub mod selector;

pub use registry::{Provider, ProviderRegistry};
pub use selector::{ProviderSelector, Selection};
