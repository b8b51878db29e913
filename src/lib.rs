pub mod access;
pub mod app;
pub mod config;
pub mod console;
pub mod enroll;
pub mod matcher;
pub mod storage;
#[doc(hidden)]
pub mod testing;

// Re-export vision types for convenience
pub use faceguard_vision::{Embedding, EmbeddingProvider, Extraction, Pipeline, ProviderError};
