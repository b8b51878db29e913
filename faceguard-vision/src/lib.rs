pub mod face;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod yunet;

// Re-export commonly used types
pub use face::Detection;
pub use pipeline::{Pipeline, PipelineOptions};
pub use provider::{Embedding, EmbeddingProvider, Extraction, ProviderError};
