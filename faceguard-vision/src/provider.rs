//! The boundary between the access-control core and whatever turns an
//! image into a face embedding.

use std::path::{Path, PathBuf};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-length face descriptor. Serialized as a plain array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.vector.as_slice())
    }
}

/// Result of a successful provider call. Not finding a face is routine,
/// so it is a value rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found(Embedding),
    NotFound,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cannot read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot load model {path}: {message}")]
    Model { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Inference(format!("{err:#}"))
    }
}

/// Anything that can produce an embedding from an image on disk.
pub trait EmbeddingProvider {
    fn extract(&mut self, image: &Path) -> Result<Extraction, ProviderError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for &mut P {
    fn extract(&mut self, image: &Path) -> Result<Extraction, ProviderError> {
        (**self).extract(image)
    }
}
