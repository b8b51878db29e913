//! In-memory stand-in for the face model, used by unit and integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use faceguard_vision::{Embedding, EmbeddingProvider, Extraction, ProviderError};

/// Answers from a fixed table keyed by image path. Paths missing from the
/// table fail like an unreadable image would.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    answers: HashMap<PathBuf, Option<Vec<f32>>>,
    calls: Vec<PathBuf>,
}

impl ScriptedProvider {
    pub fn face(mut self, path: impl AsRef<Path>, vector: &[f32]) -> Self {
        self.answers
            .insert(path.as_ref().to_path_buf(), Some(vector.to_vec()));
        self
    }

    pub fn no_face(mut self, path: impl AsRef<Path>) -> Self {
        self.answers.insert(path.as_ref().to_path_buf(), None);
        self
    }

    /// Every path passed to `extract`, in order.
    pub fn calls(&self) -> &[PathBuf] {
        &self.calls
    }
}

impl EmbeddingProvider for ScriptedProvider {
    fn extract(&mut self, image: &Path) -> Result<Extraction, ProviderError> {
        self.calls.push(image.to_path_buf());
        match self.answers.get(image) {
            Some(Some(v)) => Ok(Extraction::Found(Embedding::new(v.clone()))),
            Some(None) => Ok(Extraction::NotFound),
            None => Err(ProviderError::Inference(format!(
                "no scripted answer for {}",
                image.display()
            ))),
        }
    }
}
