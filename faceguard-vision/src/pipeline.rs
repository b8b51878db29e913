use std::path::{Path, PathBuf};

use anyhow::Context;
use ort::session::Session;

use crate::face;
use crate::model;
use crate::provider::{EmbeddingProvider, Extraction, ProviderError};

/// Where the two ONNX models live and how eagerly faces are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from(model::DEFAULT_DETECTOR_MODEL),
            recognizer_model: PathBuf::from(model::DEFAULT_RECOGNIZER_MODEL),
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

struct Sessions {
    detector: Session,
    encoder: Session,
}

/// Full pipeline: detect faces -> align -> encode.
///
/// Models are loaded on the first extraction, so constructing a pipeline
/// is free for commands that never look at an image.
pub struct Pipeline {
    options: PipelineOptions,
    sessions: Option<Sessions>,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            sessions: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.sessions.is_some()
    }

    fn sessions(&mut self) -> Result<&mut Sessions, ProviderError> {
        let sessions = match self.sessions.take() {
            Some(s) => s,
            None => {
                let load = |path: &Path| {
                    model::load_session(path).map_err(|e| ProviderError::Model {
                        path: path.to_path_buf(),
                        message: format!("{e:#}"),
                    })
                };
                let detector = load(&self.options.detector_model)?;
                let encoder = load(&self.options.recognizer_model)?;
                log::info!("face models loaded");
                Sessions { detector, encoder }
            }
        };
        Ok(self.sessions.insert(sessions))
    }
}

impl EmbeddingProvider for Pipeline {
    fn extract(&mut self, image: &Path) -> Result<Extraction, ProviderError> {
        let img = image::open(image).map_err(|source| ProviderError::Image {
            path: image.to_path_buf(),
            source,
        })?;

        let (score_threshold, nms_threshold) =
            (self.options.score_threshold, self.options.nms_threshold);
        let sessions = self.sessions()?;

        let detections =
            face::detect_faces(&mut sessions.detector, &img, score_threshold, nms_threshold)
                .context("detecting faces")?;

        // best-first after NMS
        let Some(best) = detections.first() else {
            log::debug!("no face in {}", image.display());
            return Ok(Extraction::NotFound);
        };
        log::debug!(
            "face at {:?} score {:.3} ({} detected)",
            best.bbox,
            best.score,
            detections.len()
        );

        let aligned = face::align_face(&img, best).context("aligning face")?;
        let embedding =
            face::encode_face(&mut sessions.encoder, &aligned).context("encoding face")?;
        Ok(Extraction::Found(embedding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_does_not_load_models() {
        let pipeline = Pipeline::new(PipelineOptions::default());
        assert!(!pipeline.is_loaded());
    }

    #[test]
    fn unreadable_image_is_an_image_error() {
        let mut pipeline = Pipeline::new(PipelineOptions::default());
        let err = pipeline
            .extract(Path::new("/nonexistent/face.png"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Image { .. }));
        assert!(!pipeline.is_loaded());
    }
}
