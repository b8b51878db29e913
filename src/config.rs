use anyhow::{bail, Context, Result};
use faceguard_vision::{model, PipelineOptions};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> =
    Lazy::new(|| Path::new(option_env!("FACEGUARD_CONFIG_PATH").unwrap_or("faceguard.toml")));

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON file holding identity -> embedding.
    pub database: PathBuf,
    /// Maximum L2 distance (exclusive) for a match.
    pub threshold: f32,
    /// Directory scanned by `setup`.
    pub images_dir: PathBuf,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("database/face_database.json"),
            // SFace decision distance for L2-normalized embeddings
            threshold: 1.128,
            images_dir: PathBuf::from("images"),
            detector_model: PathBuf::from(model::DEFAULT_DETECTOR_MODEL),
            recognizer_model: PathBuf::from(model::DEFAULT_RECOGNIZER_MODEL),
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            bail!("threshold must be a positive number, got {}", self.threshold);
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            bail!("score_threshold must be within [0, 1], got {}", self.score_threshold);
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            bail!("nms_threshold must be within [0, 1], got {}", self.nms_threshold);
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            detector_model: self.detector_model.clone(),
            recognizer_model: self.recognizer_model.clone(),
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceguard.toml");
        std::fs::write(&path, "threshold = 0.9\ndatabase = \"people.json\"\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.threshold, 0.9);
        assert_eq!(cfg.database, PathBuf::from("people.json"));
        assert_eq!(cfg.images_dir, PathBuf::from("images"));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceguard.toml");
        std::fs::write(&path, "threshold = [").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn threshold_must_be_positive() {
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let cfg = Config {
                threshold: bad,
                ..Config::default()
            };
            assert!(cfg.validate().is_err(), "{bad} accepted");
        }
        assert!(Config::default().validate().is_ok());
    }
}
