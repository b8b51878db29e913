use std::path::Path;

use anyhow::Result;
use faceguard_vision::{EmbeddingProvider, Extraction, Pipeline, PipelineOptions, ProviderError};
use image::{Rgb, RgbImage};

fn models_present(options: &PipelineOptions) -> bool {
    let present = options.detector_model.is_file() && options.recognizer_model.is_file();
    if !present {
        eprintln!("Skipping: face models not found under models/");
    }
    present
}

#[test]
fn blank_image_has_no_face() -> Result<()> {
    env_logger::try_init().ok();
    let options = PipelineOptions::default();
    if !models_present(&options) {
        return Ok(());
    }

    let dir = std::env::temp_dir().join("faceguard-vision-blank");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("blank.png");
    RgbImage::from_pixel(320, 240, Rgb([128, 128, 128])).save(&path)?;

    let mut pipeline = Pipeline::new(options);
    assert_eq!(pipeline.extract(&path)?, Extraction::NotFound);
    assert!(pipeline.is_loaded());
    Ok(())
}

#[test]
fn sample_faces_produce_unit_embeddings() -> Result<()> {
    env_logger::try_init().ok();
    let options = PipelineOptions::default();
    if !models_present(&options) {
        return Ok(());
    }

    let faces = Path::new("test_faces");
    if !faces.is_dir() {
        eprintln!("Skipping: no sample images under {}", faces.display());
        return Ok(());
    }

    let mut pipeline = Pipeline::new(options);
    let mut found = 0;
    for entry in std::fs::read_dir(faces)? {
        let path = entry?.path();
        match pipeline.extract(&path) {
            Ok(Extraction::Found(embedding)) => {
                assert_eq!(embedding.len(), 128);
                let norm: f32 = embedding.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
                assert!((norm - 1.0).abs() < 1e-3, "{} norm {norm}", path.display());
                found += 1;
            }
            Ok(Extraction::NotFound) => eprintln!("no face in {}", path.display()),
            Err(ProviderError::Image { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert!(found > 0, "no face embedded from {}", faces.display());
    Ok(())
}

#[test]
fn missing_model_is_reported() {
    let options = PipelineOptions {
        detector_model: "does/not/exist.onnx".into(),
        ..PipelineOptions::default()
    };
    let dir = std::env::temp_dir().join("faceguard-vision-missing-model");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("blank.png");
    RgbImage::new(16, 16).save(&path).unwrap();

    let mut pipeline = Pipeline::new(options);
    let err = pipeline.extract(Path::new(&path)).unwrap_err();
    match err {
        ProviderError::Model { path, .. } => assert_eq!(path, Path::new("does/not/exist.onnx")),
        other => panic!("unexpected error: {other}"),
    }
}
