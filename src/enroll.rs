use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use faceguard_vision::{EmbeddingProvider, Extraction, ProviderError};

use crate::storage::{FaceStore, Inserted, StoreError};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// What to do when the identity being enrolled already exists.
pub enum OverwritePolicy<'a> {
    Always,
    Never,
    /// Ask the caller; `true` means overwrite.
    Ask(&'a mut dyn FnMut(&str) -> bool),
}

impl fmt::Debug for OverwritePolicy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwritePolicy::Always => f.write_str("Always"),
            OverwritePolicy::Never => f.write_str("Never"),
            OverwritePolicy::Ask(_) => f.write_str("Ask"),
        }
    }
}

#[derive(Debug)]
pub enum EnrollOutcome {
    Added,
    Replaced,
    /// The identity existed and the policy said not to overwrite it.
    Declined,
    NoFace,
    ExtractionFailed(ProviderError),
}

impl EnrollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EnrollOutcome::Added | EnrollOutcome::Replaced)
    }
}

impl fmt::Display for EnrollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollOutcome::Added => f.write_str("added"),
            EnrollOutcome::Replaced => f.write_str("replaced"),
            EnrollOutcome::Declined => f.write_str("cancelled, existing entry kept"),
            EnrollOutcome::NoFace => f.write_str("could not detect a face in the image"),
            EnrollOutcome::ExtractionFailed(e) => write!(f, "could not process the image: {e}"),
        }
    }
}

/// Extract a face from `image` and store it under `identity`.
///
/// The overwrite question is settled before the model runs. Any outcome
/// other than `Added`/`Replaced` leaves the store untouched.
pub fn add_person<P: EmbeddingProvider + ?Sized>(
    store: &mut FaceStore,
    provider: &mut P,
    identity: &str,
    image: &Path,
    policy: OverwritePolicy<'_>,
) -> Result<EnrollOutcome, StoreError> {
    if identity.is_empty() {
        return Err(StoreError::EmptyIdentity);
    }

    if store.contains(identity) {
        log::warn!("{identity:?} already exists in the database");
        let overwrite = match policy {
            OverwritePolicy::Always => true,
            OverwritePolicy::Never => false,
            OverwritePolicy::Ask(ask) => ask(identity),
        };
        if !overwrite {
            return Ok(EnrollOutcome::Declined);
        }
    }

    let embedding = match provider.extract(image) {
        Ok(Extraction::Found(e)) => e,
        Ok(Extraction::NotFound) => return Ok(EnrollOutcome::NoFace),
        Err(e) => return Ok(EnrollOutcome::ExtractionFailed(e)),
    };
    log::debug!(
        "{} dimensional embedding, starts {:?}",
        embedding.len(),
        &embedding.as_slice()[..embedding.len().min(3)]
    );

    match store.insert_or_replace(identity, embedding)? {
        Inserted::New => Ok(EnrollOutcome::Added),
        Inserted::Replaced(_) => Ok(EnrollOutcome::Replaced),
    }
}

/// One file considered by [`enroll_directory`].
#[derive(Debug)]
pub struct BulkEntry {
    pub identity: String,
    pub image: PathBuf,
    pub outcome: Result<EnrollOutcome, StoreError>,
}

impl BulkEntry {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, Ok(o) if o.is_success())
    }
}

#[derive(Debug, Default)]
pub struct BulkReport {
    pub entries: Vec<BulkEntry>,
}

impl BulkReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by name.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Enroll every image in `dir` under its file stem, overwriting existing
/// identities. Individual failures are recorded and do not stop the run.
pub fn enroll_directory<P: EmbeddingProvider + ?Sized>(
    store: &mut FaceStore,
    provider: &mut P,
    dir: &Path,
) -> Result<BulkReport> {
    let mut report = BulkReport::default();

    for image in find_images(dir)? {
        let Some(identity) = image.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
            log::warn!("skipping {}: name is not valid UTF-8", image.display());
            continue;
        };

        log::info!("processing {identity}");
        let outcome = add_person(store, provider, &identity, &image, OverwritePolicy::Always);
        match &outcome {
            Ok(o) if o.is_success() => log::info!("{identity}: {o}"),
            Ok(o) => log::warn!("{identity}: {o}"),
            Err(e) => log::warn!("{identity}: {e}"),
        }
        report.entries.push(BulkEntry {
            identity,
            image,
            outcome,
        });
    }

    Ok(report)
}
