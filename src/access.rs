use std::path::Path;

use faceguard_vision::{EmbeddingProvider, Extraction, ProviderError};

use crate::matcher::{Decision, MatchError, MatchResult, Matcher};
use crate::storage::FaceStore;

/// Outcome of one access attempt.
#[derive(Debug)]
pub enum Recognition {
    /// The matcher ran; see [`MatchResult::decision`].
    Matched(MatchResult),
    /// Nobody is enrolled. The image was never looked at.
    EmptyDatabase,
    /// The provider found no usable face.
    NoFace,
    /// The provider failed outright.
    ExtractionFailed(ProviderError),
}

impl Recognition {
    pub fn access_granted(&self) -> bool {
        matches!(self, Recognition::Matched(r) if r.access_granted())
    }

    /// Short human-readable reason for a denial, `None` when granted.
    pub fn denial_reason(&self) -> Option<String> {
        match self {
            Recognition::Matched(r) => match r.decision {
                Decision::Granted => None,
                Decision::AboveThreshold => Some("no match under the threshold".into()),
                Decision::EmptyDatabase => Some("database is empty (no authorized identities)".into()),
            },
            Recognition::EmptyDatabase => {
                Some("database is empty (no authorized identities)".into())
            }
            Recognition::NoFace => Some("could not detect a face in the image".into()),
            Recognition::ExtractionFailed(e) => Some(format!("could not process the image: {e}")),
        }
    }
}

/// Decide whether the face in `image` belongs to someone in `store`.
pub fn recognize<P: EmbeddingProvider + ?Sized>(
    provider: &mut P,
    store: &FaceStore,
    matcher: &Matcher,
    image: &Path,
) -> Result<Recognition, MatchError> {
    if store.is_empty() {
        log::warn!("no authorized identities enrolled");
        return Ok(Recognition::EmptyDatabase);
    }

    log::info!(
        "checking {} against {} identities",
        image.display(),
        store.len()
    );
    let query = match provider.extract(image) {
        Ok(Extraction::Found(e)) => e,
        Ok(Extraction::NotFound) => return Ok(Recognition::NoFace),
        Err(e) => {
            log::warn!("{e}");
            return Ok(Recognition::ExtractionFailed(e));
        }
    };

    let result = matcher.evaluate(&query, store)?;
    Ok(Recognition::Matched(result))
}
