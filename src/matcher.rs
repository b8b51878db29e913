use faceguard_vision::Embedding;
use thiserror::Error;

use crate::storage::FaceStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("query has {query} dimensions but {identity:?} has {reference}")]
    Dimension {
        identity: String,
        query: usize,
        reference: usize,
    },
}

/// Why a query was or was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    /// Closest identity was not strictly under the threshold.
    AboveThreshold,
    /// Nobody is enrolled; no distance was computed.
    EmptyDatabase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub best_match: Option<String>,
    pub distance: Option<f32>,
    pub decision: Decision,
}

impl MatchResult {
    pub fn access_granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}

/// Euclidean distance between two embeddings of equal length.
pub fn distance(a: &Embedding, b: &Embedding) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let diff = &a.view() - &b.view();
    Some(diff.dot(&diff).sqrt())
}

/// Exact nearest-neighbour search with a fixed admission threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    threshold: f32,
}

impl Matcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scan every stored identity and admit the query if the closest one is
    /// strictly under the threshold. Ties keep the identity that sorts first.
    pub fn evaluate(&self, query: &Embedding, store: &FaceStore) -> Result<MatchResult, MatchError> {
        if store.is_empty() {
            return Ok(MatchResult {
                best_match: None,
                distance: None,
                decision: Decision::EmptyDatabase,
            });
        }

        let mut best: Option<(&str, f32)> = None;
        let mut min = f32::INFINITY;
        for (identity, reference) in store.iter() {
            let d = distance(query, reference).ok_or_else(|| MatchError::Dimension {
                identity: identity.to_string(),
                query: query.len(),
                reference: reference.len(),
            })?;
            log::debug!("{identity:<20} distance {d:.4}");
            if d < min {
                min = d;
                best = Some((identity, d));
            }
        }

        let decision = match best {
            Some((_, d)) if d < self.threshold => Decision::Granted,
            _ => Decision::AboveThreshold,
        };
        Ok(MatchResult {
            best_match: best.map(|(name, _)| name.to_string()),
            distance: best.map(|(_, d)| d),
            decision,
        })
    }
}
