//! Cosine-similarity matcher over the embedding gallery.

use crate::category::Category;
use crate::error::{CoreError, StorageError};
use crate::gallery::{Gallery, GalleryScan};
use crate::types::{l2_normalize, validate_vector, EmbeddingRecord};
use serde::Serialize;

/// Default cosine similarity required for a match.
pub const DEFAULT_THRESHOLD: f32 = 0.75;

/// Raw matcher outcome, before any validity rules are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Match,
    NoMatch,
    NoGallery,
}

/// The best gallery record seen during a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub embedding_id: i64,
    pub category: Category,
    pub reference_id: i64,
}

/// Result of matching a query vector against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub verdict: Verdict,
    /// Best cosine similarity seen, in [-1, 1]; 0.0 when nothing was compared.
    pub similarity: f32,
    /// Best candidate. Present for `Match`, and for `NoMatch` as a diagnostic.
    pub candidate: Option<Candidate>,
    /// Records skipped for a zero norm or a wrong stored dimension.
    pub skipped: usize,
}

impl MatchResult {
    fn no_gallery(skipped: usize) -> Self {
        Self {
            verdict: Verdict::NoGallery,
            similarity: 0.0,
            candidate: None,
            skipped,
        }
    }

    pub fn is_match(&self) -> bool {
        self.verdict == Verdict::Match
    }
}

/// Cosine matcher. Holds only configuration; every call rescans the gallery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineMatcher {
    pub threshold: f32,
    pub dimension: usize,
}

impl CosineMatcher {
    pub fn new(threshold: f32, dimension: usize) -> Self {
        Self {
            threshold,
            dimension,
        }
    }

    /// Scan `gallery` (optionally one category) for the best match of `query`.
    pub fn match_gallery<G: Gallery + ?Sized>(
        &self,
        query: &[f32],
        gallery: &G,
        filter: Option<Category>,
        page_size: usize,
    ) -> Result<MatchResult, CoreError> {
        self.compare(query, GalleryScan::new(gallery, filter, page_size))
    }

    /// Compare `query` against every candidate record.
    ///
    /// Ties keep the first record encountered.
    pub fn compare<I>(&self, query: &[f32], candidates: I) -> Result<MatchResult, CoreError>
    where
        I: IntoIterator<Item = Result<EmbeddingRecord, StorageError>>,
    {
        validate_vector(query, self.dimension)?;
        let unit_query = l2_normalize(query)
            .ok_or_else(|| CoreError::InvalidInput("query vector has zero norm".into()))?;

        let mut best: Option<(f32, Candidate)> = None;
        let mut skipped = 0usize;

        for record in candidates {
            let record = record?;

            if record.vector.len() != self.dimension {
                skipped += 1;
                tracing::warn!(
                    embedding_id = record.embedding_id,
                    expected = self.dimension,
                    got = record.vector.len(),
                    "skipping gallery record with wrong dimension"
                );
                continue;
            }
            let Some(stored) = l2_normalize(&record.vector) else {
                skipped += 1;
                tracing::warn!(
                    embedding_id = record.embedding_id,
                    "skipping gallery record with zero norm"
                );
                continue;
            };

            let sim = dot(&unit_query, &stored);
            let is_better = match &best {
                None => true,
                Some((prev, _)) => sim > *prev,
            };
            if is_better {
                best = Some((
                    sim,
                    Candidate {
                        embedding_id: record.embedding_id,
                        category: record.category,
                        reference_id: record.reference_id,
                    },
                ));
            }
        }

        let Some((similarity, candidate)) = best else {
            return Ok(MatchResult::no_gallery(skipped));
        };

        let verdict = if similarity >= self.threshold {
            Verdict::Match
        } else {
            Verdict::NoMatch
        };

        tracing::debug!(
            ?verdict,
            similarity,
            embedding_id = candidate.embedding_id,
            skipped,
            "gallery scan complete"
        );

        Ok(MatchResult {
            verdict,
            similarity,
            candidate: Some(candidate),
            skipped,
        })
    }
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, crate::types::FACE_EMBEDDING_DIM)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>().clamp(-1.0, 1.0)
}
