//! Access decision engine.
//!
//! Wraps the matcher with extraction, identity resolution and the temporary
//! staff validity window. Every decision, granted or denied, writes exactly
//! one access event before it is returned. Only infrastructure failures and
//! input contract violations come back as errors.

use crate::category::Category;
use crate::error::CoreError;
use crate::extractor::{EmbeddingExtractor, ExtractError, Extraction};
use crate::gallery::Gallery;
use crate::identity::{IdentityResolver, ValidityOracle};
use crate::log::{
    clamp_confidence, AccessLogStore, AccessLogWriter, MANUAL_OVERRIDE_PERSON, UNKNOWN_PERSON,
};
use crate::matcher::{CosineMatcher, MatchResult, Verdict, DEFAULT_THRESHOLD};
use crate::types::{l2_normalize, validate_vector, AccessResult, FACE_EMBEDDING_DIM};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Engine configuration. One engine serves one vector schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub dimension: usize,
    pub threshold: f32,
    pub scan_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: FACE_EMBEDDING_DIM,
            threshold: DEFAULT_THRESHOLD,
            scan_page_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Granted,
    Denied,
}

impl Decision {
    fn access_result(self) -> AccessResult {
        match self {
            Decision::Granted => AccessResult::Granted,
            Decision::Denied => AccessResult::Denied,
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Matched,
    NoFace,
    NoGallery,
    NoMatch,
    Expired,
    /// Gate opened by a security officer without recognition.
    ManualOverride,
}

impl Reason {
    pub fn message(self, name: &str) -> String {
        match self {
            Reason::Matched => format!("Welcome, {name}!"),
            Reason::NoFace => "No face detected".to_string(),
            Reason::NoGallery => "No enrolled faces to compare against".to_string(),
            Reason::NoMatch => "Face not recognized".to_string(),
            Reason::Expired => format!("Access period for {name} is not valid today"),
            Reason::ManualOverride => "Gate opened manually".to_string(),
        }
    }
}

/// Final, logged outcome of one recognition attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub attempt_id: Uuid,
    pub log_id: i64,
    pub decision: Decision,
    pub reason: Reason,
    pub message: String,
    pub display_name: String,
    pub category: Category,
    /// Similarity in [0, 1].
    pub confidence: f32,
    /// `confidence` as a percentage rounded to two decimals, for display.
    pub confidence_pct: f64,
    pub matched_embedding_id: Option<i64>,
    pub decided_at: DateTime<Utc>,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}

/// Round `confidence * 100` to two decimals.
pub fn confidence_percent(confidence: f32) -> f64 {
    (f64::from(confidence) * 100.0 * 100.0).round() / 100.0
}

/// Decision before it has been logged.
struct Outcome {
    decision: Decision,
    reason: Reason,
    display_name: String,
    category: Category,
    confidence: f32,
    embedding_id: Option<i64>,
}

impl Outcome {
    fn denied_unknown(reason: Reason, confidence: f32) -> Self {
        Self {
            decision: Decision::Denied,
            reason,
            display_name: UNKNOWN_PERSON.to_string(),
            category: Category::Unknown,
            confidence,
            embedding_id: None,
        }
    }
}

pub struct DecisionEngine {
    extractor: Option<Box<dyn EmbeddingExtractor>>,
    gallery: Arc<dyn Gallery>,
    resolver: Arc<dyn IdentityResolver>,
    validity: Arc<dyn ValidityOracle>,
    log: AccessLogWriter,
    matcher: CosineMatcher,
    scan_page_size: usize,
}

impl DecisionEngine {
    pub fn new(
        gallery: Arc<dyn Gallery>,
        resolver: Arc<dyn IdentityResolver>,
        validity: Arc<dyn ValidityOracle>,
        log_store: Arc<dyn AccessLogStore>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        if gallery.dimension() != config.dimension {
            return Err(CoreError::InvalidInput(format!(
                "gallery dimension {} does not match engine dimension {}",
                gallery.dimension(),
                config.dimension
            )));
        }
        Ok(Self {
            extractor: None,
            gallery,
            resolver,
            validity,
            log: AccessLogWriter::new(log_store),
            matcher: CosineMatcher::new(config.threshold, config.dimension),
            scan_page_size: config.scan_page_size,
        })
    }

    /// Inject the extractor used by the image paths.
    pub fn with_extractor(mut self, extractor: Box<dyn EmbeddingExtractor>) -> Result<Self, CoreError> {
        if extractor.dimension() != self.matcher.dimension {
            return Err(CoreError::InvalidInput(format!(
                "extractor dimension {} does not match engine dimension {}",
                extractor.dimension(),
                self.matcher.dimension
            )));
        }
        self.extractor = Some(extractor);
        Ok(self)
    }

    pub fn dimension(&self) -> usize {
        self.matcher.dimension
    }

    pub fn threshold(&self) -> f32 {
        self.matcher.threshold
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Start the extractor, if any.
    pub fn init(&self) -> Result<(), CoreError> {
        if let Some(extractor) = &self.extractor {
            extractor.init()?;
            tracing::info!(dimension = extractor.dimension(), "embedding extractor ready");
        }
        Ok(())
    }

    /// Stop the extractor, if any. Image decisions degrade to NO_FACE afterwards.
    pub fn shutdown(&self) {
        if let Some(extractor) = &self.extractor {
            extractor.shutdown();
            tracing::info!("embedding extractor shut down");
        }
    }

    pub fn decide_image(
        &self,
        image: &[u8],
        hint: Option<Category>,
    ) -> Result<AccessDecision, CoreError> {
        self.decide_image_at(image, hint, Utc::now())
    }

    /// Decide from raw image bytes at the given instant.
    pub fn decide_image_at(
        &self,
        image: &[u8],
        hint: Option<Category>,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, CoreError> {
        let extractor = self.extractor.as_deref().ok_or(CoreError::NoExtractor)?;
        if image.is_empty() {
            return Err(CoreError::InvalidInput("empty image".into()));
        }

        let attempt_id = Uuid::new_v4();
        let query = match extractor.extract(image) {
            Ok(Extraction::Face(values)) => match validate_vector(&values, self.dimension()) {
                Ok(()) if l2_normalize(&values).is_some() => Some(values),
                Ok(()) => {
                    tracing::warn!(%attempt_id, "extractor returned a zero-norm vector");
                    None
                }
                Err(e) => {
                    tracing::warn!(%attempt_id, error = %e, "extractor returned unusable vector");
                    None
                }
            },
            Ok(Extraction::NoFace) => None,
            Err(ExtractError::InvalidImage(msg)) => return Err(CoreError::InvalidInput(msg)),
            Err(e) => {
                tracing::warn!(%attempt_id, error = %e, "extraction failed; treating as no face");
                None
            }
        };

        match query {
            Some(query) => self.decide_vector(attempt_id, &query, hint, now),
            None => self.finish(attempt_id, now, Outcome::denied_unknown(Reason::NoFace, 0.0)),
        }
    }

    pub fn decide_embedding(
        &self,
        values: &[f32],
        hint: Option<Category>,
    ) -> Result<AccessDecision, CoreError> {
        self.decide_embedding_at(values, hint, Utc::now())
    }

    /// Decide from a vector posted by the caller (attendance path).
    ///
    /// The vector must have exactly the engine dimension.
    pub fn decide_embedding_at(
        &self,
        values: &[f32],
        hint: Option<Category>,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, CoreError> {
        if values.len() != self.dimension() {
            return Err(CoreError::InvalidEmbeddingFormat {
                expected: self.dimension(),
                got: values.len(),
            });
        }
        validate_vector(values, self.dimension())?;
        if l2_normalize(values).is_none() {
            return Err(CoreError::InvalidInput("embedding has zero norm".into()));
        }

        self.decide_vector(Uuid::new_v4(), values, hint, now)
    }

    pub fn manual_override(&self, officer_id: Option<i64>) -> Result<AccessDecision, CoreError> {
        self.manual_override_at(officer_id, Utc::now())
    }

    /// Open the gate without recognition. Logged as a granted security
    /// officer event with full confidence.
    pub fn manual_override_at(
        &self,
        officer_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, CoreError> {
        let attempt_id = Uuid::new_v4();
        tracing::info!(%attempt_id, officer_id, "manual gate override");
        self.finish(
            attempt_id,
            now,
            Outcome {
                decision: Decision::Granted,
                reason: Reason::ManualOverride,
                display_name: MANUAL_OVERRIDE_PERSON.to_string(),
                category: Category::SecurityOfficer,
                confidence: 1.0,
                embedding_id: None,
            },
        )
    }

    /// Enroll a face from an image.
    pub fn enroll_image(
        &self,
        category: Category,
        reference_id: i64,
        image: &[u8],
    ) -> Result<i64, CoreError> {
        let extractor = self.extractor.as_deref().ok_or(CoreError::NoExtractor)?;
        let values = match extractor.extract(image) {
            Ok(Extraction::Face(values)) => values,
            Ok(Extraction::NoFace) => return Err(CoreError::NoFaceDetected),
            Err(ExtractError::InvalidImage(msg)) => return Err(CoreError::InvalidInput(msg)),
            Err(e) => return Err(e.into()),
        };
        self.enroll_embedding(category, reference_id, &values)
    }

    /// Enroll a precomputed vector.
    pub fn enroll_embedding(
        &self,
        category: Category,
        reference_id: i64,
        values: &[f32],
    ) -> Result<i64, CoreError> {
        if category == Category::Unknown {
            return Err(CoreError::InvalidInput("cannot enroll category 'unknown'".into()));
        }
        let embedding_id = self.gallery.insert(category, reference_id, values)?;
        tracing::info!(embedding_id, %category, reference_id, "embedding enrolled");
        Ok(embedding_id)
    }

    fn decide_vector(
        &self,
        attempt_id: Uuid,
        query: &[f32],
        hint: Option<Category>,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, CoreError> {
        let result = self
            .matcher
            .match_gallery(query, &*self.gallery, hint, self.scan_page_size)?;
        if result.skipped > 0 {
            tracing::warn!(%attempt_id, skipped = result.skipped, "corrupt gallery records skipped");
        }

        let outcome = self.evaluate(&result, now)?;
        self.finish(attempt_id, now, outcome)
    }

    fn evaluate(&self, result: &MatchResult, now: DateTime<Utc>) -> Result<Outcome, CoreError> {
        let candidate = match (result.verdict, &result.candidate) {
            (Verdict::NoGallery, _) | (Verdict::Match, None) => {
                return Ok(Outcome::denied_unknown(Reason::NoGallery, 0.0));
            }
            (Verdict::NoMatch, _) => {
                return Ok(Outcome::denied_unknown(
                    Reason::NoMatch,
                    clamp_confidence(result.similarity),
                ));
            }
            (Verdict::Match, Some(candidate)) => candidate,
        };

        let display_name = self
            .resolver
            .resolve_name(candidate.category, candidate.reference_id);
        let confidence = clamp_confidence(result.similarity);

        let in_window = if candidate.category.has_validity_window() {
            self.validity
                .is_valid(candidate.reference_id, now.date_naive())?
        } else {
            true
        };

        let (decision, reason) = if in_window {
            (Decision::Granted, Reason::Matched)
        } else {
            (Decision::Denied, Reason::Expired)
        };

        Ok(Outcome {
            decision,
            reason,
            display_name,
            category: candidate.category,
            confidence,
            embedding_id: Some(candidate.embedding_id),
        })
    }

    fn finish(
        &self,
        attempt_id: Uuid,
        now: DateTime<Utc>,
        outcome: Outcome,
    ) -> Result<AccessDecision, CoreError> {
        let log_id = self.log.log(
            attempt_id,
            now,
            Some(&outcome.display_name),
            outcome.category.as_str(),
            outcome.confidence,
            outcome.decision.access_result(),
            outcome.embedding_id,
        )?;

        let confidence = clamp_confidence(outcome.confidence);
        Ok(AccessDecision {
            attempt_id,
            log_id,
            decision: outcome.decision,
            reason: outcome.reason,
            message: outcome.reason.message(&outcome.display_name),
            display_name: outcome.display_name,
            category: outcome.category,
            confidence,
            confidence_pct: confidence_percent(confidence),
            matched_embedding_id: outcome.embedding_id,
            decided_at: now,
        })
    }
}
