use crate::category::Category;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimension of face embeddings produced by the extractor.
pub const FACE_EMBEDDING_DIM: usize = 512;

/// Dimension of the enrolled vectors used by posted-embedding attendance.
pub const ATTENDANCE_EMBEDDING_DIM: usize = 128;

/// One enrolled vector. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub embedding_id: i64,
    pub category: Category,
    /// Key into the category-specific identity table.
    pub reference_id: i64,
    pub vector: Vec<f32>,
}

/// Outcome persisted in the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessResult {
    Granted,
    Denied,
}

impl AccessResult {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessResult::Granted => "granted",
            AccessResult::Denied => "denied",
        }
    }

    /// Parse a persisted value; anything but `granted` reads as denied.
    pub fn from_stored(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("granted") {
            AccessResult::Granted
        } else {
            AccessResult::Denied
        }
    }
}

/// A normalized access event ready to be appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAccessEvent {
    /// Unique per recognition attempt; the store ignores a second write.
    pub attempt_id: Uuid,
    pub access_time: DateTime<Utc>,
    pub recognized_person: String,
    pub category: Category,
    /// Always within [0, 1].
    pub confidence: f32,
    pub access_result: AccessResult,
    pub embedding_id: Option<i64>,
}

/// A persisted access event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub log_id: i64,
    pub attempt_id: Uuid,
    pub access_time: DateTime<Utc>,
    pub recognized_person: String,
    pub category: Category,
    pub confidence: f32,
    pub access_result: AccessResult,
    /// Weak reference; the embedding may have been deleted since.
    pub embedding_id: Option<i64>,
}

/// Reject vectors of the wrong length or holding non-finite values.
pub fn validate_vector(values: &[f32], expected: usize) -> Result<(), CoreError> {
    if values.len() != expected {
        return Err(CoreError::InvalidDimension {
            expected,
            got: values.len(),
        });
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(CoreError::InvalidInput(format!(
            "non-finite value at index {pos}"
        )));
    }
    Ok(())
}

/// L2-normalize into a new vector. Returns `None` for a zero (or non-finite) norm.
///
/// The norm is accumulated in `f64`, so large finite components do not
/// overflow.
pub fn l2_normalize(values: &[f32]) -> Option<Vec<f32>> {
    let norm = values
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 && norm.is_finite() {
        Some(values.iter().map(|x| (f64::from(*x) / norm) as f32).collect())
    } else {
        None
    }
}
