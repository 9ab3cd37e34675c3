use crate::extractor::ExtractError;
use thiserror::Error;

/// Infrastructure failure reported by a storage collaborator.
///
/// Never retried inside the core; the caller decides what to do with it.
#[derive(Error, Debug)]
#[error("storage unavailable: {0}")]
pub struct StorageError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl StorageError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Errors surfaced by the matching core.
///
/// Negative access outcomes (no face, no gallery, below threshold, expired)
/// are not errors; they come back as a denied [`crate::AccessDecision`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },
    #[error("invalid embedding format: expected {expected} floats, got {got}")]
    InvalidEmbeddingFormat { expected: usize, got: usize },
    /// Only raised by enrollment; a decision turns this into a denial.
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no embedding extractor configured")]
    NoExtractor,
    /// Extractor failure outside a decision (enrollment, startup).
    #[error("extractor failed: {0}")]
    Extractor(#[from] ExtractError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// True for caller mistakes, false for infrastructure trouble.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_)
                | CoreError::InvalidDimension { .. }
                | CoreError::InvalidEmbeddingFormat { .. }
                | CoreError::NoFaceDetected
        )
    }
}
