//! Embedding extractor capability.
//!
//! The model behind it is opaque. The decision engine receives one instance at
//! construction and drives its lifecycle through [`EmbeddingExtractor::init`]
//! and [`EmbeddingExtractor::shutdown`].

use thiserror::Error;

/// Normal outcomes of an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Face(Vec<f32>),
    NoFace,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The bytes are not an image in any supported codec.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("extractor timed out")]
    Timeout,
    #[error("malformed extractor reply: {0}")]
    Malformed(String),
    #[error("extractor is closed")]
    Closed,
}

/// Turns raw image bytes into a fixed-length embedding.
///
/// Extraction may block for a long time (model inference). Implementations
/// must be safe for concurrent use.
pub trait EmbeddingExtractor: Send + Sync {
    /// Dimension of the vectors this extractor produces.
    fn dimension(&self) -> usize;

    /// Acquire whatever the extractor needs (model, remote session).
    fn init(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    fn extract(&self, image: &[u8]) -> Result<Extraction, ExtractError>;

    /// Release resources. Later `extract` calls fail with [`ExtractError::Closed`].
    fn shutdown(&self) {}
}
