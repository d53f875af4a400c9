//! Error types for dbxform.

use thiserror::Error;

use crate::element::ElementType;

/// The main error type for dbxform operations.
#[derive(Error, Debug)]
pub enum TransformError {
    /// An object could not be found in the upstream database cache.
    #[error("object not in cache: {0}")]
    NotInCache(String),

    /// A conversion was requested for an element type with no conversion path.
    #[error("unsupported element type '{0}'")]
    UnsupportedElementType(ElementType),

    /// A remap index does not address a tuple of the source array.
    #[error("index {index} out of range for array with {len} tuples")]
    IndexOutOfRange { index: usize, len: usize },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A dataset is structurally inconsistent.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransformError {
    /// Returns true for the recoverable "not yet cached" condition.
    #[must_use]
    pub fn is_not_in_cache(&self) -> bool {
        matches!(self, Self::NotInCache(_))
    }
}

/// A specialized Result type for dbxform operations.
pub type Result<T> = std::result::Result<T, TransformError>;
