//! Error types for generation directory management

use crate::error::AppError;
use crate::models::IndexKey;
use std::path::PathBuf;

/// Result type for generation operations
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// Errors raised while managing generation directories
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Nothing has been bootstrapped for this index yet
    #[error("No live generation found for {0}")]
    NoLiveGenerationFound(IndexKey),

    /// Promotion was requested without a prepared regeneration directory
    #[error("No regeneration directory prepared for {0}")]
    NoRegenerationDirectory(IndexKey),

    /// Promotion did not happen; the previous live generation is still serving
    #[error("Promotion failed for {key}: {reason}")]
    PromotionFailed { key: IndexKey, reason: String },

    /// The generation manifest could not be parsed
    #[error("Generation manifest at {} is corrupted: {reason}", path.display())]
    ManifestCorrupted { path: PathBuf, reason: String },

    /// Filesystem error with context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenerationError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GenerationError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::NoLiveGenerationFound(_) | GenerationError::NoRegenerationDirectory(_) => {
                AppError::NotFound(err.to_string())
            }
            GenerationError::PromotionFailed { .. } => AppError::PromotionFailed(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
