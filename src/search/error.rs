//! Error types for search operations

use crate::error::AppError;
use crate::models::{EntityKind, Environment, TenantId};

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Index initialization failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Query parsing failed
    #[error("Query parsing failed: {0}")]
    QueryParsingFailed(String),

    /// Search execution failed
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// Document indexing failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// Schema error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The engine reported that the on-disk index cannot be read
    #[error("Index corruption detected: {0}")]
    IndexCorruption(String),

    /// Corruption surfaced through the search read path, with its index context
    #[error("Search index corrupted for tenant {tenant} ({environment}/{kind}): {message}")]
    SearchIndexCorrupted {
        tenant: TenantId,
        environment: Environment,
        kind: EntityKind,
        message: String,
    },

    /// The live generation could not be resolved
    #[error("Generation lookup failed: {0}")]
    Generation(String),

    /// Tantivy error
    #[error("Tantivy error: {0}")]
    TantivyError(String),
}

impl SearchError {
    /// Whether this error means the index must be regenerated
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SearchError::IndexCorruption(_) | SearchError::SearchIndexCorrupted { .. }
        )
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        use tantivy::TantivyError;

        match err {
            TantivyError::DataCorruption(_)
            | TantivyError::IncompatibleIndex(_)
            | TantivyError::OpenReadError(_) => SearchError::IndexCorruption(err.to_string()),
            other => SearchError::TantivyError(other.to_string()),
        }
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        SearchError::QueryParsingFailed(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::QueryParsingFailed(msg) => AppError::Validation(msg),
            err if err.is_corruption() => AppError::IndexCorrupted(err.to_string()),
            SearchError::IoError(err) => AppError::Io(err),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
