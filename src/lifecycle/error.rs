//! Error types for the index lifecycle

use crate::error::AppError;
use crate::generation::GenerationError;
use crate::lifecycle::regeneration::RegenerationState;
use crate::models::{EntityKind, IndexKey};
use crate::search::SearchError;

/// Result type for lifecycle operations
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Errors raised while syncing, regenerating or reconciling an index
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// One incremental page could not be fetched, enriched or committed
    #[error("Sync of {key} failed on page {page}: {reason}")]
    SyncPageFailed {
        key: IndexKey,
        page: u32,
        reason: String,
    },

    /// A full rebuild stopped before promotion
    #[error("Regeneration of {key} aborted while {state}: {reason}")]
    RegenerationAborted {
        key: IndexKey,
        state: RegenerationState,
        reason: String,
    },

    /// The new generation could not be made live
    #[error("Promotion of {key} failed: {reason}")]
    PromotionFailed { key: IndexKey, reason: String },

    /// Source store and index disagree on a count
    #[error("Drift detected for {key}: source has {source_count}, index has {index_count}")]
    DriftDetected {
        key: IndexKey,
        source_count: u64,
        index_count: u64,
    },

    /// Cancellation was requested between pages
    #[error("Operation on {0} cancelled")]
    Cancelled(IndexKey),

    /// The read model could not be queried
    #[error("Source store error: {0}")]
    Source(String),

    /// No batch source is registered for the kind
    #[error("No entity source registered for {0}")]
    NoSource(EntityKind),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A blocking engine task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl LifecycleError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            LifecycleError::Cancelled(_) => true,
            LifecycleError::RegenerationAborted { reason, .. } => reason == CANCELLED_REASON,
            _ => false,
        }
    }
}

pub(crate) const CANCELLED_REASON: &str = "cancelled";

impl From<tokio::task::JoinError> for LifecycleError {
    fn from(err: tokio::task::JoinError) -> Self {
        LifecycleError::Task(err.to_string())
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::SyncPageFailed { .. } => AppError::SyncPageFailed(err.to_string()),
            LifecycleError::RegenerationAborted { .. } => AppError::RegenerationAborted(err.to_string()),
            LifecycleError::PromotionFailed { .. } => AppError::PromotionFailed(err.to_string()),
            LifecycleError::DriftDetected { .. } => AppError::DriftDetected(err.to_string()),
            LifecycleError::Cancelled(_) => AppError::Cancelled(err.to_string()),
            LifecycleError::Source(msg) => AppError::Source(msg),
            LifecycleError::NoSource(_) => AppError::Configuration(err.to_string()),
            LifecycleError::Search(e) => e.into(),
            LifecycleError::Generation(e) => e.into(),
            LifecycleError::Task(msg) => AppError::Internal(msg),
        }
    }
}
