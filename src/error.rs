use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The read model could not be queried
    #[error("Source store error: {0}")]
    Source(String),

    /// The search engine reported an unreadable index; only a regeneration repairs it
    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    /// A full rebuild stopped before promotion; the live generation is untouched
    #[error("Regeneration aborted: {0}")]
    RegenerationAborted(String),

    /// An incremental batch did not commit; the watermark was not advanced
    #[error("Sync page failed: {0}")]
    SyncPageFailed(String),

    /// The live pointer swap did not happen; the previous live generation still serves
    #[error("Promotion failed: {0}")]
    PromotionFailed(String),

    /// Source and index counts disagree
    #[error("Drift detected: {0}")]
    DriftDetected(String),

    /// Operation was cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Source(_) => "SOURCE_ERROR",
            AppError::IndexCorrupted(_) => "INDEX_CORRUPTED",
            AppError::RegenerationAborted(_) => "REGENERATION_ABORTED",
            AppError::SyncPageFailed(_) => "SYNC_PAGE_FAILED",
            AppError::PromotionFailed(_) => "PROMOTION_FAILED",
            AppError::DriftDetected(_) => "DRIFT_DETECTED",
            AppError::Cancelled(_) => "CANCELLED",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying on the next scheduled run is expected to succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::Source(_)
                | AppError::SyncPageFailed(_)
                | AppError::RegenerationAborted(_)
                | AppError::PromotionFailed(_)
                | AppError::Cancelled(_)
                | AppError::Timeout(_)
        )
    }

    /// Process exit code used by the command line tool
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Configuration(_) => 2,
            AppError::NotFound(_) => 3,
            AppError::IndexCorrupted(_) => 4,
            AppError::DriftDetected(_) => 5,
            _ => 1,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl From<crate::models::InvalidTenantId> for AppError {
    fn from(err: crate::models::InvalidTenantId) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
