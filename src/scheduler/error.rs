//! Error types for the scheduler module

use crate::error::AppError;
use tokio_cron_scheduler::JobSchedulerError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while registering or driving maintenance jobs
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Failed to start scheduler: {0}")]
    StartupFailed(String),

    #[error("Failed to shutdown scheduler: {0}")]
    ShutdownFailed(String),

    /// The cron scheduler refused the job
    #[error("Failed to create job: {0}")]
    JobCreationFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job names are unique; maintenance jobs are registered once per process
    #[error("Job already exists: {0}")]
    JobAlreadyExists(String),

    /// Schedules are six-field cron expressions, seconds first
    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Cron scheduler error: {0}")]
    Cron(#[from] JobSchedulerError),
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(msg) => AppError::NotFound(msg),
            SchedulerError::InvalidCronExpression(msg) | SchedulerError::JobAlreadyExists(msg) => {
                AppError::Configuration(msg)
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}
