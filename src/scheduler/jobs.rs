//! Job definitions and management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a scheduled job
pub type JobId = Uuid;

/// Status of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is scheduled and will run
    Scheduled,
    /// Job is currently running
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
    /// Job is cancelled
    Cancelled,
}

/// Metadata about a scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Unique job identifier
    pub id: JobId,

    /// Human-readable job name
    pub name: String,

    /// Job description
    pub description: Option<String>,

    /// Cron expression
    pub schedule: String,

    /// Current job status
    pub status: JobStatus,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job last ran
    pub last_run: Option<DateTime<Utc>>,

    /// Number of times the job has run
    pub run_count: u64,

    /// Number of successful runs
    pub success_count: u64,

    /// Number of failed runs
    pub failure_count: u64,

    /// Ticks skipped because the previous run was still going
    pub skipped_count: u64,

    /// Average execution duration in milliseconds
    pub avg_duration_ms: f64,
}

impl JobMetadata {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            schedule: schedule.into(),
            status: JobStatus::Scheduled,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            avg_duration_ms: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn update_execution(&mut self, success: bool, duration_ms: u64) {
        self.run_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        // Update average duration using incremental formula
        self.avg_duration_ms = ((self.avg_duration_ms * (self.run_count - 1) as f64)
            + duration_ms as f64)
            / self.run_count as f64;

        self.last_run = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.run_count as f64) * 100.0
        }
    }
}

/// Context passed to job execution functions
#[derive(Clone)]
pub struct JobContext {
    /// Job metadata at the start of this run
    pub metadata: JobMetadata,

    /// Cancelled when the scheduler shuts down
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(metadata: JobMetadata, cancel: CancellationToken) -> Self {
        Self { metadata, cancel }
    }
}

type JobFn = dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync;

/// A scheduled job
///
/// Runs never overlap: a tick that fires while the previous run is still
/// in progress is skipped.
pub struct Job {
    /// Job metadata
    pub metadata: Arc<tokio::sync::RwLock<JobMetadata>>,

    /// Job execution function
    execute: Arc<JobFn>,

    in_flight: AtomicBool,
}

impl Job {
    pub fn new<F, Fut>(metadata: JobMetadata, execute: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            metadata: Arc::new(tokio::sync::RwLock::new(metadata)),
            execute: Arc::new(move |ctx| Box::pin(execute(ctx))),
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn get_metadata(&self) -> JobMetadata {
        self.metadata.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the job unless a previous run is still in progress
    ///
    /// Returns `None` when the run was skipped.
    pub async fn execute(&self, cancel: CancellationToken) -> Option<Result<(), String>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.metadata.write().await.skipped_count += 1;
            return None;
        }

        let start = std::time::Instant::now();

        // Update status to Running
        let ctx = {
            let mut metadata = self.metadata.write().await;
            metadata.status = JobStatus::Running;
            JobContext::new(metadata.clone(), cancel.clone())
        };

        // Execute the job
        let result = (self.execute)(ctx).await;

        // Update execution statistics
        let duration_ms = start.elapsed().as_millis() as u64;
        {
            let mut metadata = self.metadata.write().await;
            metadata.update_execution(result.is_ok(), duration_ms);
            metadata.status = match (&result, cancel.is_cancelled()) {
                (_, true) => JobStatus::Cancelled,
                (Ok(()), false) => JobStatus::Completed,
                (Err(_), false) => JobStatus::Failed,
            };
        }

        self.in_flight.store(false, Ordering::SeqCst);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_overlapping_runs_are_skipped() {
        let job = Arc::new(Job::new(JobMetadata::new("slow", "* * * * * *"), |_ctx| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }));

        let first = {
            let job = job.clone();
            tokio::spawn(async move { job.execute(CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(job.execute(CancellationToken::new()).await.is_none());
        assert!(matches!(first.await.unwrap(), Some(Ok(()))));

        let metadata = job.get_metadata().await;
        assert_eq!(metadata.run_count, 1);
        assert_eq!(metadata.skipped_count, 1);
        assert_eq!(metadata.status, JobStatus::Completed);
    }
}
