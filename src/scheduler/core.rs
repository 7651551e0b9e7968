//! Core scheduler service implementation

use super::{
    config::SchedulerConfig,
    error::{SchedulerError, SchedulerResult},
    jobs::{Job, JobId, JobMetadata, JobStatus},
    metrics::SCHEDULER_METRICS,
    tasks,
};
use crate::lifecycle::MaintenanceCoordinator;
use crate::search::IndexEngine;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_cron_scheduler::{JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct RegisteredJob {
    name: String,
    job: Arc<Job>,
    cron_id: Uuid,
}

/// Main scheduler service that manages all scheduled jobs
pub struct SchedulerService {
    /// Configuration
    config: SchedulerConfig,

    /// Underlying tokio-cron-scheduler instance
    scheduler: JobScheduler,

    /// Registered jobs
    jobs: Arc<DashMap<JobId, RegisteredJob>>,

    /// Whether the scheduler is running
    running: Arc<tokio::sync::RwLock<bool>>,

    /// Cancelled on shutdown; every run gets a child token
    cancel: CancellationToken,
}

impl SchedulerService {
    /// Create a new scheduler service
    pub async fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        info!("Initializing scheduler service");

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        Ok(Self {
            config,
            scheduler,
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(tokio::sync::RwLock::new(false)),
            cancel: CancellationToken::new(),
        })
    }

    /// Start the scheduler
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in configuration");
            return Ok(());
        }

        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Scheduler is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting scheduler service");

        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::StartupFailed(e.to_string()))?;

        info!("Scheduler service started successfully");

        Ok(())
    }

    /// Stop the scheduler and cancel in-flight runs between pages
    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        info!("Shutting down scheduler service");

        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Scheduler is not running");
                return Ok(());
            }
            *running = false;
        }

        self.cancel.cancel();

        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::ShutdownFailed(e.to_string()))?;

        info!("Scheduler service shut down successfully");

        Ok(())
    }

    /// Add a new job to the scheduler
    pub async fn add_job(&self, job: Job) -> SchedulerResult<JobId> {
        let metadata = job.get_metadata().await;
        let job_id = metadata.id;
        let job_name = metadata.name.clone();
        let schedule = metadata.schedule.clone();

        if self.jobs.iter().any(|entry| entry.value().name == job_name) {
            return Err(SchedulerError::JobAlreadyExists(job_name));
        }

        info!(job_id = %job_id, job_name = %job_name, schedule = %schedule, "Adding job to scheduler");

        let job_arc = Arc::new(job);
        let job_arc_clone = job_arc.clone();
        let cancel = self.cancel.clone();
        let timeout = self.config.job_timeout();

        // Create tokio-cron-scheduler job
        let cron_job = tokio_cron_scheduler::Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let job = job_arc_clone.clone();
            let run_cancel = cancel.child_token();
            Box::pin(async move {
                let metadata = job.get_metadata().await;
                let job_name = metadata.name.clone();
                let job_id = metadata.id;

                debug!(job_id = %job_id, job_name = %job_name, "Executing scheduled job");

                // Record metrics
                SCHEDULER_METRICS.record_execution_start(&job_name);

                // Runs past the timeout are asked to stop at the next page boundary
                let watchdog = {
                    let run_cancel = run_cancel.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        run_cancel.cancel();
                    })
                };

                let start = std::time::Instant::now();
                let result = job.execute(run_cancel).await;
                let duration = start.elapsed();
                watchdog.abort();

                match result {
                    None => {
                        SCHEDULER_METRICS.record_skipped(&job_name);
                        warn!(job_id = %job_id, job_name = %job_name, "Previous run still in progress, skipping");
                    }
                    Some(Ok(())) => {
                        SCHEDULER_METRICS.record_execution_complete(&job_name, true, duration.as_secs_f64());
                        info!(
                            job_id = %job_id,
                            job_name = %job_name,
                            duration_ms = duration.as_millis() as u64,
                            "Job executed successfully"
                        );
                    }
                    Some(Err(e)) => {
                        SCHEDULER_METRICS.record_execution_complete(&job_name, false, duration.as_secs_f64());
                        error!(
                            job_id = %job_id,
                            job_name = %job_name,
                            error = %e,
                            duration_ms = duration.as_millis() as u64,
                            "Job execution failed"
                        );
                    }
                }
            })
        })
        .map_err(|e: JobSchedulerError| SchedulerError::InvalidCronExpression(format!("{}: {}", schedule, e)))?;

        let cron_id = self
            .scheduler
            .add(cron_job)
            .await
            .map_err(|e| SchedulerError::JobCreationFailed(e.to_string()))?;

        self.jobs.insert(
            job_id,
            RegisteredJob {
                name: job_name.clone(),
                job: job_arc,
                cron_id,
            },
        );

        info!(job_id = %job_id, job_name = %job_name, "Job added successfully");

        // Update metrics
        SCHEDULER_METRICS.update_job_count(self.jobs.len() as f64);

        Ok(job_id)
    }

    /// Register the predefined maintenance jobs enabled in configuration
    pub async fn register_maintenance_jobs<E: IndexEngine>(
        &self,
        coordinator: Arc<MaintenanceCoordinator<E>>,
        reconcile_window: chrono::Duration,
    ) -> SchedulerResult<Vec<JobId>> {
        let jobs = self.config.jobs.clone();
        let mut ids = Vec::new();

        if jobs.incremental_sync.enabled {
            let coordinator = coordinator.clone();
            let metadata = JobMetadata::new("incremental_sync", jobs.incremental_sync.schedule)
                .with_description("Catch live indexes up with the read model");
            ids.push(
                self.add_job(Job::new(metadata, move |ctx| tasks::incremental_sync(ctx, coordinator.clone())))
                    .await?,
            );
        }

        if jobs.regenerate_indexes.enabled {
            let coordinator = coordinator.clone();
            let metadata = JobMetadata::new("regenerate_indexes", jobs.regenerate_indexes.schedule)
                .with_description("Rebuild every index into a fresh generation");
            ids.push(
                self.add_job(Job::new(metadata, move |ctx| tasks::regenerate_indexes(ctx, coordinator.clone())))
                    .await?,
            );
        }

        if jobs.reconcile_counts.enabled {
            let coordinator = coordinator.clone();
            let metadata = JobMetadata::new("reconcile_counts", jobs.reconcile_counts.schedule)
                .with_description("Compare source store and index counts");
            ids.push(
                self.add_job(Job::new(metadata, move |ctx| {
                    tasks::reconcile_counts(ctx, coordinator.clone(), reconcile_window)
                }))
                .await?,
            );
        }

        Ok(ids)
    }

    /// Remove a job from the scheduler
    pub async fn remove_job(&self, job_id: &JobId) -> SchedulerResult<()> {
        info!(job_id = %job_id, "Removing job from scheduler");

        let (_, registered) = self
            .jobs
            .remove(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        self.scheduler.remove(&registered.cron_id).await?;

        // Update metrics
        SCHEDULER_METRICS.update_job_count(self.jobs.len() as f64);

        info!(job_id = %job_id, "Job removed successfully");

        Ok(())
    }

    /// Get job metadata
    pub async fn get_job_metadata(&self, job_id: &JobId) -> SchedulerResult<JobMetadata> {
        let job = self
            .jobs
            .get(job_id)
            .map(|entry| entry.value().job.clone())
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        Ok(job.get_metadata().await)
    }

    /// List all jobs
    pub async fn list_jobs(&self) -> Vec<JobMetadata> {
        let jobs: Vec<Arc<Job>> = self.jobs.iter().map(|entry| entry.value().job.clone()).collect();
        let mut metadata = Vec::with_capacity(jobs.len());
        for job in jobs {
            metadata.push(job.get_metadata().await);
        }
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    /// Get scheduler statistics
    pub async fn get_stats(&self) -> SchedulerStats {
        let jobs = self.list_jobs().await;

        let total_jobs = jobs.len();
        let running_jobs = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();

        let total_executions: u64 = jobs.iter().map(|j| j.run_count).sum();
        let total_successes: u64 = jobs.iter().map(|j| j.success_count).sum();
        let total_failures: u64 = jobs.iter().map(|j| j.failure_count).sum();
        let total_skipped: u64 = jobs.iter().map(|j| j.skipped_count).sum();

        let success_rate = if total_executions > 0 {
            (total_successes as f64 / total_executions as f64) * 100.0
        } else {
            0.0
        };

        SchedulerStats {
            total_jobs,
            running_jobs,
            total_executions,
            total_successes,
            total_failures,
            total_skipped,
            success_rate,
        }
    }

    /// Check if scheduler is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Statistics about the scheduler
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStats {
    pub total_jobs: usize,
    pub running_jobs: usize,
    pub total_executions: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_skipped: u64,
    pub success_rate: f64,
}
