//! Tests for the maintenance scheduler

mod common;

use common::{tenant, Harness};
use policy_index_manager::lifecycle::MaintenanceCoordinator;
use policy_index_manager::models::Environment;
use policy_index_manager::scheduler::{
    Job, JobMetadata, JobStatus, SchedulerConfig, SchedulerConfigBuilder, SchedulerError, SchedulerService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn counting_job(name: &str, schedule: &str, counter: Arc<AtomicUsize>) -> Job {
    Job::new(JobMetadata::new(name, schedule), move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn coordinator(harness: &Harness) -> Arc<MaintenanceCoordinator> {
    Arc::new(
        MaintenanceCoordinator::new(harness.orchestrator.clone(), vec![tenant("acme")])
            .with_environments(vec![Environment::Production]),
    )
}

#[tokio::test]
async fn test_scheduler_start_stop() {
    let mut scheduler = SchedulerService::new(SchedulerConfig::default())
        .await
        .expect("Failed to create scheduler");

    assert_ok!(scheduler.start().await);
    assert!(scheduler.is_running().await, "Scheduler should be running");

    assert_ok!(scheduler.shutdown().await);
    assert!(!scheduler.is_running().await, "Scheduler should not be running");
}

#[tokio::test]
async fn test_disabled_scheduler_does_not_start() {
    let config = SchedulerConfigBuilder::new().enabled(false).build();
    let mut scheduler = SchedulerService::new(config).await.unwrap();

    assert_ok!(scheduler.start().await);
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_job_runs_on_schedule() {
    let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
    scheduler.start().await.unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let job_id = scheduler
        .add_job(counting_job("every_second", "* * * * * *", counter.clone()))
        .await
        .expect("Failed to add job");

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let count = counter.load(Ordering::SeqCst);
    assert!(count >= 1, "Job should have run at least once, got {}", count);

    let metadata = scheduler.get_job_metadata(&job_id).await.unwrap();
    assert!(metadata.run_count >= 1);
    assert_eq!(metadata.failure_count, 0);
    assert_eq!(metadata.status, JobStatus::Completed);

    scheduler.remove_job(&job_id).await.unwrap();
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_job_names_are_rejected() {
    let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    assert_ok!(scheduler.add_job(counting_job("sync", "0 * * * * *", counter.clone())).await);
    let result = scheduler.add_job(counting_job("sync", "30 * * * * *", counter)).await;
    assert!(matches!(result, Err(SchedulerError::JobAlreadyExists(name)) if name == "sync"));
    assert_eq!(scheduler.list_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_cron_expression() {
    let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let result = scheduler.add_job(counting_job("broken", "every tuesday", counter)).await;
    assert!(matches!(result, Err(SchedulerError::InvalidCronExpression(_))));
    assert!(scheduler.list_jobs().await.is_empty());
}

#[tokio::test]
async fn test_remove_job() {
    let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let job_id = scheduler
        .add_job(counting_job("hourly", "0 0 * * * *", counter))
        .await
        .unwrap();

    assert_ok!(scheduler.remove_job(&job_id).await);
    assert!(scheduler.list_jobs().await.is_empty());
    assert_err!(scheduler.remove_job(&job_id).await);
    assert!(matches!(
        scheduler.get_job_metadata(&job_id).await,
        Err(SchedulerError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_register_maintenance_jobs() {
    let harness = Harness::new(100);
    let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();

    let ids = scheduler
        .register_maintenance_jobs(coordinator(&harness), chrono::Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);

    let names: Vec<String> = scheduler.list_jobs().await.into_iter().map(|j| j.name).collect();
    assert_eq!(names, vec!["incremental_sync", "reconcile_counts", "regenerate_indexes"]);

    let stats = scheduler.get_stats().await;
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.total_executions, 0);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn test_disabled_maintenance_jobs_are_not_registered() {
    let harness = Harness::new(100);
    let mut config = SchedulerConfig::default();
    config.jobs.regenerate_indexes.enabled = false;
    config.jobs.reconcile_counts.enabled = false;
    let scheduler = SchedulerService::new(config).await.unwrap();

    let ids = scheduler
        .register_maintenance_jobs(coordinator(&harness), chrono::Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(scheduler.list_jobs().await[0].name, "incremental_sync");
}

#[tokio::test]
async fn test_overlapping_ticks_are_skipped() {
    let mut scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
    scheduler.start().await.unwrap();

    let job = Job::new(JobMetadata::new("slow", "* * * * * *"), |_ctx| async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        Ok(())
    });
    let job_id = scheduler.add_job(job).await.unwrap();

    tokio::time::sleep(Duration::from_millis(4000)).await;

    let metadata = scheduler.get_job_metadata(&job_id).await.unwrap();
    assert!(metadata.skipped_count >= 1, "expected skipped ticks, got {:?}", metadata);
    assert!(scheduler.get_stats().await.total_skipped >= 1);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timed_out_run_is_cancelled() {
    let config = SchedulerConfigBuilder::new()
        .job_timeout(Duration::from_secs(1))
        .build();
    let mut scheduler = SchedulerService::new(config).await.unwrap();
    scheduler.start().await.unwrap();

    let cancelled = Arc::new(AtomicUsize::new(0));
    let job = {
        let cancelled = cancelled.clone();
        Job::new(JobMetadata::new("stuck", "* * * * * *"), move |ctx| {
            let cancelled = cancelled.clone();
            async move {
                ctx.cancel.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
                Err("cancelled".to_string())
            }
        })
    };
    scheduler.add_job(job).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(cancelled.load(Ordering::SeqCst) >= 1);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_maintenance_tasks_run_against_coordinator() {
    let harness = Harness::new(100);
    let coordinator = coordinator(&harness);
    let ctx = policy_index_manager::scheduler::JobContext::new(
        JobMetadata::new("incremental_sync", "0 * * * * *"),
        tokio_util::sync::CancellationToken::new(),
    );

    assert_ok!(policy_index_manager::scheduler::incremental_sync(ctx.clone(), coordinator.clone()).await);
    assert_ok!(
        policy_index_manager::scheduler::reconcile_counts(ctx.clone(), coordinator.clone(), chrono::Duration::hours(1))
            .await
    );
    assert_ok!(policy_index_manager::scheduler::regenerate_indexes(ctx, coordinator).await);

    let key = common::policy_key("acme", Environment::Production);
    assert!(harness.generations.live_generation(&key).unwrap().is_some());
}
