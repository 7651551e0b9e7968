//! Scheduled index maintenance
//!
//! Cron-driven jobs built on tokio-cron-scheduler: incremental sync of every
//! live index, periodic full regeneration and count reconciliation.
//!
//! - Runs of the same job never overlap; a tick that fires during a run is skipped
//! - Shutdown and job timeouts cancel runs cooperatively between pages
//! - Prometheus metrics for executions, durations and skips
//!
//! # Example
//!
//! ```no_run
//! use policy_index_manager::scheduler::{SchedulerConfig, SchedulerService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SchedulerConfig::default();
//!     let mut scheduler = SchedulerService::new(config).await?;
//!
//!     scheduler.start().await?;
//!
//!     // Scheduler runs in background
//!     tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
//!
//!     scheduler.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod jobs;
mod metrics;
mod tasks;

pub use config::{JobConfig, JobsConfig, SchedulerConfig, SchedulerConfigBuilder};
pub use core::{SchedulerService, SchedulerStats};
pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{Job, JobContext, JobId, JobMetadata, JobStatus};
pub use metrics::{init_scheduler_metrics, SCHEDULER_METRICS};
pub use tasks::{incremental_sync, reconcile_counts, regenerate_indexes};
