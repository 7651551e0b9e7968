//! Configuration for the scheduler module

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the scheduler service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound on a single job execution, in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Predefined jobs configuration
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl SchedulerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Configuration for the predefined maintenance jobs
///
/// Schedules are six-field cron expressions (seconds first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Catch every live index up with the read model
    pub incremental_sync: JobConfig,

    /// Rebuild every index into a fresh generation
    pub regenerate_indexes: JobConfig,

    /// Compare source and index counts
    pub reconcile_counts: JobConfig,
}

/// Configuration for a single scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Whether this job is enabled
    pub enabled: bool,

    /// Cron expression for scheduling
    pub schedule: String,
}

impl JobConfig {
    fn new(schedule: &str) -> Self {
        Self {
            enabled: true,
            schedule: schedule.to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_timeout_secs: default_job_timeout_secs(),
            jobs: JobsConfig::default(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            incremental_sync: JobConfig::new("0 * * * * *"),      // Every minute
            regenerate_indexes: JobConfig::new("0 0 3 * * Sun"),  // Weekly, Sunday 3 AM
            reconcile_counts: JobConfig::new("0 15 * * * *"),     // Hourly at :15
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_job_timeout_secs() -> u64 {
    7200
}

/// Builder for SchedulerConfig
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout_secs = timeout.as_secs();
        self
    }

    pub fn incremental_sync(mut self, schedule: impl Into<String>) -> Self {
        self.config.jobs.incremental_sync.schedule = schedule.into();
        self
    }

    pub fn regenerate_indexes(mut self, schedule: impl Into<String>) -> Self {
        self.config.jobs.regenerate_indexes.schedule = schedule.into();
        self
    }

    pub fn reconcile_counts(mut self, schedule: impl Into<String>) -> Self {
        self.config.jobs.reconcile_counts.schedule = schedule.into();
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
