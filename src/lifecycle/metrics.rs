//! Prometheus metrics for the index lifecycle

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

use crate::models::IndexKey;

/// Lifecycle metrics collection
pub struct LifecycleMetrics {
    /// Documents committed by incremental syncs and rebuilds
    pub documents_written: CounterVec,

    /// Incremental pages that failed to commit
    pub sync_pages_failed: CounterVec,

    /// Regeneration outcomes by result
    pub regenerations_total: CounterVec,

    /// Duration of a full regeneration of one index
    pub regeneration_duration: HistogramVec,

    /// Source count minus index count from the last drift check
    pub drift: GaugeVec,

    /// Highest indexed modification tick
    pub watermark: GaugeVec,
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self {
            documents_written: register_counter_vec!(
                "index_documents_written_total",
                "Total number of documents committed to an index",
                &["environment", "kind", "phase"]
            )
            .unwrap(),

            sync_pages_failed: register_counter_vec!(
                "index_sync_pages_failed_total",
                "Total number of incremental pages that failed",
                &["environment", "kind"]
            )
            .unwrap(),

            regenerations_total: register_counter_vec!(
                "index_regenerations_total",
                "Total number of regenerations by outcome",
                &["environment", "kind", "outcome"]
            )
            .unwrap(),

            regeneration_duration: register_histogram_vec!(
                "index_regeneration_duration_seconds",
                "Regeneration duration in seconds",
                &["environment", "kind"],
                vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0]
            )
            .unwrap(),

            drift: register_gauge_vec!(
                "index_count_drift",
                "Source count minus index count for the last reconciled window",
                &["tenant", "environment", "kind"]
            )
            .unwrap(),

            watermark: register_gauge_vec!(
                "index_watermark_ticks",
                "Highest last-modified tick present in the live index",
                &["tenant", "environment", "kind"]
            )
            .unwrap(),
        }
    }

    pub fn record_documents(&self, key: &IndexKey, phase: &str, count: usize) {
        self.documents_written
            .with_label_values(&[&key.environment.to_string(), &key.kind.to_string(), phase])
            .inc_by(count as f64);
    }

    pub fn record_page_failed(&self, key: &IndexKey) {
        self.sync_pages_failed
            .with_label_values(&[&key.environment.to_string(), &key.kind.to_string()])
            .inc();
    }

    pub fn record_regeneration(&self, key: &IndexKey, outcome: &str, duration_secs: f64) {
        let environment = key.environment.to_string();
        let kind = key.kind.to_string();
        self.regenerations_total
            .with_label_values(&[&environment, &kind, outcome])
            .inc();
        self.regeneration_duration
            .with_label_values(&[&environment, &kind])
            .observe(duration_secs);
    }

    pub fn record_drift(&self, key: &IndexKey, source_count: u64, index_count: u64) {
        self.drift
            .with_label_values(&[key.tenant.as_str(), &key.environment.to_string(), &key.kind.to_string()])
            .set(source_count as f64 - index_count as f64);
    }

    pub fn record_watermark(&self, key: &IndexKey, ticks: i64) {
        self.watermark
            .with_label_values(&[key.tenant.as_str(), &key.environment.to_string(), &key.kind.to_string()])
            .set(ticks as f64);
    }
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Global lifecycle metrics instance
    pub static ref LIFECYCLE_METRICS: LifecycleMetrics = LifecycleMetrics::new();
}

/// Initialize lifecycle metrics (idempotent)
pub fn init_lifecycle_metrics() {
    lazy_static::initialize(&LIFECYCLE_METRICS);
}
