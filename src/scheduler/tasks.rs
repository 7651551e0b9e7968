//! Predefined scheduled tasks for index maintenance

use super::jobs::JobContext;
use crate::lifecycle::MaintenanceCoordinator;
use crate::search::IndexEngine;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catch every live index up with the read model
///
/// A failing index is reported and retried on the next tick from its own
/// watermark; the others are unaffected.
///
/// Default schedule: Every minute (`0 * * * * *`)
pub async fn incremental_sync<E: IndexEngine>(
    ctx: JobContext,
    coordinator: Arc<MaintenanceCoordinator<E>>,
) -> Result<(), String> {
    debug!(job = %ctx.metadata.name, "Starting incremental_sync task");

    let summary = coordinator.run_incremental_sync(&ctx.cancel).await;

    if summary.failures.is_empty() {
        Ok(())
    } else {
        let failed: Vec<String> = summary.failures.iter().map(|f| f.key.to_string()).collect();
        Err(format!(
            "Incremental sync failed for {} of {} indexes: {}",
            failed.len(),
            summary.succeeded + failed.len(),
            failed.join(", ")
        ))
    }
}

/// Rebuild every index into a fresh generation
///
/// Tenants run concurrently; each tenant's environments run one after the
/// other. Live generations keep serving throughout.
///
/// Default schedule: Weekly on Sunday at 3 AM (`0 0 3 * * Sun`)
pub async fn regenerate_indexes<E: IndexEngine>(
    ctx: JobContext,
    coordinator: Arc<MaintenanceCoordinator<E>>,
) -> Result<(), String> {
    info!(job = %ctx.metadata.name, tenants = coordinator.tenants().len(), "Starting regenerate_indexes task");

    let summaries = coordinator.run_regeneration(&ctx.cancel).await;

    let completed: usize = summaries.iter().map(|s| s.completed.len()).sum();
    let failed: Vec<String> = summaries
        .iter()
        .flat_map(|s| s.failed.iter().map(|(key, _)| key.to_string()))
        .collect();
    let skipped: usize = summaries.iter().map(|s| s.skipped.len()).sum();

    info!(completed, failed = failed.len(), skipped, "Regeneration task finished");

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("Regeneration failed for: {}", failed.join(", ")))
    }
}

/// Compare source and index counts for recently created entities
///
/// Drift is reported, never repaired here; a regeneration is the repair.
///
/// Default schedule: Hourly at quarter past (`0 15 * * * *`)
pub async fn reconcile_counts<E: IndexEngine>(
    ctx: JobContext,
    coordinator: Arc<MaintenanceCoordinator<E>>,
    window: chrono::Duration,
) -> Result<(), String> {
    debug!(job = %ctx.metadata.name, window_hours = window.num_hours(), "Starting reconcile_counts task");

    let summary = coordinator.run_reconciliation(window).await;

    for drifted in &summary.drifted {
        warn!(
            index = %drifted.key,
            source_count = drifted.source_count,
            index_count = drifted.index_count,
            "Index out of step with source store"
        );
    }

    if summary.failures.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Reconciliation failed for {} indexes",
            summary.failures.len()
        ))
    }
}
