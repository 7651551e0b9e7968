//! Source-vs-index count reconciliation

use crate::generation::{GenerationDirectoryManager, GenerationError};
use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::metrics::LIFECYCLE_METRICS;
use crate::lifecycle::source::EntitySources;
use crate::lifecycle::syncer::IncrementalSyncer;
use crate::models::{ticks_from_datetime, IndexKey};
use crate::search::{IndexEngine, TantivyEngine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts of one index for a creation-time window `[from, to)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub key: IndexKey,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub source_count: u64,
    pub index_count: u64,
}

impl ReconciliationResult {
    pub fn tenant_alias(&self) -> &str {
        self.key.tenant.as_str()
    }

    /// Source count minus index count
    pub fn drift(&self) -> i64 {
        self.source_count as i64 - self.index_count as i64
    }

    pub fn is_consistent(&self) -> bool {
        self.source_count == self.index_count
    }

    /// Turn a mismatch into [`LifecycleError::DriftDetected`]
    pub fn ensure_consistent(self) -> LifecycleResult<Self> {
        if self.is_consistent() {
            Ok(self)
        } else {
            Err(LifecycleError::DriftDetected {
                key: self.key,
                source_count: self.source_count,
                index_count: self.index_count,
            })
        }
    }
}

/// Read-only comparison of the read model with the live index
pub struct DriftReconciler<E: IndexEngine = TantivyEngine> {
    engine: Arc<E>,
    generations: Arc<GenerationDirectoryManager>,
    sources: EntitySources,
}

impl<E: IndexEngine> DriftReconciler<E> {
    pub fn new(engine: Arc<E>, generations: Arc<GenerationDirectoryManager>, sources: EntitySources) -> Self {
        Self {
            engine,
            generations,
            sources,
        }
    }

    /// Reconciler over the same engine, generations and sources as `syncer`
    pub fn from_syncer(syncer: &IncrementalSyncer<E>) -> Self {
        Self::new(
            syncer.engine().clone(),
            syncer.generations().clone(),
            syncer.sources().clone(),
        )
    }

    /// Count entities created in `[from, to)` in the source store and in the live index
    pub async fn count_between(
        &self,
        key: &IndexKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LifecycleResult<ReconciliationResult> {
        let from_ticks = ticks_from_datetime(from);
        let to_ticks = ticks_from_datetime(to);

        let source_count = self
            .sources
            .get(key.kind)?
            .count_created_between(&key.tenant, key.environment, from_ticks, to_ticks)
            .await?;

        let index_count = match self.generations.get_live_directory(key) {
            Ok(dir) => {
                let engine = self.engine.clone();
                tokio::task::spawn_blocking(move || {
                    let searcher = engine.open_searcher(&dir)?;
                    engine.count_created_between(&searcher, from_ticks, to_ticks)
                })
                .await??
            }
            Err(GenerationError::NoLiveGenerationFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };

        debug!(index = %key, source_count, index_count, "Counted entities");
        Ok(ReconciliationResult {
            key: key.clone(),
            from,
            to,
            source_count,
            index_count,
        })
    }

    /// Count, record the drift gauge and warn on mismatch
    pub async fn check(
        &self,
        key: &IndexKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LifecycleResult<ReconciliationResult> {
        let result = self.count_between(key, from, to).await?;
        LIFECYCLE_METRICS.record_drift(key, result.source_count, result.index_count);

        if !result.is_consistent() {
            warn!(
                index = %key,
                source_count = result.source_count,
                index_count = result.index_count,
                drift = result.drift(),
                from = %from,
                to = %to,
                "Drift detected between source store and index"
            );
        }
        Ok(result)
    }
}
