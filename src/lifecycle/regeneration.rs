//! Full rebuild of an index into a fresh generation

use crate::lifecycle::error::{LifecycleError, LifecycleResult, CANCELLED_REASON};
use crate::lifecycle::locks::IndexLockRegistry;
use crate::lifecycle::metrics::LIFECYCLE_METRICS;
use crate::lifecycle::syncer::{IncrementalSyncer, SyncOutcome};
use crate::models::{EntityKind, Environment, IndexKey, TenantId};
use crate::search::{IndexEngine, TantivyEngine};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a regeneration of one index currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RegenerationState {
    #[default]
    Idle,
    Preparing,
    Streaming,
    Promoting,
    Catchup,
    Failed,
}

/// Result of one successful regeneration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub key: IndexKey,

    /// Generation that is now live
    pub generation: u64,

    /// Live watermark when the rebuild started; catch-up replays everything after it
    pub cutoff_ticks: Option<i64>,

    pub streamed_documents: usize,
    pub streamed_pages: u32,
    pub caught_up_documents: usize,
    pub pruned_generations: Vec<u64>,
    pub duration_ms: u64,
}

impl RegenerationReport {
    pub fn documents_per_second(&self) -> f64 {
        let seconds = self.duration_ms as f64 / 1000.0;
        if seconds > 0.0 {
            self.streamed_documents as f64 / seconds
        } else {
            self.streamed_documents as f64
        }
    }
}

/// Outcome of regenerating every index of one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRegenerationSummary {
    pub tenant: TenantId,
    pub completed: Vec<RegenerationReport>,
    pub failed: Vec<(IndexKey, String)>,
    pub skipped: Vec<IndexKey>,
}

impl TenantRegenerationSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Drives `Idle -> Preparing -> Streaming -> Promoting -> Catchup -> Idle`
///
/// At most one regeneration runs per index; the per-index lock is held
/// from preparation through catch-up, so promotion never races another
/// rebuild of the same index. Incremental syncs keep writing to the live
/// generation meanwhile.
pub struct RegenerationOrchestrator<E: IndexEngine = TantivyEngine> {
    syncer: IncrementalSyncer<E>,
    locks: IndexLockRegistry,
    states: Arc<DashMap<IndexKey, RegenerationState>>,
    pending_catchups: Arc<DashMap<IndexKey, Option<i64>>>,
    environments: Vec<Environment>,
    kinds: Vec<EntityKind>,
}

impl<E: IndexEngine> Clone for RegenerationOrchestrator<E> {
    fn clone(&self) -> Self {
        Self {
            syncer: self.syncer.clone(),
            locks: self.locks.clone(),
            states: self.states.clone(),
            pending_catchups: self.pending_catchups.clone(),
            environments: self.environments.clone(),
            kinds: self.kinds.clone(),
        }
    }
}

impl<E: IndexEngine> RegenerationOrchestrator<E> {
    pub fn new(syncer: IncrementalSyncer<E>, locks: IndexLockRegistry) -> Self {
        let kinds = syncer.sources().kinds();
        Self {
            syncer,
            locks,
            states: Arc::new(DashMap::new()),
            pending_catchups: Arc::new(DashMap::new()),
            environments: Environment::all(),
            kinds,
        }
    }

    /// Environments regenerated by [`regenerate_tenant`](Self::regenerate_tenant), in order
    pub fn with_environments(mut self, environments: Vec<Environment>) -> Self {
        self.environments = environments;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn syncer(&self) -> &IncrementalSyncer<E> {
        &self.syncer
    }

    pub fn state(&self, key: &IndexKey) -> RegenerationState {
        self.states.get(key).map(|s| *s).unwrap_or_default()
    }

    /// Whether a promoted generation still waits for its catch-up
    pub fn has_pending_catchup(&self, key: &IndexKey) -> bool {
        self.pending_catchups.contains_key(key)
    }

    /// Rebuild one index from scratch and make it live
    pub async fn regenerate(&self, key: &IndexKey, cancel: &CancellationToken) -> LifecycleResult<RegenerationReport> {
        let _guard = self.locks.acquire(key).await;
        let started = Instant::now();

        let result = self.run(key, cancel, started).await;
        let duration_secs = started.elapsed().as_secs_f64();

        match &result {
            Ok(report) => {
                LIFECYCLE_METRICS.record_regeneration(key, "completed", duration_secs);
                info!(
                    index = %key,
                    generation = report.generation,
                    documents = report.streamed_documents,
                    caught_up = report.caught_up_documents,
                    duration_ms = report.duration_ms,
                    docs_per_sec = report.documents_per_second(),
                    "Regeneration completed"
                );
            }
            Err(e) => {
                self.set_state(key, RegenerationState::Failed);
                if e.is_cancelled() {
                    LIFECYCLE_METRICS.record_regeneration(key, "cancelled", duration_secs);
                    info!(index = %key, "Regeneration cancelled, live generation untouched");
                } else if self.has_pending_catchup(key) {
                    LIFECYCLE_METRICS.record_regeneration(key, "catchup_pending", duration_secs);
                    warn!(
                        index = %key,
                        error = %e,
                        "New generation is live but its catch-up failed, pending until the next sync cycle"
                    );
                } else {
                    LIFECYCLE_METRICS.record_regeneration(key, "failed", duration_secs);
                    error!(index = %key, error = %e, "Regeneration failed");
                }
            }
        }

        self.set_state(key, RegenerationState::Idle);
        result
    }

    async fn run(&self, key: &IndexKey, cancel: &CancellationToken, started: Instant) -> LifecycleResult<RegenerationReport> {
        let generations = self.syncer.generations().clone();

        self.set_state(key, RegenerationState::Preparing);
        let cutoff_ticks = match self.syncer.read_watermark(key).await {
            Ok(cutoff) => cutoff,
            Err(LifecycleError::Search(e)) if e.is_corruption() => {
                warn!(index = %key, error = %e, "Live generation unreadable, catch-up will do a full pass");
                None
            }
            Err(e) => return Err(Self::aborted(key, RegenerationState::Preparing, e)),
        };
        let regen_dir = generations
            .prepare_regeneration_directory(key)
            .map_err(|e| Self::aborted(key, RegenerationState::Preparing, e.into()))?;

        self.set_state(key, RegenerationState::Streaming);
        let streamed = self
            .syncer
            .write_pages(key, &regen_dir, None, "regeneration", cancel)
            .await
            .map_err(|e| Self::aborted(key, RegenerationState::Streaming, e))?;
        if cancel.is_cancelled() {
            return Err(Self::aborted(
                key,
                RegenerationState::Streaming,
                LifecycleError::Cancelled(key.clone()),
            ));
        }

        self.set_state(key, RegenerationState::Promoting);
        let promotion = self
            .syncer
            .promote(key)
            .await
            .map_err(|e| LifecycleError::PromotionFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        // From here on the new generation serves reads; catch-up is not cancellable
        self.pending_catchups.insert(key.clone(), cutoff_ticks);
        self.set_state(key, RegenerationState::Catchup);
        let caught_up = self.catch_up(key, cutoff_ticks).await?;

        let pruned_generations = match generations.prune_old_generations(key) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(index = %key, error = %e, "Pruning failed, an extra retired generation remains");
                Vec::new()
            }
        };

        Ok(RegenerationReport {
            key: key.clone(),
            generation: promotion.live.id,
            cutoff_ticks,
            streamed_documents: streamed.documents_written,
            streamed_pages: streamed.pages_committed,
            caught_up_documents: caught_up.documents_written,
            pruned_generations,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn catch_up(&self, key: &IndexKey, cutoff_ticks: Option<i64>) -> LifecycleResult<SyncOutcome> {
        let outcome = self
            .syncer
            .sync_since(key, cutoff_ticks, &CancellationToken::new())
            .await?;
        self.pending_catchups.remove(key);
        debug!(index = %key, cutoff = ?cutoff_ticks, documents = outcome.documents_written, "Catch-up completed");
        Ok(outcome)
    }

    /// Retry the catch-up of a promoted generation whose catch-up failed
    pub async fn complete_pending_catchup(&self, key: &IndexKey) -> LifecycleResult<Option<SyncOutcome>> {
        let Some(cutoff_ticks) = self.pending_catchups.get(key).map(|c| *c) else {
            return Ok(None);
        };

        let _guard = self.locks.acquire(key).await;
        info!(index = %key, cutoff = ?cutoff_ticks, "Retrying pending catch-up");
        self.catch_up(key, cutoff_ticks).await.map(Some)
    }

    /// Regenerate every index of `tenant`, one environment after another
    ///
    /// A failure of one index is recorded and does not stop the others;
    /// cancellation skips whatever has not started yet.
    pub async fn regenerate_tenant(&self, tenant: &TenantId, cancel: &CancellationToken) -> TenantRegenerationSummary {
        let mut summary = TenantRegenerationSummary {
            tenant: tenant.clone(),
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        for environment in &self.environments {
            let env_started = Instant::now();
            let mut env_documents = 0usize;

            for kind in &self.kinds {
                let key = IndexKey::new(tenant.clone(), *environment, *kind);
                if cancel.is_cancelled() {
                    summary.skipped.push(key);
                    continue;
                }

                match self.regenerate(&key, cancel).await {
                    Ok(report) => {
                        env_documents += report.streamed_documents;
                        summary.completed.push(report);
                    }
                    Err(e) => summary.failed.push((key, e.to_string())),
                }
            }

            let elapsed = env_started.elapsed();
            let seconds = elapsed.as_secs_f64();
            let docs_per_sec = if seconds > 0.0 { env_documents as f64 / seconds } else { 0.0 };
            info!(
                tenant = %tenant,
                environment = %environment,
                documents = env_documents,
                duration_ms = elapsed.as_millis() as u64,
                docs_per_sec,
                "Environment regenerated"
            );
        }

        summary
    }

    fn set_state(&self, key: &IndexKey, state: RegenerationState) {
        let previous = self.states.insert(key.clone(), state).unwrap_or_default();
        if previous != state {
            debug!(index = %key, from = %previous, to = %state, "Regeneration state changed");
        }
    }

    fn aborted(key: &IndexKey, state: RegenerationState, err: LifecycleError) -> LifecycleError {
        let reason = if err.is_cancelled() {
            CANCELLED_REASON.to_string()
        } else {
            err.to_string()
        };
        LifecycleError::RegenerationAborted {
            key: key.clone(),
            state,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationDirectoryManager;
    use crate::lifecycle::enrichment::InMemoryProductLookup;
    use crate::lifecycle::source::{EntitySources, InMemoryEntitySource};
    use crate::models::EntityRecord;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn orchestrator(temp_dir: &TempDir, source: &InMemoryEntitySource) -> RegenerationOrchestrator {
        let sources = EntitySources::new().with_source(EntityKind::Policy, Arc::new(source.clone()));
        let syncer = IncrementalSyncer::new(
            Arc::new(TantivyEngine::default()),
            Arc::new(GenerationDirectoryManager::new(temp_dir.path())),
            sources,
            Arc::new(InMemoryProductLookup::new()),
        )
        .with_page_size(5);
        RegenerationOrchestrator::new(syncer, IndexLockRegistry::new())
            .with_environments(vec![Environment::Production, Environment::Staging])
    }

    #[tokio::test]
    async fn test_regenerate_empty_source_promotes_empty_generation() {
        let temp_dir = TempDir::new().unwrap();
        let source = InMemoryEntitySource::new(EntityKind::Policy);
        let orchestrator = orchestrator(&temp_dir, &source);
        let key = IndexKey::new(TenantId::new("acme").unwrap(), Environment::Production, EntityKind::Policy);

        let report = orchestrator.regenerate(&key, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.streamed_documents, 0);
        assert_eq!(orchestrator.state(&key), RegenerationState::Idle);
    }

    #[tokio::test]
    async fn test_regenerate_tenant_covers_each_environment() {
        let temp_dir = TempDir::new().unwrap();
        let source = InMemoryEntitySource::new(EntityKind::Policy);
        let tenant = TenantId::new("acme").unwrap();
        for environment in [Environment::Production, Environment::Staging] {
            source.extend((1..=7).map(|t| {
                EntityRecord::new(Uuid::new_v4(), tenant.clone(), environment, EntityKind::Policy, "P", t, t)
            }));
        }
        let orchestrator = orchestrator(&temp_dir, &source);

        let summary = orchestrator.regenerate_tenant(&tenant, &CancellationToken::new()).await;
        assert!(summary.is_success());
        assert_eq!(summary.completed.len(), 2);
        assert!(summary.completed.iter().all(|r| r.streamed_documents == 7));
        assert!(summary.completed.iter().all(|r| r.streamed_pages == 2));
    }

    #[tokio::test]
    async fn test_cancelled_tenant_run_skips_everything() {
        let temp_dir = TempDir::new().unwrap();
        let source = InMemoryEntitySource::new(EntityKind::Policy);
        let orchestrator = orchestrator(&temp_dir, &source);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = orchestrator
            .regenerate_tenant(&TenantId::new("acme").unwrap(), &cancel)
            .await;
        assert!(summary.completed.is_empty());
        assert_eq!(summary.skipped.len(), 2);
    }
}
