//! Fan-out of lifecycle work over every configured index

use crate::lifecycle::reconcile::{DriftReconciler, ReconciliationResult};
use crate::lifecycle::regeneration::{RegenerationOrchestrator, TenantRegenerationSummary};
use crate::models::{EntityKind, Environment, IndexKey, TenantId};
use crate::search::{IndexEngine, TantivyEngine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One index that failed during a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleFailure {
    pub key: IndexKey,
    pub error: String,
}

/// Outcome of one sync or reconciliation cycle across all indexes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub documents_written: usize,
    pub failures: Vec<CycleFailure>,
    pub drifted: Vec<ReconciliationResult>,
    pub duration_ms: u64,
}

impl CycleSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.drifted.is_empty()
    }
}

/// Runs incremental syncs, regenerations and drift checks for all tenants
///
/// Every index is its own tokio task, so a slow or failing tenant neither
/// blocks nor aborts the others; failures are collected in the summary.
pub struct MaintenanceCoordinator<E: IndexEngine = TantivyEngine> {
    orchestrator: RegenerationOrchestrator<E>,
    reconciler: Arc<DriftReconciler<E>>,
    tenants: Vec<TenantId>,
    environments: Vec<Environment>,
    kinds: Vec<EntityKind>,
}

impl<E: IndexEngine> MaintenanceCoordinator<E> {
    pub fn new(orchestrator: RegenerationOrchestrator<E>, tenants: Vec<TenantId>) -> Self {
        let reconciler = Arc::new(DriftReconciler::from_syncer(orchestrator.syncer()));
        let kinds = orchestrator.syncer().sources().kinds();
        Self {
            orchestrator,
            reconciler,
            tenants,
            environments: Environment::all(),
            kinds,
        }
    }

    pub fn with_environments(mut self, environments: Vec<Environment>) -> Self {
        self.environments = environments;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<EntityKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn orchestrator(&self) -> &RegenerationOrchestrator<E> {
        &self.orchestrator
    }

    pub fn reconciler(&self) -> &DriftReconciler<E> {
        &self.reconciler
    }

    pub fn tenants(&self) -> &[TenantId] {
        &self.tenants
    }

    /// Every (tenant, environment, kind) this coordinator is responsible for
    pub fn keys(&self) -> Vec<IndexKey> {
        let mut keys = Vec::new();
        for tenant in &self.tenants {
            for environment in &self.environments {
                for kind in &self.kinds {
                    keys.push(IndexKey::new(tenant.clone(), *environment, *kind));
                }
            }
        }
        keys
    }

    /// Catch every live index up with the read model
    pub async fn run_incremental_sync(&self, cancel: &CancellationToken) -> CycleSummary {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for key in self.keys() {
            let orchestrator = self.orchestrator.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = match orchestrator.complete_pending_catchup(&key).await {
                    Ok(_) => orchestrator.syncer().sync_live(&key, &cancel).await,
                    Err(e) => Err(e),
                };
                (key, result)
            });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    summary.succeeded += 1;
                    summary.documents_written += outcome.documents_written;
                }
                Ok((key, Err(e))) => {
                    warn!(index = %key, error = %e, "Incremental sync failed, will retry next cycle");
                    summary.failures.push(CycleFailure {
                        key,
                        error: e.to_string(),
                    });
                }
                Err(e) => error!(error = %e, "Incremental sync task panicked"),
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            indexes = summary.succeeded + summary.failures.len(),
            failed = summary.failures.len(),
            documents = summary.documents_written,
            duration_ms = summary.duration_ms,
            "Incremental sync cycle finished"
        );
        summary
    }

    /// Rebuild every index; tenants run concurrently, environments of one tenant sequentially
    pub async fn run_regeneration(&self, cancel: &CancellationToken) -> Vec<TenantRegenerationSummary> {
        let mut tasks = JoinSet::new();
        for tenant in self.tenants.clone() {
            let orchestrator = self.orchestrator.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { orchestrator.regenerate_tenant(&tenant, &cancel).await });
        }

        let mut summaries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(summary) => {
                    if !summary.is_success() {
                        warn!(
                            tenant = %summary.tenant,
                            failed = summary.failed.len(),
                            skipped = summary.skipped.len(),
                            "Tenant regeneration incomplete"
                        );
                    }
                    summaries.push(summary);
                }
                Err(e) => error!(error = %e, "Tenant regeneration task panicked"),
            }
        }
        summaries.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        summaries
    }

    /// Compare source and index counts for entities created within the last `window`
    pub async fn run_reconciliation(&self, window: chrono::Duration) -> CycleSummary {
        let started = Instant::now();
        let to = Utc::now();
        let from = to - window;
        let mut tasks = JoinSet::new();

        for key in self.keys() {
            let reconciler = self.reconciler.clone();
            tasks.spawn(async move {
                let result = reconciler.check(&key, from, to).await;
                (key, result)
            });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(result))) => {
                    summary.succeeded += 1;
                    if !result.is_consistent() {
                        summary.drifted.push(result);
                    }
                }
                Ok((key, Err(e))) => summary.failures.push(CycleFailure {
                    key,
                    error: e.to_string(),
                }),
                Err(e) => error!(error = %e, "Reconciliation task panicked"),
            }
        }

        summary.drifted.sort_by(|a, b| a.key.cmp(&b.key));
        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            indexes = summary.succeeded,
            drifted = summary.drifted.len(),
            failed = summary.failures.len(),
            "Reconciliation cycle finished"
        );
        summary
    }
}
