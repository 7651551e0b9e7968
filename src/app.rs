//! Wiring of configuration into the lifecycle components shared by both binaries

use crate::config::{Config, ObservabilityConfig};
use crate::error::Result;
use crate::generation::GenerationDirectoryManager;
use crate::lifecycle::{
    init_lifecycle_metrics, DriftReconciler, IncrementalSyncer, IndexLockRegistry, MaintenanceCoordinator,
    RegenerationOrchestrator, Snapshot,
};
use crate::scheduler::init_scheduler_metrics;
use crate::search::{SearchService, TantivyEngine};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fully wired lifecycle stack over the tantivy engine
pub struct App {
    pub config: Config,
    pub generations: Arc<GenerationDirectoryManager>,
    pub search: SearchService,
    pub coordinator: Arc<MaintenanceCoordinator>,
}

impl App {
    /// Build every component from configuration, loading the read model snapshot if one is configured
    pub fn from_config(config: Config) -> Result<Self> {
        let snapshot = match config.source.snapshot_dir {
            Some(ref dir) => Snapshot::load(dir)?,
            None => {
                tracing::warn!("No read model snapshot configured, indexes will stay empty");
                Snapshot::empty()
            }
        };
        Ok(Self::with_snapshot(config, snapshot))
    }

    pub fn with_snapshot(config: Config, snapshot: Snapshot) -> Self {
        let engine = Arc::new(TantivyEngine::new(config.search_config()));
        let generations = Arc::new(GenerationDirectoryManager::new(config.index.root.clone()));

        let syncer = IncrementalSyncer::new(
            engine.clone(),
            generations.clone(),
            snapshot.sources(),
            Arc::new(snapshot.products),
        )
        .with_page_size(config.index.page_size);

        let orchestrator = RegenerationOrchestrator::new(syncer, IndexLockRegistry::new())
            .with_environments(config.tenancy.environments.clone())
            .with_kinds(config.tenancy.kinds.clone());

        let coordinator = MaintenanceCoordinator::new(orchestrator, config.tenancy.tenants.clone())
            .with_environments(config.tenancy.environments.clone())
            .with_kinds(config.tenancy.kinds.clone());

        Self {
            search: SearchService::new(engine, generations.clone()),
            generations,
            coordinator: Arc::new(coordinator),
            config,
        }
    }

    pub fn orchestrator(&self) -> &RegenerationOrchestrator {
        self.coordinator.orchestrator()
    }

    pub fn syncer(&self) -> &IncrementalSyncer {
        self.coordinator.orchestrator().syncer()
    }

    pub fn reconciler(&self) -> &DriftReconciler {
        self.coordinator.reconciler()
    }

    pub fn reconcile_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.reconciliation.window_hours)
    }
}

/// Install the global tracing subscriber; `RUST_LOG` overrides the configured level
pub fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("policy_index_manager={},tantivy=warn", observability.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Register the Prometheus collectors
pub fn init_metrics() {
    init_lifecycle_metrics();
    init_scheduler_metrics();
}
