//! Shared fixtures for the lifecycle integration tests
//!
//! Builds a syncer/orchestrator pair over a temporary index root and an
//! in-memory read model so tests can drive pages, hooks and failures.

#![allow(dead_code)]

use policy_index_manager::generation::GenerationDirectoryManager;
use policy_index_manager::lifecycle::{
    EntitySources, InMemoryEntitySource, InMemoryProductLookup, IncrementalSyncer, IndexLockRegistry,
    RegenerationOrchestrator,
};
use policy_index_manager::models::{EntityKind, EntityRecord, Environment, IndexKey, TenantId};
use policy_index_manager::search::{SearchConfig, SearchService, TantivyEngine};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Everything a lifecycle test needs, rooted in one temporary directory
pub struct Harness {
    pub temp_dir: TempDir,
    pub generations: Arc<GenerationDirectoryManager>,
    pub policies: InMemoryEntitySource,
    pub quotes: InMemoryEntitySource,
    pub products: InMemoryProductLookup,
    pub locks: IndexLockRegistry,
    pub syncer: IncrementalSyncer,
    pub orchestrator: RegenerationOrchestrator,
    pub search: SearchService,
}

impl Harness {
    pub fn new(page_size: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let generations = Arc::new(GenerationDirectoryManager::new(temp_dir.path()));
        Self::with_generations(temp_dir, generations, page_size)
    }

    pub fn with_generations(
        temp_dir: TempDir,
        generations: Arc<GenerationDirectoryManager>,
        page_size: usize,
    ) -> Self {
        let engine = Arc::new(TantivyEngine::new(SearchConfig::default()));
        let policies = InMemoryEntitySource::new(EntityKind::Policy);
        let quotes = InMemoryEntitySource::new(EntityKind::Quote);
        let products = InMemoryProductLookup::new();

        let sources = EntitySources::new()
            .with_source(EntityKind::Policy, Arc::new(policies.clone()))
            .with_source(EntityKind::Quote, Arc::new(quotes.clone()));

        let syncer = IncrementalSyncer::new(
            engine.clone(),
            generations.clone(),
            sources,
            Arc::new(products.clone()),
        )
        .with_page_size(page_size);
        let locks = IndexLockRegistry::new();
        let orchestrator = RegenerationOrchestrator::new(syncer.clone(), locks.clone());
        let search = SearchService::new(engine, generations.clone());

        Self {
            temp_dir,
            generations,
            policies,
            quotes,
            products,
            locks,
            syncer,
            orchestrator,
            search,
        }
    }
}

pub fn tenant(alias: &str) -> TenantId {
    TenantId::new(alias).unwrap()
}

pub fn policy_key(alias: &str, environment: Environment) -> IndexKey {
    IndexKey::new(tenant(alias), environment, EntityKind::Policy)
}

/// A policy created and last modified at `ticks`
pub fn policy(key: &IndexKey, ticks: i64) -> EntityRecord {
    EntityRecord::new(
        Uuid::new_v4(),
        key.tenant.clone(),
        key.environment,
        EntityKind::Policy,
        format!("POL-{:06}", ticks),
        ticks,
        ticks,
    )
}

/// Policies modified at each tick of `ticks`
pub fn policies(key: &IndexKey, ticks: impl IntoIterator<Item = i64>) -> Vec<EntityRecord> {
    ticks.into_iter().map(|t| policy(key, t)).collect()
}
