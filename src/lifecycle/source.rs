//! Read-model collaborators: paginated entity batches per kind

use crate::lifecycle::enrichment::InMemoryProductLookup;
use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::models::{EntityKind, EntityRecord, Environment, TenantId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One page of entities, ordered by ascending last-modified tick
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    pub entities: Vec<EntityRecord>,

    /// Whether any entity references a product whose name must be joined in
    pub needs_enrichment: bool,
}

impl EntityPage {
    pub fn new(entities: Vec<EntityRecord>) -> Self {
        let needs_enrichment = entities.iter().any(|e| e.product_id.is_some());
        Self {
            entities,
            needs_enrichment,
        }
    }
}

/// Position in the `(last_modified_ticks, id)` ordering that a page starts after
///
/// A run starts from [`PageCursor::since`] and moves to [`PageCursor::after`]
/// the last entity of every committed page. Entities modified while a run is
/// in progress move behind the cursor's end and are read again later in the
/// same run; nothing ahead of the cursor shifts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// `None` admits every entity
    pub ticks: Option<i64>,

    /// Tie-breaker within `ticks`; `None` excludes the whole tick
    pub after_id: Option<Uuid>,
}

impl PageCursor {
    /// Everything modified after `ticks`
    pub fn since(ticks: Option<i64>) -> Self {
        Self { ticks, after_id: None }
    }

    /// Everything ordered after `record`
    pub fn after(record: &EntityRecord) -> Self {
        Self {
            ticks: Some(record.last_modified_ticks),
            after_id: Some(record.id),
        }
    }

    pub fn admits(&self, record: &EntityRecord) -> bool {
        match (self.ticks, self.after_id) {
            (None, _) => true,
            (Some(ticks), None) => record.last_modified_ticks > ticks,
            (Some(ticks), Some(id)) => (record.last_modified_ticks, record.id) > (ticks, id),
        }
    }
}

/// Paginated, watermark-filterable read model for one entity kind
///
/// Pages are ordered by ascending `(last_modified_ticks, id)` and start
/// strictly after the given cursor. A page with zero entities is the only
/// end-of-data signal; short pages may occur while more data remains.
#[async_trait]
pub trait EntityBatchSource: Send + Sync {
    /// Fetch up to `page_size` entities ordered after `after`
    ///
    /// `page_number` is the 1-based ordinal of the request within its run and
    /// only identifies the page in logs and errors.
    async fn fetch_page(
        &self,
        tenant: &TenantId,
        environment: Environment,
        after: PageCursor,
        page_number: u32,
        page_size: usize,
    ) -> LifecycleResult<EntityPage>;

    /// Number of entities created in `[from_ticks, to_ticks)`
    async fn count_created_between(
        &self,
        tenant: &TenantId,
        environment: Environment,
        from_ticks: i64,
        to_ticks: i64,
    ) -> LifecycleResult<u64>;
}

/// Batch sources keyed by entity kind
#[derive(Clone, Default)]
pub struct EntitySources {
    sources: HashMap<EntityKind, Arc<dyn EntityBatchSource>>,
}

impl EntitySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, kind: EntityKind, source: Arc<dyn EntityBatchSource>) -> Self {
        self.sources.insert(kind, source);
        self
    }

    pub fn get(&self, kind: EntityKind) -> LifecycleResult<Arc<dyn EntityBatchSource>> {
        self.sources
            .get(&kind)
            .cloned()
            .ok_or(LifecycleError::NoSource(kind))
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.sources.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

type PageHook = Arc<dyn Fn(u32) + Send + Sync>;

/// In-memory read model (for local runs and testing)
///
/// Besides serving pages it can run a hook after each served page and fail
/// a chosen page once, which is how tests simulate concurrent writes and
/// interrupted runs.
#[derive(Clone)]
pub struct InMemoryEntitySource {
    kind: EntityKind,
    entities: Arc<DashMap<Uuid, EntityRecord>>,
    page_hook: Arc<RwLock<Option<PageHook>>>,
    fail_page: Arc<RwLock<Option<u32>>>,
    pages_served: Arc<AtomicU32>,
}

impl InMemoryEntitySource {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: Arc::new(DashMap::new()),
            page_hook: Arc::new(RwLock::new(None)),
            fail_page: Arc::new(RwLock::new(None)),
            pages_served: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Insert or replace an entity
    pub fn upsert(&self, record: EntityRecord) {
        self.entities.insert(record.id, record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = EntityRecord>) {
        for record in records {
            self.upsert(record);
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<EntityRecord> {
        self.entities.get(id).map(|entry| entry.clone())
    }

    /// Bump an entity's modification tick, as a write in the source store would
    pub fn touch(&self, id: &Uuid, ticks: i64) -> bool {
        match self.entities.get_mut(id) {
            Some(mut entry) => {
                entry.touch(ticks, true);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Run `hook` with the page number after every page is served, the final empty one included
    pub fn on_page_served(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.page_hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_page_hook(&self) {
        *self.page_hook.write() = None;
    }

    /// Make the next request for `page_number` fail once
    pub fn fail_page_once(&self, page_number: u32) {
        *self.fail_page.write() = Some(page_number);
    }

    /// Number of fetch requests answered, including empty pages
    pub fn pages_served(&self) -> u32 {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityBatchSource for InMemoryEntitySource {
    async fn fetch_page(
        &self,
        tenant: &TenantId,
        environment: Environment,
        after: PageCursor,
        page_number: u32,
        page_size: usize,
    ) -> LifecycleResult<EntityPage> {
        {
            let mut fail_page = self.fail_page.write();
            if *fail_page == Some(page_number) {
                *fail_page = None;
                return Err(LifecycleError::Source(format!(
                    "read model unavailable while fetching page {}",
                    page_number
                )));
            }
        }

        let mut matching: Vec<EntityRecord> = self
            .entities
            .iter()
            .filter(|entry| {
                let e = entry.value();
                &e.tenant == tenant && e.environment == environment && after.admits(e)
            })
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|e| (e.last_modified_ticks, e.id));
        matching.truncate(page_size);
        let entities = matching;

        self.pages_served.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            kind = %self.kind,
            tenant = %tenant,
            environment = %environment,
            page_number,
            rows = entities.len(),
            "Served entity page"
        );

        let hook = self.page_hook.read().clone();
        if let Some(hook) = hook {
            hook(page_number);
        }

        Ok(EntityPage::new(entities))
    }

    async fn count_created_between(
        &self,
        tenant: &TenantId,
        environment: Environment,
        from_ticks: i64,
        to_ticks: i64,
    ) -> LifecycleResult<u64> {
        Ok(self
            .entities
            .iter()
            .filter(|entry| {
                let e = entry.value();
                &e.tenant == tenant
                    && e.environment == environment
                    && e.created_ticks >= from_ticks
                    && e.created_ticks < to_ticks
            })
            .count() as u64)
    }
}

pub const POLICIES_SNAPSHOT: &str = "policies.json";
pub const QUOTES_SNAPSHOT: &str = "quotes.json";
pub const PRODUCTS_SNAPSHOT: &str = "products.json";

#[derive(Debug, Deserialize)]
struct ProductRow {
    tenant: TenantId,
    product_id: String,
    name: String,
}

/// In-memory read model loaded from a snapshot directory
pub struct Snapshot {
    pub policies: InMemoryEntitySource,
    pub quotes: InMemoryEntitySource,
    pub products: InMemoryProductLookup,
}

impl Snapshot {
    /// Load `policies.json`, `quotes.json` and `products.json` from `dir`; missing files are empty
    pub fn load(dir: &Path) -> LifecycleResult<Self> {
        let policies = InMemoryEntitySource::new(EntityKind::Policy);
        policies.extend(read_json::<EntityRecord>(&dir.join(POLICIES_SNAPSHOT))?);

        let quotes = InMemoryEntitySource::new(EntityKind::Quote);
        quotes.extend(read_json::<EntityRecord>(&dir.join(QUOTES_SNAPSHOT))?);

        let products = InMemoryProductLookup::new();
        for row in read_json::<ProductRow>(&dir.join(PRODUCTS_SNAPSHOT))? {
            products.insert(&row.tenant, row.product_id, row.name);
        }

        tracing::info!(
            dir = %dir.display(),
            policies = policies.len(),
            quotes = quotes.len(),
            "Loaded read model snapshot"
        );

        Ok(Self {
            policies,
            quotes,
            products,
        })
    }

    pub fn empty() -> Self {
        Self {
            policies: InMemoryEntitySource::new(EntityKind::Policy),
            quotes: InMemoryEntitySource::new(EntityKind::Quote),
            products: InMemoryProductLookup::new(),
        }
    }

    /// Register both kinds
    pub fn sources(&self) -> EntitySources {
        EntitySources::new()
            .with_source(EntityKind::Policy, Arc::new(self.policies.clone()))
            .with_source(EntityKind::Quote, Arc::new(self.quotes.clone()))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> LifecycleResult<Vec<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LifecycleError::Source(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| LifecycleError::Source(format!("{}: {}", path.display(), e)))
}
