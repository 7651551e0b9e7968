//! Incremental catch-up of an index from the read model

use crate::generation::{GenerationDirectoryManager, GenerationError, GenerationResult, Promotion};
use crate::lifecycle::enrichment::{enrich_page, ProductNameLookup};
use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::locks::{LiveLockRegistry, WriterLockRegistry};
use crate::lifecycle::metrics::LIFECYCLE_METRICS;
use crate::lifecycle::source::{EntitySources, PageCursor};
use crate::models::IndexKey;
use crate::search::{IndexEngine, TantivyEngine};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// What one sync run committed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub documents_written: usize,
    pub pages_committed: u32,

    /// Highest modification tick committed, or the starting watermark when nothing was written
    pub watermark: Option<i64>,
}

/// Pages entities modified after a watermark into a generation
///
/// Pages are requested after a cursor that moves to the last committed
/// entity, until a page comes back empty. Each page is enriched with one
/// product lookup and committed as one batch, so an interrupted run has
/// committed a prefix of the ordering and the index watermark never runs
/// ahead of what is durable.
///
/// Writes into the live generation hold the key's live lock shared;
/// [`promote`](Self::promote) holds it exclusively, so a promotion waits for
/// in-flight syncs and later syncs resolve the new generation.
pub struct IncrementalSyncer<E: IndexEngine = TantivyEngine> {
    engine: Arc<E>,
    generations: Arc<GenerationDirectoryManager>,
    sources: EntitySources,
    products: Arc<dyn ProductNameLookup>,
    writer_locks: WriterLockRegistry,
    live_locks: LiveLockRegistry,
    page_size: usize,
}

impl<E: IndexEngine> Clone for IncrementalSyncer<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            generations: self.generations.clone(),
            sources: self.sources.clone(),
            products: self.products.clone(),
            writer_locks: self.writer_locks.clone(),
            live_locks: self.live_locks.clone(),
            page_size: self.page_size,
        }
    }
}

impl<E: IndexEngine> IncrementalSyncer<E> {
    pub fn new(
        engine: Arc<E>,
        generations: Arc<GenerationDirectoryManager>,
        sources: EntitySources,
        products: Arc<dyn ProductNameLookup>,
    ) -> Self {
        Self {
            engine,
            generations,
            sources,
            products,
            writer_locks: WriterLockRegistry::new(),
            live_locks: LiveLockRegistry::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn generations(&self) -> &Arc<GenerationDirectoryManager> {
        &self.generations
    }

    pub fn sources(&self) -> &EntitySources {
        &self.sources
    }

    /// Write everything modified after `watermark` (everything when `None`) into the live generation
    pub async fn sync_since(
        &self,
        key: &IndexKey,
        watermark: Option<i64>,
        cancel: &CancellationToken,
    ) -> LifecycleResult<SyncOutcome> {
        let _live = self.live_locks.read(key).await;
        let dir = self.generations.ensure_live_directory(key)?;
        let outcome = self.write_pages(key, &dir, watermark, "incremental", cancel).await?;
        if let Some(ticks) = outcome.watermark {
            LIFECYCLE_METRICS.record_watermark(key, ticks);
        }
        Ok(outcome)
    }

    /// Catch the live generation up from its own watermark, bootstrapping it if needed
    pub async fn sync_live(&self, key: &IndexKey, cancel: &CancellationToken) -> LifecycleResult<SyncOutcome> {
        let _live = self.live_locks.read(key).await;
        let dir = self.generations.ensure_live_directory(key)?;
        let watermark = self.watermark_at(&dir).await?;
        debug!(index = %key, watermark = ?watermark, "Starting incremental sync");

        let outcome = self.write_pages(key, &dir, watermark, "incremental", cancel).await?;
        if let Some(ticks) = outcome.watermark {
            LIFECYCLE_METRICS.record_watermark(key, ticks);
        }
        Ok(outcome)
    }

    /// Make the regeneration directory live once no sync is writing into the current live generation
    pub async fn promote(&self, key: &IndexKey) -> GenerationResult<Promotion> {
        let _live = self.live_locks.write(key).await;
        self.generations.promote_regeneration_to_live(key)
    }

    /// Highest modification tick in the live generation, `None` if empty or never built
    pub async fn read_watermark(&self, key: &IndexKey) -> LifecycleResult<Option<i64>> {
        match self.generations.get_live_directory(key) {
            Ok(dir) => self.watermark_at(&dir).await,
            Err(GenerationError::NoLiveGenerationFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn watermark_at(&self, dir: &Path) -> LifecycleResult<Option<i64>> {
        let engine = self.engine.clone();
        let dir = dir.to_path_buf();
        let watermark = tokio::task::spawn_blocking(move || {
            let searcher = engine.open_searcher(&dir)?;
            engine.latest_modified_ticks(&searcher)
        })
        .await??;
        Ok(watermark)
    }

    pub(crate) async fn write_pages(
        &self,
        key: &IndexKey,
        dir: &Path,
        since_ticks: Option<i64>,
        phase: &'static str,
        cancel: &CancellationToken,
    ) -> LifecycleResult<SyncOutcome> {
        let source = self.sources.get(key.kind)?;
        let _writer_guard = self.writer_locks.acquire(&dir.to_path_buf()).await;

        let engine = self.engine.clone();
        let writer_dir: PathBuf = dir.to_path_buf();
        let mut writer = tokio::task::spawn_blocking(move || engine.open_writer(&writer_dir))
            .await?
            .map_err(|e| self.page_failed(key, 1, e))?;

        let mut outcome = SyncOutcome {
            watermark: since_ticks,
            ..Default::default()
        };
        let mut cursor = PageCursor::since(since_ticks);
        let mut page_number: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                info!(index = %key, phase, page_number, "Sync cancelled between pages");
                return Err(LifecycleError::Cancelled(key.clone()));
            }

            let page = source
                .fetch_page(&key.tenant, key.environment, cursor, page_number, self.page_size)
                .await
                .map_err(|e| self.page_failed(key, page_number, e))?;

            // Short pages are possible while data remains; only an empty page ends the run
            if page.entities.is_empty() {
                break;
            }

            let page_max = page.entities.iter().map(|e| e.last_modified_ticks).max();
            let next_cursor = page.entities.last().map(PageCursor::after).unwrap_or(cursor);
            let documents = enrich_page(self.products.as_ref(), &key.tenant, page.entities)
                .await
                .map_err(|e| self.page_failed(key, page_number, e))?;

            let engine = self.engine.clone();
            let (returned, committed) = tokio::task::spawn_blocking(move || {
                let mut writer = writer;
                let committed = engine.commit_batch(&mut writer, &documents);
                (writer, committed)
            })
            .await?;
            writer = returned;
            let written = committed.map_err(|e| self.page_failed(key, page_number, e))?;

            outcome.documents_written += written;
            outcome.pages_committed += 1;
            outcome.watermark = outcome.watermark.max(page_max);
            cursor = next_cursor;
            LIFECYCLE_METRICS.record_documents(key, phase, written);

            debug!(
                index = %key,
                phase,
                page_number,
                documents = written,
                watermark = ?outcome.watermark,
                "Committed page"
            );
            page_number += 1;
        }

        tokio::task::spawn_blocking(move || drop(writer)).await?;

        if outcome.documents_written > 0 {
            info!(
                index = %key,
                phase,
                documents = outcome.documents_written,
                pages = outcome.pages_committed,
                watermark = ?outcome.watermark,
                "Sync completed"
            );
        }
        Ok(outcome)
    }

    fn page_failed(&self, key: &IndexKey, page: u32, err: impl Display) -> LifecycleError {
        LIFECYCLE_METRICS.record_page_failed(key);
        warn!(index = %key, page, error = %err, "Sync page failed, watermark not advanced");
        LifecycleError::SyncPageFailed {
            key: key.clone(),
            page,
            reason: err.to_string(),
        }
    }
}
