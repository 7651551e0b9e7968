//! Search read path over the live generation of each index

use crate::generation::{GenerationDirectoryManager, GenerationError};
use crate::models::IndexKey;
use crate::search::engine::{IndexEngine, SearchResponse, TantivyEngine};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::SearchQuery;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Point-in-time statistics of a live index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Live generation id, `None` before the first bootstrap
    pub generation: Option<u64>,

    /// Number of documents in the live generation
    pub document_count: u64,

    /// Highest last-modified tick indexed so far
    pub watermark_ticks: Option<i64>,
}

/// Main search service
pub struct SearchService<E: IndexEngine = TantivyEngine> {
    engine: Arc<E>,
    generations: Arc<GenerationDirectoryManager>,
}

impl<E: IndexEngine> Clone for SearchService<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            generations: self.generations.clone(),
        }
    }
}

impl<E: IndexEngine> SearchService<E> {
    pub fn new(engine: Arc<E>, generations: Arc<GenerationDirectoryManager>) -> Self {
        Self { engine, generations }
    }

    /// Search the live generation of `key`
    ///
    /// An index that has never been built answers with an empty response.
    /// Engine corruption is reported as [`SearchError::SearchIndexCorrupted`]
    /// and is not retried; a regeneration is the recovery path.
    pub async fn search(&self, key: &IndexKey, query: &SearchQuery) -> SearchResult<SearchResponse> {
        let Some(dir) = self.live_directory(key)? else {
            return Ok(SearchResponse {
                offset: query.offset,
                limit: query.limit,
                ..Default::default()
            });
        };

        let engine = self.engine.clone();
        let query = query.clone();
        let response = tokio::task::spawn_blocking(move || {
            let searcher = engine.open_searcher(&dir)?;
            engine.query(&searcher, &query)
        })
        .await
        .map_err(|e| SearchError::SearchFailed(format!("Search task failed: {}", e)))?
        .map_err(|e| Self::contextualize(key, e))?;

        debug!(
            index = %key,
            total_hits = response.total_hits,
            search_time_ms = response.search_time_ms,
            "Search executed"
        );
        Ok(response)
    }

    /// Document count and watermark of the live generation
    pub async fn stats(&self, key: &IndexKey) -> SearchResult<IndexStats> {
        let live = self
            .generations
            .live_generation(key)
            .map_err(|e| SearchError::Generation(e.to_string()))?;
        let Some(live) = live else {
            return Ok(IndexStats::default());
        };

        let engine = self.engine.clone();
        let dir = live.path.clone();
        let (document_count, watermark_ticks) = tokio::task::spawn_blocking(move || {
            let searcher = engine.open_searcher(&dir)?;
            Ok::<_, SearchError>((engine.document_count(&searcher)?, engine.latest_modified_ticks(&searcher)?))
        })
        .await
        .map_err(|e| SearchError::SearchFailed(format!("Stats task failed: {}", e)))?
        .map_err(|e| Self::contextualize(key, e))?;

        Ok(IndexStats {
            generation: Some(live.id),
            document_count,
            watermark_ticks,
        })
    }

    fn live_directory(&self, key: &IndexKey) -> SearchResult<Option<PathBuf>> {
        match self.generations.get_live_directory(key) {
            Ok(dir) => Ok(Some(dir)),
            Err(GenerationError::NoLiveGenerationFound(_)) => Ok(None),
            Err(e) => Err(SearchError::Generation(e.to_string())),
        }
    }

    fn contextualize(key: &IndexKey, err: SearchError) -> SearchError {
        if !err.is_corruption() {
            return err;
        }
        error!(index = %key, error = %err, "Search index is corrupted, regeneration required");
        SearchError::SearchIndexCorrupted {
            tenant: key.tenant.clone(),
            environment: key.environment,
            kind: key.kind,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, Environment, TenantId};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_search_before_bootstrap_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let service = SearchService::new(
            Arc::new(TantivyEngine::default()),
            Arc::new(GenerationDirectoryManager::new(temp_dir.path())),
        );
        let key = IndexKey::new(TenantId::new("acme").unwrap(), Environment::Staging, EntityKind::Quote);

        let response = service.search(&key, &SearchQuery::new("anything")).await.unwrap();
        assert_eq!(response.total_hits, 0);

        let stats = service.stats(&key).await.unwrap();
        assert_eq!(stats.generation, None);
        assert_eq!(stats.document_count, 0);
    }
}
