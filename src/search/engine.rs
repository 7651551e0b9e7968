//! Narrow engine capability the lifecycle code is written against
//!
//! Everything the generation lifecycle needs from the text engine goes
//! through [`IndexEngine`]: open a writer or searcher on a generation
//! directory, commit a batch, query, and a couple of aggregate reads
//! (watermark, counts). [`TantivyEngine`] is the production implementation.

use crate::search::config::SearchConfig;
use crate::search::document::{build_entity_schema, IndexDocument, IndexFields, LAST_MODIFIED_TICKS};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{created_window_query, QueryBuilder, SearchQuery, SearchSort};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::AllQuery;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument};

/// A single search result hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The stored document
    pub document: IndexDocument,

    /// Relevance score (0 when sorted by modification time)
    pub score: f32,
}

/// Search response with results and metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Search results
    pub hits: Vec<SearchHit>,

    /// Total number of hits (before pagination)
    pub total_hits: usize,

    /// Search execution time in milliseconds
    pub search_time_ms: u64,

    /// Offset used for pagination
    pub offset: usize,

    /// Limit used for pagination
    pub limit: usize,
}

/// Text engine capability scoped to one generation directory at a time
pub trait IndexEngine: Send + Sync + 'static {
    type Writer: Send + 'static;
    type Searcher: Send + Sync + 'static;

    /// Open a writer, creating an empty index in `dir` if none exists yet
    fn open_writer(&self, dir: &Path) -> SearchResult<Self::Writer>;

    /// Open a point-in-time searcher; an empty directory reads as a zero-document index
    fn open_searcher(&self, dir: &Path) -> SearchResult<Self::Searcher>;

    /// Upsert `documents` by id and commit them as one unit
    fn commit_batch(&self, writer: &mut Self::Writer, documents: &[IndexDocument]) -> SearchResult<usize>;

    /// Execute a query
    fn query(&self, searcher: &Self::Searcher, query: &SearchQuery) -> SearchResult<SearchResponse>;

    /// Highest `last_modified_ticks` in the index, `None` when it is empty
    fn latest_modified_ticks(&self, searcher: &Self::Searcher) -> SearchResult<Option<i64>>;

    /// Number of documents created in `[from_ticks, to_ticks)`
    fn count_created_between(&self, searcher: &Self::Searcher, from_ticks: i64, to_ticks: i64) -> SearchResult<u64>;

    /// Number of live documents
    fn document_count(&self, searcher: &Self::Searcher) -> SearchResult<u64>;
}

/// Writer over one generation directory
pub struct TantivyWriter {
    path: PathBuf,
    fields: IndexFields,
    writer: IndexWriter,
}

impl TantivyWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Searcher over one generation directory; `None` when the directory holds no index yet
pub struct TantivySearcher {
    inner: Option<OpenIndex>,
}

struct OpenIndex {
    index: Index,
    fields: IndexFields,
    // Keeps the segment files referenced by `searcher` alive
    _reader: IndexReader,
    searcher: Searcher,
}

/// Tantivy-backed [`IndexEngine`]
#[derive(Debug, Clone, Default)]
pub struct TantivyEngine {
    config: SearchConfig,
}

impl TantivyEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Check if an index exists at the given path
    fn index_exists(path: &Path) -> bool {
        path.join("meta.json").exists()
    }

    fn open_index(path: &Path) -> SearchResult<(Index, IndexFields)> {
        let index = Index::open_in_dir(path)?;
        let fields = IndexFields::from_schema(&index.schema()).map_err(|e| {
            SearchError::IndexCorruption(format!(
                "Index at {} does not match the entity schema: {}",
                path.display(),
                e
            ))
        })?;
        Ok((index, fields))
    }

    fn hits_from(
        &self,
        open: &OpenIndex,
        addresses: impl IntoIterator<Item = (f32, DocAddress)>,
    ) -> SearchResult<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for (score, address) in addresses {
            let doc: TantivyDocument = open.searcher.doc(address)?;
            match IndexDocument::from_tantivy_doc(&doc, &open.fields) {
                Some(document) => hits.push(SearchHit { document, score }),
                None => {
                    return Err(SearchError::IndexCorruption(
                        "Stored document is missing identity fields".to_string(),
                    ))
                }
            }
        }
        Ok(hits)
    }
}

impl IndexEngine for TantivyEngine {
    type Writer = TantivyWriter;
    type Searcher = TantivySearcher;

    fn open_writer(&self, dir: &Path) -> SearchResult<TantivyWriter> {
        std::fs::create_dir_all(dir).map_err(|e| {
            SearchError::IndexInitFailed(format!("Failed to create index directory: {}", e))
        })?;

        let (index, fields) = if Self::index_exists(dir) {
            Self::open_index(dir)?
        } else {
            let index = Index::create_in_dir(dir, build_entity_schema()).map_err(|e| {
                SearchError::IndexInitFailed(format!("Failed to create new index: {}", e))
            })?;
            let fields = IndexFields::from_schema(&index.schema())
                .map_err(|e| SearchError::SchemaError(e.to_string()))?;
            (index, fields)
        };

        let writer = index
            .writer_with_num_threads(self.config.indexing_threads.max(1), self.config.writer_heap_size)
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create writer: {}", e)))?;

        Ok(TantivyWriter {
            path: dir.to_path_buf(),
            fields,
            writer,
        })
    }

    fn open_searcher(&self, dir: &Path) -> SearchResult<TantivySearcher> {
        if !Self::index_exists(dir) {
            return Ok(TantivySearcher { inner: None });
        }

        let (index, fields) = Self::open_index(dir)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let searcher = reader.searcher();

        Ok(TantivySearcher {
            inner: Some(OpenIndex {
                index,
                fields,
                _reader: reader,
                searcher,
            }),
        })
    }

    fn commit_batch(&self, writer: &mut TantivyWriter, documents: &[IndexDocument]) -> SearchResult<usize> {
        let mut indexed = 0;

        for document in documents {
            // Delete existing document with same ID first
            let term = tantivy::Term::from_field_text(writer.fields.id, &document.document_id());
            writer.writer.delete_term(term);

            writer
                .writer
                .add_document(document.to_tantivy_doc(&writer.fields))
                .map_err(|e| {
                    SearchError::IndexingFailed(format!("Failed to add document {}: {}", document.id, e))
                })?;

            indexed += 1;
        }

        if let Err(e) = writer.writer.commit() {
            writer.writer.rollback().ok();
            return Err(SearchError::IndexingFailed(format!("Failed to commit batch: {}", e)));
        }

        Ok(indexed)
    }

    fn query(&self, searcher: &TantivySearcher, query: &SearchQuery) -> SearchResult<SearchResponse> {
        let start_time = std::time::Instant::now();
        let limit = query.limit.min(self.config.max_results);

        let Some(open) = searcher.inner.as_ref() else {
            return Ok(SearchResponse {
                offset: query.offset,
                limit,
                ..Default::default()
            });
        };

        let tantivy_query = QueryBuilder::new(&open.index, open.fields).build(query)?;

        let total_hits = open
            .searcher
            .search(&*tantivy_query, &Count)
            .map_err(|e| SearchError::SearchFailed(format!("Count failed: {}", e)))?;

        let hits = if limit == 0 {
            Vec::new()
        } else {
            match query.sort {
                SearchSort::Relevance => {
                    let collector = TopDocs::with_limit(limit).and_offset(query.offset);
                    let top_docs = open.searcher.search(&*tantivy_query, &collector)?;
                    self.hits_from(open, top_docs)?
                }
                SearchSort::LastModifiedDesc => {
                    let collector = TopDocs::with_limit(limit)
                        .and_offset(query.offset)
                        .order_by_fast_field::<i64>(LAST_MODIFIED_TICKS, Order::Desc);
                    let top_docs = open.searcher.search(&*tantivy_query, &collector)?;
                    self.hits_from(open, top_docs.into_iter().map(|(_, address)| (0.0, address)))?
                }
            }
        };

        Ok(SearchResponse {
            hits,
            total_hits,
            search_time_ms: start_time.elapsed().as_millis() as u64,
            offset: query.offset,
            limit,
        })
    }

    fn latest_modified_ticks(&self, searcher: &TantivySearcher) -> SearchResult<Option<i64>> {
        let Some(open) = searcher.inner.as_ref() else {
            return Ok(None);
        };

        let collector = TopDocs::with_limit(1).order_by_fast_field::<i64>(LAST_MODIFIED_TICKS, Order::Desc);
        let top = open.searcher.search(&AllQuery, &collector)?;
        Ok(top.first().map(|(ticks, _)| *ticks))
    }

    fn count_created_between(&self, searcher: &TantivySearcher, from_ticks: i64, to_ticks: i64) -> SearchResult<u64> {
        let Some(open) = searcher.inner.as_ref() else {
            return Ok(0);
        };

        let query = created_window_query(Some(from_ticks), Some(to_ticks));
        let count = open.searcher.search(&query, &Count)?;
        Ok(count as u64)
    }

    fn document_count(&self, searcher: &TantivySearcher) -> SearchResult<u64> {
        Ok(searcher
            .inner
            .as_ref()
            .map(|open| open.searcher.num_docs())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, EntityRecord, Environment, TenantId};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn document(id: Uuid, reference: &str, modified: i64) -> IndexDocument {
        let record = EntityRecord::new(
            id,
            TenantId::new("acme").unwrap(),
            Environment::Production,
            EntityKind::Policy,
            reference,
            modified,
            modified,
        );
        IndexDocument::from_record(record, None)
    }

    #[test]
    fn test_empty_directory_reads_as_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let engine = TantivyEngine::default();

        let searcher = engine.open_searcher(temp_dir.path()).unwrap();
        assert_eq!(engine.document_count(&searcher).unwrap(), 0);
        assert_eq!(engine.latest_modified_ticks(&searcher).unwrap(), None);
        assert_eq!(engine.query(&searcher, &SearchQuery::all()).unwrap().total_hits, 0);
    }

    #[test]
    fn test_commit_batch_upserts_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let engine = TantivyEngine::default();
        let id = Uuid::new_v4();

        let mut writer = engine.open_writer(temp_dir.path()).unwrap();
        engine.commit_batch(&mut writer, &[document(id, "P-1", 10)]).unwrap();
        engine.commit_batch(&mut writer, &[document(id, "P-1", 20)]).unwrap();
        drop(writer);

        let searcher = engine.open_searcher(temp_dir.path()).unwrap();
        assert_eq!(engine.document_count(&searcher).unwrap(), 1);
        assert_eq!(engine.latest_modified_ticks(&searcher).unwrap(), Some(20));
    }

    #[test]
    fn test_count_created_between_is_half_open() {
        let temp_dir = TempDir::new().unwrap();
        let engine = TantivyEngine::default();

        let mut writer = engine.open_writer(temp_dir.path()).unwrap();
        let docs: Vec<_> = (0..10)
            .map(|i| document(Uuid::new_v4(), &format!("P-{}", i), i * 10))
            .collect();
        engine.commit_batch(&mut writer, &docs).unwrap();
        drop(writer);

        let searcher = engine.open_searcher(temp_dir.path()).unwrap();
        assert_eq!(engine.count_created_between(&searcher, 0, 50).unwrap(), 5);
        assert_eq!(engine.count_created_between(&searcher, 50, 100).unwrap(), 5);
    }
}
