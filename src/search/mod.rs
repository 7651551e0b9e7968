//! Full-text search over policy and quote indexes, powered by Tantivy
//!
//! The lifecycle code only talks to the engine through [`IndexEngine`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  SearchService (read path, live generation)     │
//! │  IncrementalSyncer / RegenerationOrchestrator   │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │  IndexEngine                                     │
//! │  - open_writer(dir)   - open_searcher(dir)       │
//! │  - commit_batch()     - query()                  │
//! │  - latest_modified_ticks() - count_created_between() │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │  Tantivy index in one generation directory       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use policy_index_manager::generation::GenerationDirectoryManager;
//! use policy_index_manager::models::{EntityKind, Environment, IndexKey, TenantId};
//! use policy_index_manager::search::{SearchQuery, SearchService, TantivyEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generations = Arc::new(GenerationDirectoryManager::new("./data/indexes"));
//!     let search = SearchService::new(Arc::new(TantivyEngine::default()), generations);
//!
//!     let key = IndexKey::new(TenantId::new("acme")?, Environment::Production, EntityKind::Policy);
//!     let query = SearchQuery::new("smith").with_statuses(vec!["Active"]).with_limit(20);
//!
//!     let results = search.search(&key, &query).await?;
//!     println!("Found {} policies", results.total_hits);
//!     Ok(())
//! }
//! ```

mod config;
mod document;
mod engine;
mod error;
mod query;
mod service;

pub use config::SearchConfig;
pub use document::{build_entity_schema, IndexDocument, IndexFields};
pub use engine::{IndexEngine, SearchHit, SearchResponse, TantivyEngine, TantivySearcher, TantivyWriter};
pub use error::{SearchError, SearchResult};
pub use query::{QueryBuilder, SearchFilter, SearchQuery, SearchSort};
pub use service::{IndexStats, SearchService};
