//! Search engine configuration

use serde::{Deserialize, Serialize};

/// Tantivy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Index writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,

    /// Number of indexing threads per writer
    pub indexing_threads: usize,

    /// Maximum search results to return
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            writer_heap_size: 50_000_000, // 50MB
            indexing_threads: 1,
            max_results: 1000,
        }
    }
}
