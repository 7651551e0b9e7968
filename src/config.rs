use crate::models::{EntityKind, Environment, TenantId};
use crate::scheduler::SchedulerConfig;
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Index storage and engine configuration
    pub index: IndexConfig,

    /// Which tenants, environments and kinds are maintained
    pub tenancy: TenancyConfig,

    /// Read model configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Drift reconciliation configuration
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Background job configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), with an explicit override file taking precedence over `CONFIG_PATH`
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let config_path = match path {
            Some(path) => path.to_string(),
            None => std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string()),
        };

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: POLICY_INDEX__)
            .add_source(
                config::Environment::with_prefix("POLICY_INDEX")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tenancy.tenants")
                    .with_list_parse_key("tenancy.environments")
                    .with_list_parse_key("tenancy.kinds")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Engine settings derived from the index section
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            writer_heap_size: self.index.writer_heap_size,
            indexing_threads: self.index.indexing_threads,
            max_results: self.index.max_results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory holding `<tenant>/<environment>/<kind>` trees
    #[serde(default = "default_index_root")]
    pub root: PathBuf,

    /// Entities fetched and committed per batch
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Writer heap size in bytes
    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,

    #[serde(default = "default_indexing_threads")]
    pub indexing_threads: usize,

    /// Upper bound on search results per request
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub tenants: Vec<TenantId>,

    /// Regenerated in this order
    #[serde(default = "default_environments")]
    pub environments: Vec<Environment>,

    #[serde(default = "default_kinds")]
    pub kinds: Vec<EntityKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory with `policies.json`, `quotes.json` and `products.json`
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Creation-time window compared on each run
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

// Default value functions
fn default_index_root() -> PathBuf {
    PathBuf::from("./data/indexes")
}

fn default_page_size() -> usize {
    crate::lifecycle::DEFAULT_PAGE_SIZE
}

fn default_writer_heap_size() -> usize {
    50_000_000
}

fn default_indexing_threads() -> usize {
    1
}

fn default_max_results() -> usize {
    1000
}

fn default_environments() -> Vec<Environment> {
    Environment::all()
}

fn default_kinds() -> Vec<EntityKind> {
    EntityKind::all()
}

fn default_window_hours() -> i64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "policy-index-manager".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_page_size(), 1000);
        assert_eq!(default_log_level(), "info");
        assert_eq!(
            default_environments(),
            vec![Environment::Production, Environment::Staging, Environment::Development]
        );
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.index.page_size, 1000);
        assert_eq!(config.tenancy.kinds, vec![EntityKind::Policy, EntityKind::Quote]);
        assert_eq!(config.reconciliation.window_hours, 24);
        assert!(config.scheduler.jobs.incremental_sync.enabled);
    }

    #[test]
    fn test_search_config_follows_index_section() {
        let mut config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        config.index.writer_heap_size = 30_000_000;
        config.index.indexing_threads = 2;
        config.index.max_results = 250;

        let search = config.search_config();
        assert_eq!(search.writer_heap_size, 30_000_000);
        assert_eq!(search.indexing_threads, 2);
        assert_eq!(search.max_results, 250);
    }
}
