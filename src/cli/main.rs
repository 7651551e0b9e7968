use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt, TryStreamExt};
use policy_index_manager::{
    app::{init_tracing, App},
    config::Config,
    models::{EntityKind, Environment, IndexKey, TenantId},
    search::{SearchQuery, SearchSort},
    AppError,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Indexes worked on at the same time by one command
const MAX_CONCURRENT_INDEXES: usize = 4;

#[derive(Parser)]
#[command(name = "policy-index-cli")]
#[command(about = "Policy and quote search index maintenance", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    /// Override the index root directory
    #[arg(long)]
    index_root: Option<std::path::PathBuf>,

    /// Override the read model snapshot directory
    #[arg(long)]
    snapshot: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    #[arg(short, long)]
    tenant: String,

    /// Limit to one environment (default: all configured)
    #[arg(short, long)]
    environment: Option<Environment>,

    /// Limit to one entity kind (default: all configured)
    #[arg(short, long)]
    kind: Option<EntityKind>,
}

#[derive(Subcommand)]
enum Commands {
    /// Catch live indexes up with the read model
    Sync {
        #[command(flatten)]
        target: Target,

        /// Re-sync everything modified after this tick instead of the index watermark
        #[arg(long, conflicts_with = "full")]
        since: Option<i64>,

        /// Re-sync every entity
        #[arg(long)]
        full: bool,
    },

    /// Rebuild indexes into a fresh generation and promote it
    Regenerate {
        #[command(flatten)]
        target: Target,
    },

    /// Compare source store and index counts
    Reconcile {
        #[command(flatten)]
        target: Target,

        /// Window of entity creation times to compare, ending now
        #[arg(long, default_value = "24")]
        hours: i64,

        /// Exit with an error when any count differs
        #[arg(long)]
        strict: bool,
    },

    /// Query a live index
    Search {
        #[arg(short, long)]
        tenant: String,

        #[arg(short, long)]
        environment: Environment,

        #[arg(short, long)]
        kind: EntityKind,

        /// Free text (reference number, customer or product name)
        #[arg(default_value = "")]
        query: String,

        #[arg(short, long)]
        status: Vec<String>,

        #[arg(long)]
        include_test_data: bool,

        /// Order by relevance instead of most recently modified
        #[arg(long)]
        relevance: bool,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Show generations, document counts and watermarks
    Status {
        #[command(flatten)]
        target: Target,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::load_from(cli.config.as_deref())?;
    if let Some(root) = cli.index_root {
        config.index.root = root;
    }
    if let Some(snapshot) = cli.snapshot {
        config.source.snapshot_dir = Some(snapshot);
    }
    init_tracing(&config.observability);

    let app = App::from_config(config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping at the next page boundary");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Sync { target, since, full } => {
            let since = if full { None } else { since };
            let results: Vec<_> = stream::iter(keys(&app, &target)?)
                .map(|key| {
                    let app = &app;
                    let cancel = &cancel;
                    async move {
                        let outcome = if full || since.is_some() {
                            app.syncer().sync_since(&key, since, cancel).await
                        } else {
                            app.syncer().sync_live(&key, cancel).await
                        };
                        match outcome {
                            Ok(outcome) => json!({ "index": key.to_string(), "outcome": outcome }),
                            Err(e) => json!({ "index": key.to_string(), "error": e.to_string() }),
                        }
                    }
                })
                .buffered(MAX_CONCURRENT_INDEXES)
                .collect()
                .await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::Regenerate { target } => {
            let mut reports = Vec::new();
            let mut failed = Vec::new();
            for key in keys(&app, &target)? {
                match app.orchestrator().regenerate(&key, &cancel).await {
                    Ok(report) => reports.push(report),
                    Err(e) => failed.push(json!({ "index": key.to_string(), "error": e.to_string() })),
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "completed": reports, "failed": failed }))?
            );
            if !failed.is_empty() {
                return Err(AppError::RegenerationAborted(format!("{} index(es) failed", failed.len())));
            }
        }

        Commands::Reconcile { target, hours, strict } => {
            let to = chrono::Utc::now();
            let from = to - chrono::Duration::hours(hours);
            let mut results = Vec::new();
            let mut drifted = 0;
            for key in keys(&app, &target)? {
                let result = app.reconciler().check(&key, from, to).await?;
                if !result.is_consistent() {
                    drifted += 1;
                }
                results.push(json!({
                    "index": key.to_string(),
                    "tenant": result.tenant_alias(),
                    "source_count": result.source_count,
                    "index_count": result.index_count,
                    "drift": result.drift(),
                }));
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
            if strict && drifted > 0 {
                return Err(AppError::DriftDetected(format!("{} index(es) out of step", drifted)));
            }
        }

        Commands::Search {
            tenant,
            environment,
            kind,
            query,
            status,
            include_test_data,
            relevance,
            limit,
            offset,
        } => {
            let key = IndexKey::new(TenantId::new(tenant)?, environment, kind);
            let mut search = SearchQuery::new(query)
                .with_test_data(include_test_data)
                .with_limit(limit)
                .with_offset(offset);
            if !status.is_empty() {
                search = search.with_statuses(status);
            }
            if relevance {
                search = search.with_sort(SearchSort::Relevance);
            }

            let response = app.search.search(&key, &search).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Status { target } => {
            let statuses: Vec<serde_json::Value> = stream::iter(keys(&app, &target)?)
                .map(|key| {
                    let app = &app;
                    async move {
                        let stats = app.search.stats(&key).await?;
                        let generations = app.generations.list_generations(&key)?;
                        Ok::<_, AppError>(json!({
                            "index": key.to_string(),
                            "stats": stats,
                            "generations": generations,
                            "regeneration": app.orchestrator().state(&key),
                        }))
                    }
                })
                .buffered(MAX_CONCURRENT_INDEXES)
                .try_collect()
                .await?;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
    }

    Ok(())
}

fn keys(app: &App, target: &Target) -> Result<Vec<IndexKey>, AppError> {
    let tenant = TenantId::new(target.tenant.clone())?;
    let environments = match target.environment {
        Some(environment) => vec![environment],
        None => app.config.tenancy.environments.clone(),
    };
    let kinds = match target.kind {
        Some(kind) => vec![kind],
        None => app.config.tenancy.kinds.clone(),
    };

    if environments.is_empty() || kinds.is_empty() {
        return Err(AppError::Configuration("no environments or kinds configured".to_string()));
    }

    let mut keys = Vec::new();
    for environment in environments {
        for kind in &kinds {
            keys.push(IndexKey::new(tenant.clone(), environment, *kind));
        }
    }
    Ok(keys)
}
