use anyhow::Context;
use policy_index_manager::{
    app::{init_metrics, init_tracing, App},
    config::Config,
    scheduler::SchedulerService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    tracing::info!("Starting policy index manager v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        index_root = %config.index.root.display(),
        tenants = config.tenancy.tenants.len(),
        page_size = config.index.page_size,
        "Configuration loaded"
    );

    if config.tenancy.tenants.is_empty() {
        tracing::warn!("⚠️  No tenants configured, scheduled jobs will have nothing to do");
    }

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        init_metrics();
        tracing::info!("✅ Prometheus metrics initialized");
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    let app = App::from_config(config).context("Failed to initialize lifecycle components")?;
    tracing::info!("✅ Lifecycle components initialized");

    // Bring every index up to date before the first scheduled tick
    let startup = tokio_util::sync::CancellationToken::new();
    let summary = app.coordinator.run_incremental_sync(&startup).await;
    tracing::info!(
        indexes = summary.succeeded,
        failed = summary.failures.len(),
        documents = summary.documents_written,
        "✅ Startup sync finished"
    );

    let mut scheduler = SchedulerService::new(app.config.scheduler.clone()).await?;
    let job_ids = scheduler
        .register_maintenance_jobs(app.coordinator.clone(), app.reconcile_window())
        .await?;
    scheduler.start().await?;
    tracing::info!(jobs = job_ids.len(), "✅ Scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await?;
    tracing::info!("Policy index manager stopped");

    Ok(())
}
