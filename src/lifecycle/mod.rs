//! Index generation lifecycle
//!
//! Keeps every (tenant, environment, kind) index consistent with the read
//! model: incremental catch-up from the live watermark, full rebuilds into
//! a separate generation with an atomic promotion, and count reconciliation.

pub mod coordinator;
pub mod enrichment;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod reconcile;
pub mod regeneration;
pub mod source;
pub mod syncer;

pub use coordinator::{CycleFailure, CycleSummary, MaintenanceCoordinator};
pub use enrichment::{enrich_page, InMemoryProductLookup, ProductNameLookup};
pub use error::{LifecycleError, LifecycleResult};
pub use locks::{IndexLockRegistry, LiveLockRegistry, LockRegistry, SharedLockRegistry, WriterLockRegistry};
pub use metrics::{init_lifecycle_metrics, LIFECYCLE_METRICS};
pub use reconcile::{DriftReconciler, ReconciliationResult};
pub use regeneration::{
    RegenerationOrchestrator, RegenerationReport, RegenerationState, TenantRegenerationSummary,
};
pub use source::{EntityBatchSource, EntityPage, EntitySources, InMemoryEntitySource, PageCursor, Snapshot};
pub use syncer::{IncrementalSyncer, SyncOutcome, DEFAULT_PAGE_SIZE};
