//! Generation lifecycle manager for multi-tenant policy and quote search indexes
//!
//! Each (tenant, environment, kind) index is a sequence of on-disk
//! generations with exactly one live. Incremental syncs keep the live
//! generation caught up with the read model; full regenerations build a new
//! generation on the side, swap it in atomically and replay the writes that
//! happened during the rebuild.

pub mod app;
pub mod config;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod models;
pub mod scheduler;
pub mod search;

pub use error::{AppError, Result};
