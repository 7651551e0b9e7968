//! Index generations
//!
//! Every (tenant, environment, kind) index lives in a sequence of
//! generation directories. Exactly one is live; a full rebuild is written
//! to a separate regeneration directory and swapped in atomically.

pub mod error;
pub mod manager;
pub mod manifest;
pub mod ops;

pub use error::{GenerationError, GenerationResult};
pub use manager::{GenerationDirectoryManager, Promotion};
pub use manifest::{GenerationInfo, GenerationManifest, GenerationRecord, GenerationRole};
pub use ops::{DirectoryOps, LocalDirectoryOps};
