//! Per-index generation manifest (`generations.json`)
//!
//! The manifest is the live pointer: it names the live generation, the
//! retired generations still on disk and the reserved id of the generation
//! being rebuilt. It is only ever replaced by an atomic rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::Display;

pub const MANIFEST_FILE: &str = "generations.json";
pub const REGENERATING_DIR: &str = "regenerating";
pub const GENERATION_DIR_PREFIX: &str = "gen-";

/// Role a generation directory currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationRole {
    Live,
    Regenerating,
    Retired,
}

/// One generation as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            promoted_at: None,
            retired_at: None,
        }
    }

    pub fn dir_name(&self) -> String {
        generation_dir_name(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub next_id: u64,
    #[serde(default)]
    pub live: Option<GenerationRecord>,
    /// Oldest first
    #[serde(default)]
    pub retired: Vec<GenerationRecord>,
    #[serde(default)]
    pub regenerating: Option<GenerationRecord>,
}

impl Default for GenerationManifest {
    fn default() -> Self {
        Self {
            next_id: 1,
            live: None,
            retired: Vec::new(),
            regenerating: None,
        }
    }
}

impl GenerationManifest {
    /// Reserve the next generation id
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Whether `id` is referenced as live or retired
    pub fn references(&self, id: u64) -> bool {
        self.live.as_ref().is_some_and(|g| g.id == id) || self.retired.iter().any(|g| g.id == id)
    }
}

/// Public view of a generation for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub id: u64,
    pub role: GenerationRole,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
}

impl GenerationInfo {
    pub(crate) fn from_record(record: &GenerationRecord, role: GenerationRole, key_root: &Path) -> Self {
        let path = match role {
            GenerationRole::Regenerating => key_root.join(REGENERATING_DIR),
            _ => key_root.join(record.dir_name()),
        };
        Self {
            id: record.id,
            role,
            created_at: record.created_at,
            path,
        }
    }
}

pub fn generation_dir_name(id: u64) -> String {
    format!("{}{:010}", GENERATION_DIR_PREFIX, id)
}

/// Parse `gen-0000000042` back into `42`
pub fn parse_generation_dir(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_DIR_PREFIX)?.parse().ok()
}
