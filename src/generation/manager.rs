//! Generation directory management
//!
//! Layout under the index root, one tree per (tenant, environment, kind):
//!
//! ```text
//! <root>/<tenant>/<environment>/<kind>/
//!     generations.json      live pointer + retired list (atomically replaced)
//!     gen-0000000003/       retired safety copy
//!     gen-0000000004/       live
//!     regenerating/         full rebuild in progress
//! ```

use crate::generation::error::{GenerationError, GenerationResult};
use crate::generation::manifest::{
    generation_dir_name, parse_generation_dir, GenerationInfo, GenerationManifest, GenerationRecord, GenerationRole,
    MANIFEST_FILE, REGENERATING_DIR,
};
use crate::generation::ops::{DirectoryOps, LocalDirectoryOps};
use crate::models::IndexKey;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a successful promotion
#[derive(Debug, Clone)]
pub struct Promotion {
    pub live: GenerationInfo,
    pub retired: Option<GenerationInfo>,
}

/// Owns the on-disk generations of every index
pub struct GenerationDirectoryManager {
    root: PathBuf,
    ops: Arc<dyn DirectoryOps>,
    manifest_locks: DashMap<IndexKey, Arc<Mutex<()>>>,
}

impl GenerationDirectoryManager {
    /// Manager over the local filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_ops(root, Arc::new(LocalDirectoryOps))
    }

    /// Manager over a custom set of directory primitives
    pub fn with_ops(root: impl Into<PathBuf>, ops: Arc<dyn DirectoryOps>) -> Self {
        Self {
            root: root.into(),
            ops,
            manifest_locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every generation of `key`
    pub fn key_root(&self, key: &IndexKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Where a full rebuild of `key` is written
    pub fn regeneration_directory(&self, key: &IndexKey) -> PathBuf {
        self.key_root(key).join(REGENERATING_DIR)
    }

    /// Path of the live generation
    pub fn get_live_directory(&self, key: &IndexKey) -> GenerationResult<PathBuf> {
        self.live_generation(key)?
            .map(|info| info.path)
            .ok_or_else(|| GenerationError::NoLiveGenerationFound(key.clone()))
    }

    /// The live generation, if one has been bootstrapped or promoted
    pub fn live_generation(&self, key: &IndexKey) -> GenerationResult<Option<GenerationInfo>> {
        let key_root = self.key_root(key);
        let manifest = self.read_manifest(key)?;
        Ok(manifest
            .live
            .as_ref()
            .map(|record| GenerationInfo::from_record(record, GenerationRole::Live, &key_root)))
    }

    /// Return the live directory, bootstrapping an empty first generation if needed
    pub fn ensure_live_directory(&self, key: &IndexKey) -> GenerationResult<PathBuf> {
        let lock = self.manifest_lock(key);
        let _guard = lock.lock();

        let key_root = self.key_root(key);
        let mut manifest = self.read_manifest(key)?;

        if let Some(ref live) = manifest.live {
            let path = key_root.join(live.dir_name());
            if !self.ops.exists(&path) {
                warn!(index = %key, generation = live.id, "Live generation directory missing, recreating empty");
                self.ops
                    .create_dir_all(&path)
                    .map_err(|e| GenerationError::io(format!("Failed to recreate {}", path.display()), e))?;
            }
            return Ok(path);
        }

        let mut record = GenerationRecord::new(manifest.allocate_id());
        record.promoted_at = Some(Utc::now());
        let path = key_root.join(record.dir_name());

        self.ops
            .create_dir_all(&path)
            .map_err(|e| GenerationError::io(format!("Failed to create {}", path.display()), e))?;

        let generation = record.id;
        manifest.live = Some(record);
        if let Err(e) = self.write_manifest(key, &manifest) {
            self.ops.remove_dir_all(&path).ok();
            return Err(e);
        }

        info!(index = %key, generation, "Bootstrapped empty live generation");
        Ok(path)
    }

    /// Create an empty regeneration directory, discarding any interrupted rebuild
    pub fn prepare_regeneration_directory(&self, key: &IndexKey) -> GenerationResult<PathBuf> {
        let lock = self.manifest_lock(key);
        let _guard = lock.lock();

        let path = self.regeneration_directory(key);
        let mut manifest = self.read_manifest(key)?;

        if self.ops.exists(&path) {
            info!(
                index = %key,
                abandoned_generation = manifest.regenerating.as_ref().map(|g| g.id),
                "Discarding interrupted regeneration directory"
            );
            self.ops
                .remove_dir_all(&path)
                .map_err(|e| GenerationError::io(format!("Failed to remove {}", path.display()), e))?;
        }

        self.ops
            .create_dir_all(&path)
            .map_err(|e| GenerationError::io(format!("Failed to create {}", path.display()), e))?;

        let record = GenerationRecord::new(manifest.allocate_id());
        let generation = record.id;
        manifest.regenerating = Some(record);
        self.write_manifest(key, &manifest)?;

        debug!(index = %key, generation, "Prepared regeneration directory");
        Ok(path)
    }

    /// Make the regeneration directory live and retire the previous live generation
    ///
    /// The regeneration directory is first renamed to its final generation
    /// name, then the manifest is atomically replaced. Readers resolve the
    /// live directory through the manifest, so they see either the old or
    /// the new generation in full. Any failure leaves the old manifest, and
    /// with it the old live generation, in place.
    pub fn promote_regeneration_to_live(&self, key: &IndexKey) -> GenerationResult<Promotion> {
        let lock = self.manifest_lock(key);
        let _guard = lock.lock();

        let key_root = self.key_root(key);
        let regen_path = self.regeneration_directory(key);
        if !self.ops.exists(&regen_path) {
            return Err(GenerationError::NoRegenerationDirectory(key.clone()));
        }

        let manifest = self.read_manifest(key).map_err(|e| GenerationError::PromotionFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        let mut next = manifest.clone();
        let mut record = match next.regenerating.take() {
            Some(record) => record,
            None => GenerationRecord::new(next.allocate_id()),
        };
        record.promoted_at = Some(Utc::now());

        let target = key_root.join(record.dir_name());
        if self.ops.exists(&target) {
            self.ops.remove_dir_all(&target).map_err(|e| GenerationError::PromotionFailed {
                key: key.clone(),
                reason: format!("stale directory {} could not be removed: {}", target.display(), e),
            })?;
        }

        self.ops
            .rename(&regen_path, &target)
            .map_err(|e| GenerationError::PromotionFailed {
                key: key.clone(),
                reason: format!("rename of regeneration directory failed: {}", e),
            })?;

        let retired = next.live.take().map(|mut previous| {
            previous.retired_at = Some(Utc::now());
            previous
        });
        if let Some(ref previous) = retired {
            next.retired.push(previous.clone());
        }
        next.live = Some(record.clone());

        if let Err(e) = self.write_manifest(key, &next) {
            if let Err(rollback) = self.ops.rename(&target, &regen_path) {
                error!(
                    index = %key,
                    error = %rollback,
                    "Failed to move promoted directory back; it will be pruned as an orphan"
                );
            }
            return Err(GenerationError::PromotionFailed {
                key: key.clone(),
                reason: format!("live pointer swap failed: {}", e),
            });
        }

        info!(
            index = %key,
            generation = record.id,
            retired_generation = retired.as_ref().map(|g| g.id),
            "Promoted regeneration to live"
        );

        Ok(Promotion {
            live: GenerationInfo::from_record(&record, GenerationRole::Live, &key_root),
            retired: retired
                .as_ref()
                .map(|g| GenerationInfo::from_record(g, GenerationRole::Retired, &key_root)),
        })
    }

    /// Delete retired generations except the most recently retired one
    ///
    /// Also removes generation directories the manifest no longer refers to.
    /// Returns the ids of the generations that were deleted.
    pub fn prune_old_generations(&self, key: &IndexKey) -> GenerationResult<Vec<u64>> {
        let lock = self.manifest_lock(key);
        let _guard = lock.lock();

        let key_root = self.key_root(key);
        let mut manifest = self.read_manifest(key)?;

        let keep_from = manifest.retired.len().saturating_sub(1);
        let expired: Vec<GenerationRecord> = manifest.retired.drain(..keep_from).collect();
        if !expired.is_empty() {
            // Drop the references before deleting so the manifest never points at a removed directory
            self.write_manifest(key, &manifest)?;
        }

        let listed = self
            .ops
            .list_dirs(&key_root)
            .map_err(|e| GenerationError::io(format!("Failed to list {}", key_root.display()), e))?;

        let mut removed = Vec::new();
        for id in listed.iter().filter_map(|name| parse_generation_dir(name)) {
            if manifest.references(id) || manifest.regenerating.as_ref().is_some_and(|g| g.id == id) {
                continue;
            }
            let path = key_root.join(generation_dir_name(id));
            match self.ops.remove_dir_all(&path) {
                Ok(()) => removed.push(id),
                Err(e) => warn!(
                    index = %key,
                    generation = id,
                    error = %e,
                    "Failed to delete retired generation, will retry on next prune"
                ),
            }
        }

        if !removed.is_empty() {
            info!(index = %key, removed = ?removed, "Pruned old generations");
        }
        Ok(removed)
    }

    /// Every generation of `key` with its role, oldest first
    pub fn list_generations(&self, key: &IndexKey) -> GenerationResult<Vec<GenerationInfo>> {
        let key_root = self.key_root(key);
        let manifest = self.read_manifest(key)?;

        let mut generations: Vec<GenerationInfo> = manifest
            .retired
            .iter()
            .map(|record| GenerationInfo::from_record(record, GenerationRole::Retired, &key_root))
            .collect();
        if let Some(ref live) = manifest.live {
            generations.push(GenerationInfo::from_record(live, GenerationRole::Live, &key_root));
        }
        if let Some(ref regenerating) = manifest.regenerating {
            if self.ops.exists(&self.regeneration_directory(key)) {
                generations.push(GenerationInfo::from_record(
                    regenerating,
                    GenerationRole::Regenerating,
                    &key_root,
                ));
            }
        }
        Ok(generations)
    }

    fn manifest_lock(&self, key: &IndexKey) -> Arc<Mutex<()>> {
        self.manifest_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn manifest_path(&self, key: &IndexKey) -> PathBuf {
        self.key_root(key).join(MANIFEST_FILE)
    }

    fn read_manifest(&self, key: &IndexKey) -> GenerationResult<GenerationManifest> {
        let path = self.manifest_path(key);
        let bytes = self
            .ops
            .read_file(&path)
            .map_err(|e| GenerationError::io(format!("Failed to read {}", path.display()), e))?;

        match bytes {
            None => Ok(GenerationManifest::default()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| GenerationError::ManifestCorrupted {
                path,
                reason: e.to_string(),
            }),
        }
    }

    fn write_manifest(&self, key: &IndexKey, manifest: &GenerationManifest) -> GenerationResult<()> {
        let key_root = self.key_root(key);
        self.ops
            .create_dir_all(&key_root)
            .map_err(|e| GenerationError::io(format!("Failed to create {}", key_root.display()), e))?;

        let path = self.manifest_path(key);
        let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| GenerationError::ManifestCorrupted {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.ops
            .write_file_atomic(&path, &bytes)
            .map_err(|e| GenerationError::io(format!("Failed to write {}", path.display()), e))
    }
}
