//! In-memory metadata cache with JSON persistence (component D).
//!
//! Holds the full set of [`ServerPackage`] records as a flat, cloneable
//! snapshot plus a couple of index maps for O(1) lookup. Persistence is
//! dirty-tracked the same way the teacher's `save_llms_json` only rewrites
//! a source's cached copy when its content actually changed: a write here
//! only touches disk when the in-memory set has been mutated since the
//! last successful persist.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::types::ServerPackage;

/// Schema version stamped into the persisted cache file. A file with a
/// different (or missing) schema version is treated as corrupt and
/// discarded in favor of an empty cache, which the next rebuild repopulates
/// from the on-disk package tree.
pub const SCHEMA_VERSION: &str = "3.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    schema_version: String,
    packages: Vec<ServerPackage>,
}

/// The in-memory metadata cache.
///
/// Index maps are keyed on the lowercased id; within an id, packages are
/// looked up by normalized version. Both indices are rebuilt from
/// `packages` on load and kept in sync by `add`/`remove`.
pub struct MetadataCache {
    packages: Vec<ServerPackage>,
    by_id: HashMap<String, Vec<usize>>,
    dirty: AtomicBool,
}

impl MetadataCache {
    /// An empty cache, not yet backed by any on-disk file.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            packages: Vec::new(),
            by_id: HashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load a cache from its persisted JSON file.
    ///
    /// A missing file yields an empty cache (first run). A file that exists
    /// but fails to parse, or whose `schema_version` does not match
    /// [`SCHEMA_VERSION`], is treated as corrupt: this also yields an empty
    /// cache rather than an error, since a corrupt cache file is defined as
    /// recoverable by rebuilding from the package tree rather than a fatal
    /// condition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read at all
    /// (permissions, I/O failure) — distinct from "exists but unparsable".
    pub fn load<F: FileSystem>(fs: &F, cache_file: &Path) -> Result<Self> {
        if !fs.exists(cache_file) {
            return Ok(Self::empty());
        }
        let bytes = fs.read(cache_file)?;
        match serde_json::from_slice::<CacheDocument>(&bytes) {
            Ok(doc) if doc.schema_version == SCHEMA_VERSION => Ok(Self::from_packages(doc.packages)),
            Ok(_) | Err(_) => Ok(Self::empty()),
        }
    }

    fn from_packages(packages: Vec<ServerPackage>) -> Self {
        let mut cache = Self {
            packages,
            by_id: HashMap::new(),
            dirty: AtomicBool::new(false),
        };
        cache.reindex();
        cache
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        for (i, pkg) in self.packages.iter().enumerate() {
            self.by_id.entry(pkg.id.to_lowercase()).or_default().push(i);
        }
    }

    /// All packages currently in the cache, in insertion order.
    #[must_use]
    pub fn get_all(&self) -> &[ServerPackage] {
        &self.packages
    }

    /// Mutable access to every package currently in the cache, for callers
    /// that mutate fields in place (e.g. flipping `listed` during a
    /// delisting removal) rather than replacing whole records via `add`.
    /// Always marks the cache dirty, since the caller asked for mutable
    /// access specifically to change something.
    pub fn get_all_mut(&mut self) -> &mut [ServerPackage] {
        self.mark_dirty();
        &mut self.packages
    }

    /// Packages sharing a case-insensitive id.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Vec<&ServerPackage> {
        self.by_id
            .get(&id.to_lowercase())
            .into_iter()
            .flatten()
            .map(|&i| &self.packages[i])
            .collect()
    }

    /// Whether `(id, version_normalized)` is present.
    #[must_use]
    pub fn exists(&self, id: &str, version_normalized: &str) -> bool {
        self.get_by_id(id)
            .iter()
            .any(|p| p.version_normalized == version_normalized)
    }

    /// Insert or replace a record, keyed on `(id, version_normalized)`.
    pub fn add(&mut self, package: ServerPackage) {
        if let Some(existing) = self
            .by_id
            .get(&package.id.to_lowercase())
            .into_iter()
            .flatten()
            .find(|&&i| self.packages[i].version_normalized == package.version_normalized)
            .copied()
        {
            self.packages[existing] = package;
        } else {
            self.packages.push(package);
            self.reindex();
        }
        self.mark_dirty();
    }

    /// Remove the record for `(id, version_normalized)`, if present.
    pub fn remove(&mut self, id: &str, version_normalized: &str) {
        let before = self.packages.len();
        self.packages
            .retain(|p| !(p.id.eq_ignore_ascii_case(id) && p.version_normalized == version_normalized));
        if self.packages.len() != before {
            self.reindex();
            self.mark_dirty();
        }
    }

    /// Drop every record, leaving an empty, dirty cache.
    pub fn clear(&mut self) {
        self.packages.clear();
        self.by_id.clear();
        self.mark_dirty();
    }

    /// Replace the entire contents in one step, as a rebuild does.
    pub fn replace_all(&mut self, packages: Vec<ServerPackage>) {
        self.packages = packages;
        self.reindex();
        self.mark_dirty();
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the in-memory cache has unpersisted changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Persist unconditionally, then clear the dirty flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the document cannot be encoded,
    /// or [`Error::Io`] if the write fails.
    pub fn persist<F: FileSystem>(&self, fs: &F, cache_file: &Path) -> Result<()> {
        let doc = CacheDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            packages: self.packages.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        fs.write(cache_file, &bytes)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Persist only if [`Self::is_dirty`]. Used by the periodic background
    /// flush so an idle repository does no disk I/O.
    ///
    /// # Errors
    ///
    /// See [`Self::persist`].
    pub fn persist_if_dirty<F: FileSystem>(&self, fs: &F, cache_file: &Path) -> Result<()> {
        if self.is_dirty() {
            self.persist(fs, cache_file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{LocalFileSystem, MemoryFileSystem};
    use crate::types::HashAlgorithm;
    use chrono::Utc;
    use std::path::PathBuf;

    fn sample(id: &str, version_normalized: &str) -> ServerPackage {
        ServerPackage {
            id: id.to_string(),
            version: version_normalized.to_string(),
            version_normalized: version_normalized.to_string(),
            is_semver2: false,
            full_path: PathBuf::from(format!("{id}/{version_normalized}")),
            package_size: 0,
            package_hash: String::new(),
            hash_algorithm: HashAlgorithm::Sha256,
            listed: true,
            created_utc: Utc::now(),
            last_updated_utc: Utc::now(),
            supported_target_frameworks: Vec::new(),
            dependency_sets: Vec::new(),
            min_client_version: None,
            authors: None,
            description: None,
            title: None,
            tags: Vec::new(),
            project_url: None,
            license_url: None,
            icon_url: None,
            require_license_acceptance: false,
            development_dependency: false,
            release_notes: None,
            copyright: None,
            summary: None,
            semver1_is_latest: false,
            semver1_is_absolute_latest: false,
            semver2_is_latest: false,
            semver2_is_absolute_latest: false,
        }
    }

    #[test]
    fn missing_cache_file_loads_as_empty() {
        let fs = MemoryFileSystem::new("/virtual");
        let cache = MetadataCache::load(&fs, Path::new("cache.bin")).unwrap();
        assert!(cache.get_all().is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn add_get_remove_round_trips_and_tracks_dirty() {
        let mut cache = MetadataCache::empty();
        assert!(!cache.is_dirty());
        cache.add(sample("Demo", "1.0.0"));
        assert!(cache.is_dirty());
        assert!(cache.exists("demo", "1.0.0"));
        assert_eq!(cache.get_by_id("DEMO").len(), 1);
        cache.remove("Demo", "1.0.0");
        assert!(!cache.exists("Demo", "1.0.0"));
    }

    #[test]
    fn add_with_same_key_replaces_rather_than_duplicates() {
        let mut cache = MetadataCache::empty();
        cache.add(sample("Demo", "1.0.0"));
        cache.add(sample("Demo", "1.0.0"));
        assert_eq!(cache.get_by_id("Demo").len(), 1);
    }

    #[test]
    fn persist_then_load_round_trips_through_real_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        let mut cache = MetadataCache::empty();
        cache.add(sample("Demo", "1.0.0"));
        cache.persist(&fs, Path::new("cache.bin")).unwrap();
        assert!(!cache.is_dirty());

        let reloaded = MetadataCache::load(&fs, Path::new("cache.bin")).unwrap();
        assert_eq!(reloaded.get_all().len(), 1);
        assert_eq!(reloaded.get_all()[0].id, "Demo");
    }

    #[test]
    fn persist_if_dirty_skips_write_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        let cache = MetadataCache::empty();
        cache.persist_if_dirty(&fs, Path::new("cache.bin")).unwrap();
        assert!(!fs.exists(Path::new("cache.bin")));
    }

    #[test]
    fn mismatched_schema_version_is_treated_as_corrupt_and_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.write(
            Path::new("cache.bin"),
            br#"{"schema_version": "1.0.0", "packages": []}"#,
        )
        .unwrap();
        let cache = MetadataCache::load(&fs, Path::new("cache.bin")).unwrap();
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn garbage_cache_file_loads_empty_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.write(Path::new("cache.bin"), b"not json at all").unwrap();
        let cache = MetadataCache::load(&fs, Path::new("cache.bin")).unwrap();
        assert!(cache.get_all().is_empty());
    }
}
