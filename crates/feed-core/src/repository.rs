//! The repository engine (component E) — the heart of the crate.
//!
//! Owns the writer lock, the cache's `RwLock`, the "needs rebuild" state
//! machine, and the background tasks (persistence timer, rebuild timer,
//! filesystem watcher). Grounded on the teacher's `ConnectionPool`
//! (`async_io.rs`) for the lock/permit-pairing discipline and on
//! `Storage`+`MultiLevelCache` together for the rebuild-from-disk and
//! dirty-persist behavior this module composes from `layout`/`cache`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::PackageArchive;
use crate::cache::MetadataCache;
use crate::config::RepositoryOptions;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::layout::PackageLayout;
use crate::query;
use crate::types::{Compatibility, HashAlgorithm, ServerPackage, TargetFramework, UpdateQuery};
use crate::watcher::{known_layout_entry, ChangeEvent, DirectoryWatcher};

/// How long after a write a matching filesystem event is still considered
/// self-induced, per the "known path" suppression rule.
fn self_induced_window() -> Duration {
    Duration::minutes(1)
}

fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// RAII guard held for the duration of a mutating operation: suppresses
/// the filesystem watcher (so the engine doesn't react to its own writes)
/// and releases the writer lock and the suppression flag together on drop,
/// on every exit path including early returns via `?`.
struct WriterGuard<'a> {
    _permit: tokio::sync::MutexGuard<'a, ()>,
    suppressed: &'a AtomicBool,
}

impl<'a> WriterGuard<'a> {
    async fn acquire(lock: &'a Mutex<()>, suppressed: &'a AtomicBool) -> WriterGuard<'a> {
        let permit = lock.lock().await;
        suppressed.store(true, Ordering::Release);
        WriterGuard {
            _permit: permit,
            suppressed,
        }
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.suppressed.store(false, Ordering::Release);
    }
}

/// The package repository engine.
///
/// Generic over the filesystem abstraction so tests can run the full
/// engine (rebuilds, drop-folder ingest, latest-flag computation) against
/// [`crate::fs::MemoryFileSystem`] without touching disk.
pub struct Repository<F: FileSystem> {
    layout: PackageLayout<F>,
    cache: RwLock<MetadataCache>,
    writer_lock: Mutex<()>,
    options: RepositoryOptions,
    cache_file: std::path::PathBuf,
    needs_rebuild: AtomicBool,
    watcher_suppressed: AtomicBool,
}

impl<F: FileSystem + 'static> Repository<F> {
    /// Construct a repository over `fs`, validating `options` before any
    /// I/O per the error-handling design.
    ///
    /// Attempts to load a persisted metadata cache from
    /// `options.resolved_cache_file_name()` so a restart with a valid
    /// on-disk cache skips the initial rebuild; a missing or corrupt cache
    /// file loads as empty and leaves [`Self::needs_rebuild`] set so the
    /// first query (or the first background rebuild tick) repopulates it
    /// from the package tree.
    ///
    /// Does not perform a rebuild or start background tasks; call
    /// [`Self::spawn_background_tasks`] (or [`Self::rebuild`] directly) once
    /// the repository is wrapped in an `Arc`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `options` fails
    /// validation. Returns [`Error::Io`] if the cache file exists but
    /// cannot be read at all.
    pub fn new(fs: F, options: RepositoryOptions) -> Result<Self> {
        options.validate()?;
        let cache_file = std::path::PathBuf::from(options.resolved_cache_file_name());
        let layout = PackageLayout::new(fs);
        let cache = MetadataCache::load(layout.filesystem(), &cache_file)?;
        let needs_rebuild = cache.get_all().is_empty();
        Ok(Self {
            layout,
            cache: RwLock::new(cache),
            writer_lock: Mutex::new(()),
            options,
            cache_file,
            needs_rebuild: AtomicBool::new(needs_rebuild),
            watcher_suppressed: AtomicBool::new(false),
        })
    }

    /// Whether a rebuild is currently required — true initially, after
    /// `clear_cache`, or after an unrecognized filesystem event.
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::Acquire)
    }

    async fn ensure_rebuilt(&self, token: &CancellationToken) -> Result<()> {
        if self.needs_rebuild() {
            self.rebuild(token).await?;
        }
        Ok(())
    }

    /// Snapshot of every cached record, filtered by SemVer2 allowance.
    ///
    /// Triggers a rebuild first if one is pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled, or propagates
    /// errors from an implicit rebuild.
    pub async fn get_packages(
        &self,
        compatibility: Compatibility,
        token: &CancellationToken,
    ) -> Result<Vec<ServerPackage>> {
        check_cancelled(token)?;
        self.ensure_rebuilt(token).await?;
        let cache = self.cache.read().await;
        Ok(query::filter_semver2(cache.get_all(), compatibility)
            .into_iter()
            .cloned()
            .collect())
    }

    /// First record matching `id` (case-insensitive) and `version`
    /// (semantic equality), if any.
    ///
    /// # Errors
    ///
    /// See [`Self::get_packages`].
    pub async fn find_package(
        &self,
        id: &str,
        version: &str,
        token: &CancellationToken,
    ) -> Result<Option<ServerPackage>> {
        check_cancelled(token)?;
        self.ensure_rebuilt(token).await?;
        let target = crate::types::PackageVersion::parse(version)?;
        let cache = self.cache.read().await;
        Ok(cache
            .get_by_id(id)
            .into_iter()
            .find(|p| p.parsed_version().is_ok_and(|v| v == target))
            .cloned())
    }

    /// All versions of `id` under `compatibility`.
    ///
    /// # Errors
    ///
    /// See [`Self::get_packages`].
    pub async fn find_packages_by_id(
        &self,
        id: &str,
        compatibility: Compatibility,
        token: &CancellationToken,
    ) -> Result<Vec<ServerPackage>> {
        check_cancelled(token)?;
        self.ensure_rebuilt(token).await?;
        let cache = self.cache.read().await;
        Ok(cache
            .get_by_id(id)
            .into_iter()
            .filter(|p| compatibility.allows(p.is_semver2))
            .cloned()
            .collect())
    }

    /// Free-text search with optional framework, prerelease, and
    /// unlisted-visibility filters, per the search algorithm.
    ///
    /// # Errors
    ///
    /// See [`Self::get_packages`].
    #[allow(clippy::too_many_arguments)]
    pub async fn search(
        &self,
        term: &str,
        target_frameworks: &[TargetFramework],
        allow_prerelease: bool,
        allow_unlisted: bool,
        compatibility: Compatibility,
        token: &CancellationToken,
    ) -> Result<Vec<ServerPackage>> {
        check_cancelled(token)?;
        self.ensure_rebuilt(token).await?;
        let cache = self.cache.read().await;

        let mut matched: Vec<&ServerPackage> = query::filter_semver2(cache.get_all(), compatibility)
            .into_iter()
            .filter(|p| query::tokenized_match(p, term))
            .collect();

        if !allow_prerelease {
            matched.retain(|p| p.parsed_version().is_ok_and(|v| !v.is_prerelease()));
        }
        if self.options.enable_delisting && !allow_unlisted {
            matched.retain(|p| p.listed);
        }
        if self.options.enable_framework_filtering && !target_frameworks.is_empty() {
            matched = query::compatible_frameworks(&matched, target_frameworks);
        }

        Ok(matched.into_iter().cloned().collect())
    }

    /// Evaluate a batch of `GetUpdates` queries.
    ///
    /// `include_all_versions = false` keeps only the highest matching
    /// version per queried id.
    ///
    /// # Errors
    ///
    /// See [`Self::get_packages`].
    #[allow(clippy::too_many_arguments)]
    pub async fn get_updates(
        &self,
        queries: &[UpdateQuery],
        include_prerelease: bool,
        include_all_versions: bool,
        target_frameworks: &[TargetFramework],
        compatibility: Compatibility,
        token: &CancellationToken,
    ) -> Result<Vec<ServerPackage>> {
        check_cancelled(token)?;
        self.ensure_rebuilt(token).await?;
        let cache = self.cache.read().await;
        let all = query::filter_semver2(cache.get_all(), compatibility);
        let all = if self.options.enable_framework_filtering && !target_frameworks.is_empty() {
            query::compatible_frameworks(&all, target_frameworks)
        } else {
            all
        };

        let mut results = Vec::new();
        for q in queries {
            let mut matches = query::find_updates(&all, q, include_prerelease, compatibility);
            if !include_all_versions {
                matches.sort_by_key(|p| p.parsed_version().ok());
                if let Some(highest) = matches.pop() {
                    results.push(highest.clone());
                }
            } else {
                results.extend(matches.into_iter().cloned());
            }
        }
        Ok(results)
    }

    /// Push an archive into the repository: writes it to the on-disk
    /// layout, derives a [`ServerPackage`] record, and inserts it into the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolsRejected`] if the archive is a symbols
    /// package and `ignore_symbols_packages` is set, [`Error::AlreadyExists`]
    /// if the `(id, version)` is already present and overwrite is disabled,
    /// or propagates layout/cache I/O errors.
    pub async fn add_package(
        &self,
        archive: PackageArchive,
        token: &CancellationToken,
    ) -> Result<ServerPackage> {
        check_cancelled(token)?;
        let guard = WriterGuard::acquire(&self.writer_lock, &self.watcher_suppressed).await;
        let record = self.ingest_archive(archive).await?;
        drop(guard);
        Ok(record)
    }

    /// Remove `(id, version)`: flips the hidden flag if delisting is
    /// enabled, otherwise deletes the entry from the layout and the cache.
    ///
    /// # Errors
    ///
    /// Propagates layout I/O errors. Removing an absent entry is a no-op,
    /// not an error.
    pub async fn remove_package(
        &self,
        id: &str,
        version_normalized: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(token)?;
        let _guard = WriterGuard::acquire(&self.writer_lock, &self.watcher_suppressed).await;

        if self.options.enable_delisting {
            self.layout.set_hidden(id, version_normalized, true)?;
            let mut cache = self.cache.write().await;
            for pkg in cache_mut_matching(&mut cache, id, version_normalized) {
                pkg.listed = false;
            }
        } else {
            self.layout.remove(id, version_normalized)?;
            let mut cache = self.cache.write().await;
            cache.remove(id, version_normalized);
        }
        Ok(())
    }

    /// Empty the cache, persist the empty state, and mark a rebuild as
    /// required.
    ///
    /// # Errors
    ///
    /// Propagates cache persistence I/O errors.
    pub async fn clear_cache(&self, token: &CancellationToken) -> Result<()> {
        check_cancelled(token)?;
        let _guard = WriterGuard::acquire(&self.writer_lock, &self.watcher_suppressed).await;
        let mut cache = self.cache.write().await;
        cache.clear();
        cache.persist(self.layout.filesystem(), &self.cache_file)?;
        self.needs_rebuild.store(true, Ordering::Release);
        Ok(())
    }

    /// Scan the root for loose archive files and ingest each, per the
    /// drop-folder ingest algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error only if enumerating the root fails; per-file
    /// ingest errors are logged and the file is skipped (left in place).
    pub async fn add_packages_from_drop_folder(&self, token: &CancellationToken) -> Result<usize> {
        check_cancelled(token)?;
        let guard = WriterGuard::acquire(&self.writer_lock, &self.watcher_suppressed).await;
        let count = self.ingest_drop_folder().await?;
        drop(guard);
        Ok(count)
    }

    /// Force a rebuild now, regardless of the "needs rebuild" flag.
    ///
    /// # Errors
    ///
    /// Propagates layout/cache I/O errors.
    pub async fn rebuild(&self, token: &CancellationToken) -> Result<()> {
        check_cancelled(token)?;
        let guard = WriterGuard::acquire(&self.writer_lock, &self.watcher_suppressed).await;
        self.rebuild_locked().await?;
        drop(guard);
        Ok(())
    }

    async fn rebuild_locked(&self) -> Result<()> {
        info!("rebuilding package cache from disk");
        let package_files = self.layout.walk_packages()?;
        let mut records = Vec::with_capacity(package_files.len());
        for path in &package_files {
            match self.derive_record(path) {
                Ok(record) => records.push(record),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable package during rebuild"),
            }
        }

        {
            let mut cache = self.cache.write().await;
            cache.replace_all(records);
        }

        self.ingest_drop_folder().await?;

        {
            let mut cache = self.cache.write().await;
            let mut all: Vec<ServerPackage> = cache.get_all().to_vec();
            query::latest_flags(&mut all);
            cache.replace_all(all);
            cache.persist_if_dirty(self.layout.filesystem(), &self.cache_file)?;
        }

        self.needs_rebuild.store(false, Ordering::Release);
        Ok(())
    }

    fn derive_record(&self, package_file: &Path) -> Result<ServerPackage> {
        let bytes = self.layout.filesystem().read(package_file)?;
        let archive = PackageArchive::from_bytes(bytes)?;
        let manifest = archive.manifest();
        let version = crate::types::PackageVersion::parse(&manifest.version)?;
        let (size, created, hidden) = self.layout.observe(package_file)?;
        let hash = self
            .layout
            .read_hash(&manifest.id, &version.normalized())
            .unwrap_or_else(|_| archive.hash(HashAlgorithm::Sha256));

        Ok(ServerPackage {
            id: manifest.id.clone(),
            version: manifest.version.clone(),
            version_normalized: version.normalized(),
            is_semver2: version.is_semver2_format()
                || manifest
                    .dependency_sets
                    .iter()
                    .flat_map(|g| &g.dependencies)
                    .any(|d| d.version_range.requires_semver2()),
            full_path: package_file.to_path_buf(),
            package_size: size,
            package_hash: hash,
            hash_algorithm: HashAlgorithm::Sha256,
            listed: !(self.options.enable_delisting && hidden),
            created_utc: created,
            last_updated_utc: created,
            supported_target_frameworks: manifest.supported_target_frameworks.clone(),
            dependency_sets: manifest.dependency_sets.clone(),
            min_client_version: manifest.min_client_version.clone(),
            authors: manifest.authors.clone(),
            description: manifest.description.clone(),
            title: manifest.title.clone(),
            tags: manifest.tags.clone(),
            project_url: manifest.project_url.clone(),
            license_url: manifest.license_url.clone(),
            icon_url: manifest.icon_url.clone(),
            require_license_acceptance: manifest.require_license_acceptance,
            development_dependency: manifest.development_dependency,
            release_notes: manifest.release_notes.clone(),
            copyright: manifest.copyright.clone(),
            summary: manifest.summary.clone(),
            semver1_is_latest: false,
            semver1_is_absolute_latest: false,
            semver2_is_latest: false,
            semver2_is_absolute_latest: false,
        })
    }

    async fn ingest_archive(&self, archive: PackageArchive) -> Result<ServerPackage> {
        let manifest = archive.manifest();
        if manifest.is_symbols && self.options.ignore_symbols_packages {
            return Err(Error::SymbolsRejected {
                id: manifest.id.clone(),
                version: manifest.version.clone(),
            });
        }
        let version = crate::types::PackageVersion::parse(&manifest.version)?;
        let already_exists = self.layout.exists(&manifest.id, &version.normalized());
        if already_exists && !self.options.allow_override_existing_package_on_push {
            return Err(Error::AlreadyExists {
                id: manifest.id.clone(),
                version: manifest.version.clone(),
            });
        }

        let paths = self
            .layout
            .add(&version.normalized(), &archive, HashAlgorithm::Sha256)?;
        let record = self.derive_record(&paths.package_file)?;

        let mut cache = self.cache.write().await;
        cache.add(record.clone());
        let mut all: Vec<ServerPackage> = cache.get_all().to_vec();
        query::latest_flags(&mut all);
        cache.replace_all(all);
        cache.persist_if_dirty(self.layout.filesystem(), &self.cache_file)?;
        Ok(record)
    }

    async fn ingest_drop_folder(&self) -> Result<usize> {
        let mut ingested = 0;
        for entry in self.layout.filesystem().read_dir(Path::new(""))? {
            if entry.is_dir {
                continue;
            }
            let is_archive = entry
                .path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("nupkg"));
            if !is_archive {
                continue;
            }

            match self.layout.filesystem().read(&entry.path) {
                Ok(bytes) => match PackageArchive::from_bytes(bytes) {
                    Ok(archive) => match self.ingest_archive(archive).await {
                        Ok(_) => {
                            let _ = self.layout.filesystem().remove_file(&entry.path);
                            ingested += 1;
                        }
                        Err(err) => {
                            warn!(path = %entry.path.display(), error = %err, "skipping drop-folder package");
                        }
                    },
                    Err(err) => {
                        warn!(path = %entry.path.display(), error = %err, "unreadable drop-folder archive, leaving in place");
                    }
                },
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "could not read drop-folder file, leaving in place");
                }
            }
        }
        Ok(ingested)
    }

    /// Start the persistence timer, rebuild timer, and (if enabled and the
    /// filesystem watcher can be established) the filesystem watcher.
    ///
    /// Requires `self` behind an `Arc` so the spawned tasks can hold a
    /// [`Weak`] reference and stop doing work once the repository itself is
    /// dropped, rather than keeping it alive forever.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        self.spawn_persistence_timer();
        self.spawn_rebuild_timer();
        if self.options.enable_file_system_monitoring {
            self.spawn_watcher();
        }
    }

    fn spawn_persistence_timer(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let Some(repo) = weak.upgrade() else { break };
                let cache = repo.cache.read().await;
                if let Err(err) = cache.persist_if_dirty(repo.layout.filesystem(), &repo.cache_file) {
                    error!(error = %err, "periodic cache persist failed");
                }
            }
        });
    }

    fn spawn_rebuild_timer(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let initial_delay = self.options.initial_cache_rebuild_after;
        let frequency = self.options.cache_rebuild_frequency;
        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                let Some(repo) = weak.upgrade() else { break };
                let token = CancellationToken::new();
                if let Err(err) = repo.rebuild(&token).await {
                    error!(error = %err, "scheduled rebuild failed");
                }
                drop(repo);
                tokio::time::sleep(frequency).await;
            }
        });
    }

    fn spawn_watcher(self: &Arc<Self>) {
        let root = self.layout.filesystem().root().to_path_buf();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut watcher = match DirectoryWatcher::start(&root) {
                Ok(w) => w,
                Err(err) => {
                    warn!(error = %err, "filesystem watcher unavailable, relying on timer-only rebuilds");
                    return;
                }
            };
            while let Some(event) = watcher.recv().await {
                let Some(repo) = weak.upgrade() else { break };
                if repo.watcher_suppressed.load(Ordering::Acquire) {
                    continue;
                }
                if repo.is_self_induced(&root, &event).await {
                    debug!(paths = ?event.paths, "ignoring self-induced filesystem event");
                    continue;
                }
                repo.needs_rebuild.store(true, Ordering::Release);
            }
        });
    }

    /// Whether every path in `event` is a known, recently-written cache
    /// entry rather than an external edit: each path must resolve to an
    /// `(id, version)` currently present in the cache under the canonical
    /// layout shape, and the file it names must have been created within
    /// [`self_induced_window`]. Any path that fails either check means the
    /// event is treated as external and triggers a rebuild.
    async fn is_self_induced(&self, root: &Path, event: &ChangeEvent) -> bool {
        if event.paths.is_empty() {
            return false;
        }
        let cache = self.cache.read().await;
        for path in &event.paths {
            let Some((id, version, relative)) = known_layout_entry(root, path) else {
                return false;
            };
            if !cache.exists(&id, &version) {
                return false;
            }
            let Ok(created) = self.layout.filesystem().created_at(&relative) else {
                return false;
            };
            if Utc::now().signed_duration_since(created) > self_induced_window() {
                return false;
            }
        }
        true
    }
}

fn cache_mut_matching<'a>(
    cache: &'a mut MetadataCache,
    id: &str,
    version_normalized: &str,
) -> Vec<&'a mut ServerPackage> {
    cache
        .get_all_mut()
        .iter_mut()
        .filter(|p| p.id.eq_ignore_ascii_case(id) && p.version_normalized == version_normalized)
        .collect()
}
