//! Repository configuration (component E input).
//!
//! `RepositoryOptions` is grounded on the teacher's `Config`/`PathsConfig`:
//! same shape (a flat struct of booleans and durations with sane defaults),
//! same environment-variable override convention (`BLZ_DATA_DIR` there,
//! `FEED_*` here), same validation-before-I/O discipline in `Repository::new`.

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const ENV_ROOT: &str = "FEED_ROOT";
const ENV_CACHE_FILE_NAME: &str = "FEED_CACHE_FILE_NAME";
const ENV_ENABLE_DELISTING: &str = "FEED_ENABLE_DELISTING";
const ENV_ENABLE_FRAMEWORK_FILTERING: &str = "FEED_ENABLE_FRAMEWORK_FILTERING";
const ENV_IGNORE_SYMBOLS_PACKAGES: &str = "FEED_IGNORE_SYMBOLS_PACKAGES";
const ENV_ALLOW_OVERRIDE_EXISTING: &str = "FEED_ALLOW_OVERRIDE_EXISTING_PACKAGE_ON_PUSH";
const ENV_ENABLE_FS_MONITORING: &str = "FEED_ENABLE_FILE_SYSTEM_MONITORING";

/// Tunable behavior for a [`crate::repository::Repository`].
///
/// Every field has a default matching the teacher's "ship something that
/// works with zero configuration" philosophy; callers needing non-default
/// behavior override individual fields after `RepositoryOptions::default()`
/// or read them from the environment with [`RepositoryOptions::from_env`].
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Root directory the repository stores packages under.
    pub root: PathBuf,
    /// Whether `RemovePackage` flips the hidden flag instead of deleting.
    pub enable_delisting: bool,
    /// Whether queries filter on target framework compatibility.
    pub enable_framework_filtering: bool,
    /// Whether a push of a symbols archive is rejected outright.
    pub ignore_symbols_packages: bool,
    /// Whether pushing an existing `(id, version)` overwrites it instead of
    /// failing with `AlreadyExists`.
    pub allow_override_existing_package_on_push: bool,
    /// Whether a background filesystem watcher triggers rebuilds.
    pub enable_file_system_monitoring: bool,
    /// Cache file name, relative to `root`. `None` resolves to a
    /// machine-id-derived default at construction time.
    pub cache_file_name: Option<String>,
    /// Delay between repository construction and the first automatic
    /// rebuild.
    pub initial_cache_rebuild_after: Duration,
    /// Interval between subsequent automatic rebuilds.
    pub cache_rebuild_frequency: Duration,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            enable_delisting: false,
            enable_framework_filtering: false,
            ignore_symbols_packages: false,
            allow_override_existing_package_on_push: true,
            enable_file_system_monitoring: true,
            cache_file_name: None,
            initial_cache_rebuild_after: Duration::from_secs(15),
            cache_rebuild_frequency: Duration::from_secs(60 * 60),
        }
    }
}

impl RepositoryOptions {
    /// Start building options rooted at `root`, with every other field at
    /// its default.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Build options from `FEED_*` environment variables, each falling back
    /// to its default when unset or unparsable.
    ///
    /// `FEED_ROOT` is required; every other variable is optional.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `FEED_ROOT` is unset.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var(ENV_ROOT)
            .map_err(|_| Error::InvalidConfiguration(format!("{ENV_ROOT} is not set")))?;
        let mut options = Self::builder(root);

        if let Ok(v) = std::env::var(ENV_CACHE_FILE_NAME) {
            options.cache_file_name = Some(v);
        }
        options.enable_delisting = env_flag(ENV_ENABLE_DELISTING, options.enable_delisting);
        options.enable_framework_filtering =
            env_flag(ENV_ENABLE_FRAMEWORK_FILTERING, options.enable_framework_filtering);
        options.ignore_symbols_packages =
            env_flag(ENV_IGNORE_SYMBOLS_PACKAGES, options.ignore_symbols_packages);
        options.allow_override_existing_package_on_push = env_flag(
            ENV_ALLOW_OVERRIDE_EXISTING,
            options.allow_override_existing_package_on_push,
        );
        options.enable_file_system_monitoring =
            env_flag(ENV_ENABLE_FS_MONITORING, options.enable_file_system_monitoring);

        options.validate()?;
        Ok(options)
    }

    /// Validate fields that cannot be checked at the type level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `cache_file_name` is set
    /// and is not a bare filename (contains a path separator or is empty).
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.cache_file_name {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(Error::InvalidConfiguration(format!(
                    "cache_file_name '{name}' must be a bare filename"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the cache file name, deriving a stable default from `root`
    /// if none was configured.
    #[must_use]
    pub fn resolved_cache_file_name(&self) -> String {
        self.cache_file_name
            .clone()
            .unwrap_or_else(|| default_cache_file_name(&self.root))
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

/// A stable, root-derived default cache file name.
///
/// Hashes the absolute form of `root` rather than generating a fresh random
/// id: the same repository root must resolve to the same cache file name
/// across restarts, or a persisted cache is orphaned on disk the moment the
/// process restarts and picks a new name for it.
#[must_use]
pub fn default_cache_file_name(root: &std::path::Path) -> String {
    let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..12]);
    format!("{encoded}.cache.bin")
}
