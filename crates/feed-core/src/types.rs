//! Core data structures shared across the repository engine.
//!
//! - **Identity & ordering**: [`PackageVersion`] (re-exported from
//!   [`crate::version`]), [`PackageId`]
//! - **Cache entry**: [`ServerPackage`]
//! - **Manifest (component B output)**: [`Manifest`], [`DependencyGroup`],
//!   [`Dependency`]
//! - **Query inputs**: [`Compatibility`], [`TargetFramework`],
//!   [`VersionRange`]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::version::PackageVersion;
use crate::error::{Error, Result};

/// A package id, compared case-insensitively everywhere it is used as a
/// key (cache lookups, search matching, id equality in `Exists`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    /// Wrap a raw id string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The original-case id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A lowercase key suitable for case-insensitive indexing.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for PackageId {}

/// Which SemVer flavor(s) a caller is willing to see.
///
/// `Default` (NuGet terminology: SemVer1-only) omits any package whose
/// version format forces SemVer2 (`ServerPackage::is_semver2`). `Max`
/// allows everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compatibility {
    /// Omit SemVer2-only packages.
    #[default]
    Default,
    /// Allow every package regardless of SemVer2 format.
    Max,
}

impl Compatibility {
    /// Whether a package with the given `is_semver2` flag passes this
    /// compatibility filter.
    #[must_use]
    pub fn allows(self, is_semver2: bool) -> bool {
        match self {
            Compatibility::Default => !is_semver2,
            Compatibility::Max => true,
        }
    }
}

/// A target framework moniker (e.g. `net6.0`, `netstandard2.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetFramework(pub String);

impl TargetFramework {
    /// Parse a framework moniker into its alphabetic family prefix and
    /// numeric version suffix, e.g. `net6.0` -> (`net`, "6.0").
    fn split(&self) -> (&str, &str) {
        let idx = self
            .0
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.0.len());
        self.0.split_at(idx)
    }

    /// Whether a package that supports `self` satisfies a request for
    /// `requested`.
    ///
    /// This is a deliberately small stand-in for the real framework
    /// compatibility table (spec.md calls this out as an external
    /// collaborator): the same family, with the supported version numeric
    /// string greater than or equal to the requested one, or an exact
    /// string match across families (covers PCL/portable monikers that
    /// don't decompose into family+version).
    #[must_use]
    pub fn is_compatible_with(&self, requested: &TargetFramework) -> bool {
        if self.0.eq_ignore_ascii_case(&requested.0) {
            return true;
        }
        let (self_family, self_version) = self.split();
        let (req_family, req_version) = requested.split();
        if !self_family.eq_ignore_ascii_case(req_family) {
            return false;
        }
        match (self_version.parse::<f64>(), req_version.parse::<f64>()) {
            (Ok(sv), Ok(rv)) => sv >= rv,
            _ => false,
        }
    }
}

/// A dependency on another package within a single target framework group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Id of the depended-upon package.
    pub id: String,
    /// Accepted version range, in the manifest's native range syntax.
    pub version_range: VersionRange,
}

/// Dependencies declared for a single target framework (or "any", when
/// `target_framework` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGroup {
    /// `None` means the group applies regardless of target framework.
    pub target_framework: Option<TargetFramework>,
    /// Dependencies in this group.
    pub dependencies: Vec<Dependency>,
}

/// A NuGet-style version range: `[1.0.0, 2.0.0)`, `1.0.0` (minimum
/// inclusive, unbounded above), etc.
///
/// Spec.md treats this as "an opaque external type with a `Satisfies(v)`
/// predicate"; this is the minimal concrete implementation the engine needs
/// to evaluate `GetUpdates` against manifest-declared dependency ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRange {
    /// Raw range string as declared in the manifest, preserved for
    /// round-tripping and for `requires_semver2` inspection.
    raw: String,
    #[serde(skip)]
    min: Option<(PackageVersion, bool)>,
    #[serde(skip)]
    max: Option<(PackageVersion, bool)>,
}

impl VersionRange {
    /// Parse a NuGet-style interval range string.
    ///
    /// Accepts a bare version (`1.0.0`, minimum-inclusive/unbounded-above)
    /// or a bracketed interval (`[1.0.0, 2.0.0)`, `(1.0.0, )`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string cannot be parsed as
    /// a bare version or a bracketed interval of versions.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("version range is empty".into()));
        }

        let first = trimmed.as_bytes()[0];
        if first != b'[' && first != b'(' {
            let version = PackageVersion::parse(trimmed)?;
            return Ok(Self {
                raw: raw.to_string(),
                min: Some((version, true)),
                max: None,
            });
        }

        let last = trimmed
            .chars()
            .last()
            .ok_or_else(|| Error::InvalidArgument(format!("malformed version range '{raw}'")))?;
        let min_inclusive = first == b'[';
        let max_inclusive = last == ']';
        let inner = &trimmed[1..trimmed.len() - 1];
        let (min_str, max_str) = inner
            .split_once(',')
            .ok_or_else(|| Error::InvalidArgument(format!("malformed version range '{raw}'")))?;
        let min_str = min_str.trim();
        let max_str = max_str.trim();

        let min = if min_str.is_empty() {
            None
        } else {
            Some((PackageVersion::parse(min_str)?, min_inclusive))
        };
        let max = if max_str.is_empty() {
            None
        } else {
            Some((PackageVersion::parse(max_str)?, max_inclusive))
        };

        Ok(Self {
            raw: raw.to_string(),
            min,
            max,
        })
    }

    /// Whether `version` falls within this range.
    #[must_use]
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        if let Some((min, inclusive)) = &self.min {
            match version.cmp(min) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !inclusive => return false,
                _ => {}
            }
        }
        if let Some((max, inclusive)) = &self.max {
            match version.cmp(max) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// Whether expressing this range requires SemVer2 (either bound uses a
    /// SemVer2-format version). A package that declares such a dependency
    /// is itself treated as SemVer2, per the data model.
    #[must_use]
    pub fn requires_semver2(&self) -> bool {
        self.min.as_ref().is_some_and(|(v, _)| v.is_semver2_format())
            || self.max.as_ref().is_some_and(|(v, _)| v.is_semver2_format())
    }

    /// The raw range string as originally supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Hash algorithm used to compute a package archive's content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256 (the default).
    Sha256,
    /// SHA-512, for deployments that need a larger digest.
    Sha512,
}

impl HashAlgorithm {
    /// The name stored alongside a [`ServerPackage`]'s hash.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }
}

/// Manifest fields surfaced by the archive reader (component B) for one
/// archive, before any filesystem-derived facts (size, hash, timestamps)
/// are attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package id, as declared in the manifest (original case).
    pub id: String,
    /// Package version, as declared in the manifest (original string).
    pub version: String,
    /// Supported target framework monikers.
    pub supported_target_frameworks: Vec<TargetFramework>,
    /// Per-framework dependency groups.
    pub dependency_sets: Vec<DependencyGroup>,
    /// Whether this archive is a symbols package (reserved `.pdb` entry
    /// present inside it).
    pub is_symbols: bool,
    /// Minimum client tool version required to consume this package.
    pub min_client_version: Option<String>,
    /// Author list, as a single declared string (comma-separated in the
    /// manifest convention this format follows).
    pub authors: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub icon_url: Option<String>,
    pub require_license_acceptance: bool,
    pub development_dependency: bool,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub summary: Option<String>,
}

/// The cache entry: a package record derived from a manifest plus
/// filesystem-observed facts.
///
/// The four "latest" flags are computed by [`crate::query::latest_flags`]
/// during a rebuild; they are not authoritative inputs and are recomputed
/// whenever the cache's contents for an id change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPackage {
    pub id: String,
    /// Original version string, preserved for round-tripping.
    pub version: String,
    /// Normalized version string (build metadata dropped, release padded/
    /// trimmed to three-or-more components).
    pub version_normalized: String,
    pub is_semver2: bool,

    pub full_path: PathBuf,
    pub package_size: u64,
    /// Base64-encoded content digest.
    pub package_hash: String,
    pub hash_algorithm: HashAlgorithm,

    pub listed: bool,
    pub created_utc: DateTime<Utc>,
    pub last_updated_utc: DateTime<Utc>,

    pub supported_target_frameworks: Vec<TargetFramework>,
    pub dependency_sets: Vec<DependencyGroup>,

    pub min_client_version: Option<String>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub icon_url: Option<String>,
    pub require_license_acceptance: bool,
    pub development_dependency: bool,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub summary: Option<String>,

    pub semver1_is_latest: bool,
    pub semver1_is_absolute_latest: bool,
    pub semver2_is_latest: bool,
    pub semver2_is_absolute_latest: bool,
}

impl ServerPackage {
    /// Parse this record's version string into a [`PackageVersion`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `self.version` is not a
    /// well-formed version string, which should not happen for records the
    /// engine produced itself but can happen for a hand-edited cache file.
    pub fn parsed_version(&self) -> Result<PackageVersion> {
        PackageVersion::parse(&self.version)
    }

    /// Case-insensitive id match.
    #[must_use]
    pub fn id_eq(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

/// One input to `GetUpdates`: a package the caller already has, plus an
/// optional constraint on acceptable replacement versions.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    pub id: String,
    pub version: PackageVersion,
    pub version_constraint: Option<VersionRange>,
}
