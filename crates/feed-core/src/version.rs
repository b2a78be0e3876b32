//! A totally-ordered package version type.
//!
//! Unlike `semver::Version` (which rejects the handful of version shapes
//! this ecosystem's manifests actually carry — two-component releases like
//! `1.0`, single-identifier prerelease tags like `1.0-beta2`), `PackageVersion`
//! implements the comparison rules spec'd in §3 of the data model directly:
//! numeric release components of arbitrary length, an optional prerelease
//! identifier sequence, and build metadata that never affects ordering or
//! equality.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// A single prerelease identifier: either a bare non-negative integer or an
/// alphanumeric token. SemVer precedence rules treat the two differently,
/// so the distinction is kept rather than collapsed to a string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alphanumeric(String),
}

impl Identifier {
    fn parse(raw: &str) -> Identifier {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<u64>() {
                return Identifier::Numeric(n);
            }
        }
        Identifier::Alphanumeric(raw.to_string())
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            // Numeric identifiers always have lower precedence than
            // alphanumeric ones, per SemVer precedence rules.
            (Identifier::Numeric(_), Identifier::Alphanumeric(_)) => Ordering::Less,
            (Identifier::Alphanumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::Alphanumeric(a), Identifier::Alphanumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A package version: a release component sequence, an optional prerelease
/// identifier sequence, and optional build metadata.
///
/// Equality and ordering follow the rule in the data model: two versions
/// compare equal iff release and prerelease are equal; build metadata is
/// ignored entirely.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    original: String,
    release: Vec<u64>,
    prerelease: Vec<Identifier>,
    prerelease_raw: Vec<String>,
    build_metadata: Option<String>,
}

impl PackageVersion {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string has no release
    /// component, the release component contains a non-numeric segment, or
    /// a prerelease identifier is empty (e.g. a trailing `.`).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidArgument("version string is empty".into()));
        }

        let (before_build, build_metadata) = match raw.split_once('+') {
            Some((before, meta)) => (before, Some(meta.to_string())),
            None => (raw, None),
        };

        let (release_part, prerelease_part) = match before_build.split_once('-') {
            Some((release, pre)) => (release, Some(pre)),
            None => (before_build, None),
        };

        if release_part.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "version '{raw}' has no release component"
            )));
        }

        let mut release = Vec::new();
        for segment in release_part.split('.') {
            let n: u64 = segment.parse().map_err(|_| {
                Error::InvalidArgument(format!(
                    "version '{raw}' has a non-numeric release segment '{segment}'"
                ))
            })?;
            release.push(n);
        }

        let mut prerelease = Vec::new();
        let mut prerelease_raw = Vec::new();
        if let Some(pre) = prerelease_part {
            for segment in pre.split('.') {
                if segment.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "version '{raw}' has an empty prerelease identifier"
                    )));
                }
                prerelease.push(Identifier::parse(segment));
                prerelease_raw.push(segment.to_string());
            }
        }

        Ok(Self {
            original: raw.to_string(),
            release,
            prerelease,
            prerelease_raw,
            build_metadata,
        })
    }

    /// The original string form, build metadata and all — preserved for
    /// cache round-tripping.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Whether this version carries a prerelease identifier.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Whether this version's *format* forces SemVer2: a multi-identifier
    /// prerelease tag (`1.0-beta.1`) or non-empty build metadata.
    ///
    /// A single-identifier prerelease tag (`1.0-beta2`) is SemVer1-compatible
    /// and does not by itself force SemVer2.
    #[must_use]
    pub fn is_semver2_format(&self) -> bool {
        self.prerelease_raw.len() > 1
            || self
                .build_metadata
                .as_ref()
                .is_some_and(|m| !m.is_empty())
    }

    /// The normalized form: build metadata dropped, release padded to at
    /// least three components, trailing zero release components beyond the
    /// third dropped.
    #[must_use]
    pub fn normalized(&self) -> String {
        let release = Self::normalize_release(&self.release);
        let release_str = release
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        if self.prerelease_raw.is_empty() {
            release_str
        } else {
            format!("{release_str}-{}", self.prerelease_raw.join("."))
        }
    }

    fn normalize_release(release: &[u64]) -> Vec<u64> {
        let mut r = release.to_vec();
        while r.len() < 3 {
            r.push(0);
        }
        while r.len() > 3 && *r.last().unwrap_or(&0) == 0 {
            r.pop();
        }
        r
    }

    /// Semantic equality: release and prerelease equal, build metadata
    /// ignored. Exposed separately from `PartialEq` for callers that want
    /// to be explicit about ignoring build metadata (the `PartialEq`/`Eq`
    /// impls already do this, but some call sites read more clearly this
    /// way, e.g. `Cache::exists`).
    #[must_use]
    pub fn semantically_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        Self::normalize_release(&self.release) == Self::normalize_release(&other.release)
            && self.prerelease == other.prerelease
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = Self::normalize_release(&self.release);
        let b = Self::normalize_release(&other.release);
        match a.cmp(&b) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
            (true, true) => return Ordering::Equal,
            // No prerelease has higher precedence than any prerelease.
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        for (a, b) in self.prerelease.iter().zip(other.prerelease.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.prerelease.len().cmp(&other.prerelease.len())
    }
}
