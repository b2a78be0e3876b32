//! Query surface (component F): pure functions over a `&[ServerPackage]`
//! snapshot.
//!
//! None of these take `&Repository` or a lock — they are free functions so
//! they can be unit tested directly against fixture data and so the engine
//! can run them against a cloned snapshot without holding the cache lock
//! for the duration of a query.

use crate::types::{Compatibility, PackageVersion, ServerPackage, TargetFramework, UpdateQuery};

/// Keep only packages whose SemVer2-ness is allowed by `compatibility`.
#[must_use]
pub fn filter_semver2(packages: &[ServerPackage], compatibility: Compatibility) -> Vec<&ServerPackage> {
    packages
        .iter()
        .filter(|p| compatibility.allows(p.is_semver2))
        .collect()
}

/// Keep only listed (non-delisted) packages, unless `include_unlisted`.
#[must_use]
pub fn filter_listed(packages: &[&ServerPackage], include_unlisted: bool) -> Vec<ServerPackage> {
    packages
        .iter()
        .filter(|p| include_unlisted || p.listed)
        .map(|p| (*p).clone())
        .collect()
}

/// Whether a package matches a free-text search term.
///
/// Tokenizes `search_term` on whitespace and requires every token to
/// appear, case-insensitively, as a substring of the id, title,
/// description, tags, or authors. An empty search term matches everything.
#[must_use]
pub fn tokenized_match(package: &ServerPackage, search_term: &str) -> bool {
    let tokens: Vec<String> = search_term
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return true;
    }

    let haystack = [
        Some(package.id.as_str()),
        package.title.as_deref(),
        package.description.as_deref(),
        package.authors.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();
    let tags = package.tags.join(" ").to_lowercase();

    tokens
        .iter()
        .all(|t| haystack.contains(t.as_str()) || tags.contains(t.as_str()))
}

/// Keep only packages that support at least one framework compatible with
/// `requested` (or every package, if `requested` is empty).
#[must_use]
pub fn compatible_frameworks<'a>(
    packages: &[&'a ServerPackage],
    requested: &[TargetFramework],
) -> Vec<&'a ServerPackage> {
    if requested.is_empty() {
        return packages.to_vec();
    }
    packages
        .iter()
        .filter(|p| {
            p.supported_target_frameworks.is_empty()
                || p.supported_target_frameworks.iter().any(|supported| {
                    requested.iter().any(|r| supported.is_compatible_with(r))
                })
        })
        .copied()
        .collect()
}

/// Recompute the four "latest" flags for every record sharing an id.
///
/// `semver1_is_latest`/`semver1_is_absolute_latest` only ever land on a
/// record whose version is not SemVer2-only; `semver2_is_latest`/
/// `semver2_is_absolute_latest` are computed over the full set regardless
/// of SemVer2-ness. Both "latest" and "absolute latest" ignore delisted
/// packages: a delisted version is never the highest-listed, nor the
/// highest overall.
///
/// Returns an error-free best-effort result: a record whose version string
/// fails to parse is excluded from latest-flag consideration entirely
/// (flags left `false`) rather than aborting the whole computation, since a
/// single malformed record should not block every other package's flags
/// from being recomputed.
pub fn latest_flags(packages: &mut [ServerPackage]) {
    use std::collections::HashMap;

    let mut by_id: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, p) in packages.iter().enumerate() {
        by_id.entry(p.id.to_lowercase()).or_default().push(i);
    }

    for indices in by_id.values() {
        let mut parsed: Vec<(usize, PackageVersion)> = indices
            .iter()
            .filter_map(|&i| packages[i].parsed_version().ok().map(|v| (i, v)))
            .collect();
        if parsed.is_empty() {
            continue;
        }
        parsed.sort_by(|a, b| a.1.cmp(&b.1));

        for &i in indices {
            packages[i].semver1_is_latest = false;
            packages[i].semver1_is_absolute_latest = false;
            packages[i].semver2_is_latest = false;
            packages[i].semver2_is_absolute_latest = false;
        }

        if let Some(&(absolute_idx, _)) = parsed.iter().rev().find(|(i, _)| packages[*i].listed) {
            packages[absolute_idx].semver2_is_absolute_latest = true;
        }
        if let Some(&(latest_idx, _)) = parsed.iter().rev().find(|(i, _)| packages[*i].listed) {
            packages[latest_idx].semver2_is_latest = true;
        }

        let semver1_only: Vec<(usize, PackageVersion)> = parsed
            .iter()
            .filter(|(i, _)| !packages[*i].is_semver2)
            .cloned()
            .collect();
        if let Some(&(absolute_idx, _)) = semver1_only.iter().rev().find(|(i, _)| packages[*i].listed) {
            packages[absolute_idx].semver1_is_absolute_latest = true;
        }
        if let Some(&(latest_idx, _)) = semver1_only.iter().rev().find(|(i, _)| packages[*i].listed) {
            packages[latest_idx].semver1_is_latest = true;
        }
    }
}

/// Evaluate one `GetUpdates` query against a snapshot: packages sharing the
/// query's id, newer than the query's version, satisfying the optional
/// version constraint and compatibility filter, and including prereleases
/// only if asked.
#[must_use]
pub fn find_updates<'a>(
    packages: &[&'a ServerPackage],
    query: &UpdateQuery,
    include_prerelease: bool,
    compatibility: Compatibility,
) -> Vec<&'a ServerPackage> {
    packages
        .iter()
        .filter(|p| p.id_eq(&query.id))
        .filter(|p| compatibility.allows(p.is_semver2))
        .filter_map(|p| p.parsed_version().ok().map(|v| (*p, v)))
        .filter(|(_, v)| *v > query.version)
        .filter(|(_, v)| include_prerelease || !v.is_prerelease())
        .filter(|(_, v)| match &query.version_constraint {
            Some(range) => range.satisfies(v),
            None => true,
        })
        .map(|(p, _)| p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HashAlgorithm;
    use chrono::Utc;
    use std::path::PathBuf;

    fn pkg(id: &str, version: &str, is_semver2: bool, listed: bool) -> ServerPackage {
        ServerPackage {
            id: id.to_string(),
            version: version.to_string(),
            version_normalized: version.to_string(),
            is_semver2,
            full_path: PathBuf::new(),
            package_size: 0,
            package_hash: String::new(),
            hash_algorithm: HashAlgorithm::Sha256,
            listed,
            created_utc: Utc::now(),
            last_updated_utc: Utc::now(),
            supported_target_frameworks: Vec::new(),
            dependency_sets: Vec::new(),
            min_client_version: None,
            authors: None,
            description: Some("a helpful test package".to_string()),
            title: None,
            tags: vec!["networking".to_string()],
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
    fn tokenized_match_requires_every_token() {
        let p = pkg("Demo", "1.0.0", false, true);
        assert!(tokenized_match(&p, "demo helpful"));
        assert!(tokenized_match(&p, "networking"));
        assert!(!tokenized_match(&p, "demo absent"));
        assert!(tokenized_match(&p, ""));
    }

    #[test]
    fn filter_semver2_respects_compatibility() {
        let packages = vec![pkg("A", "1.0.0", false, true), pkg("B", "1.0.0-x.1", true, true)];
        let default_only = filter_semver2(&packages, Compatibility::Default);
        assert_eq!(default_only.len(), 1);
        assert_eq!(filter_semver2(&packages, Compatibility::Max).len(), 2);
    }

    #[test]
    fn latest_flags_pick_highest_listed_and_ignore_delisted_for_absolute_latest_too() {
        let mut packages = vec![
            pkg("Demo", "1.0.0", false, true),
            pkg("Demo", "2.0.0", false, false),
            pkg("Demo", "1.5.0", false, true),
        ];
        latest_flags(&mut packages);
        assert!(packages[2].semver1_is_latest); // 1.5.0, highest listed
        assert!(packages[2].semver1_is_absolute_latest); // 1.5.0, highest listed overall too
        assert!(!packages[1].semver1_is_latest); // unlisted, excluded from "latest"
        assert!(!packages[1].semver1_is_absolute_latest); // unlisted, excluded from "absolute latest" too
    }

    #[test]
    fn find_updates_filters_by_version_and_constraint() {
        let packages = vec![
            pkg("Demo", "1.0.0", false, true),
            pkg("Demo", "1.5.0", false, true),
            pkg("Demo", "2.0.0", false, true),
        ];
        let refs: Vec<&ServerPackage> = packages.iter().collect();
        let query = UpdateQuery {
            id: "Demo".to_string(),
            version: PackageVersion::parse("1.0.0").unwrap(),
            version_constraint: Some(crate::types::VersionRange::parse("[1.0.0, 2.0.0)").unwrap()),
        };
        let updates = find_updates(&refs, &query, false, Compatibility::Default);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].version, "1.5.0");
    }
}
