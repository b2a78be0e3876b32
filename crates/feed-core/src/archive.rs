//! Archive reader (component B): surfaces manifest metadata, a content
//! stream, and a content hash for a single package archive.
//!
//! This is a pure collaborator — it knows nothing about the on-disk layout
//! or the cache. It is grounded on the `zip` crate the way `uv` (the
//! closest example in this codebase's retrieval pack to "read a wheel's
//! metadata out of a zip") depends on `zip` for the same purpose.

use std::io::Read;
use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use sha2::{Digest as Sha2Digest, Sha256, Sha512};

use crate::error::{Error, Result};
use crate::types::{Dependency, DependencyGroup, HashAlgorithm, Manifest, TargetFramework, VersionRange};

/// Reserved file extension used to detect a symbols archive.
const SYMBOLS_MARKER_EXTENSION: &str = "pdb";

/// Manifest file name inside an archive, relative to the archive root.
const MANIFEST_EXTENSION: &str = "nuspec";

/// An opened package archive: manifest metadata plus access to the raw
/// archive bytes for content hashing or re-serving.
pub struct PackageArchive {
    manifest: Manifest,
    bytes: Vec<u8>,
}

impl PackageArchive {
    /// Open an archive from an in-memory byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] if the buffer is not a valid zip archive,
    /// if it contains no `.nuspec` manifest, or if the manifest cannot be
    /// parsed.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let manifest = Self::read_manifest(&bytes)?;
        Ok(Self { manifest, bytes })
    }

    /// Open an archive from a path on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or the archive
    /// errors documented on [`Self::from_bytes`].
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    fn read_manifest(bytes: &[u8]) -> Result<Manifest> {
        let cursor = std::io::Cursor::new(bytes);
        let mut zip = zip::ZipArchive::new(cursor)?;

        let mut is_symbols = false;
        let mut manifest_xml: Option<String> = None;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let name = entry.name().to_string();
            let extension = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            if extension.eq_ignore_ascii_case(SYMBOLS_MARKER_EXTENSION) {
                is_symbols = true;
            }
            if extension.eq_ignore_ascii_case(MANIFEST_EXTENSION) && manifest_xml.is_none() {
                let mut xml = String::new();
                entry.read_to_string(&mut xml).map_err(|e| {
                    Error::Archive(format!("failed to read manifest '{name}': {e}"))
                })?;
                manifest_xml = Some(xml);
            }
        }

        let xml = manifest_xml
            .ok_or_else(|| Error::Archive("archive contains no .nuspec manifest".into()))?;
        let mut manifest = parse_manifest(&xml)?;
        manifest.is_symbols = is_symbols;
        Ok(manifest)
    }

    /// The parsed manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The raw archive bytes, for re-writing to the on-disk layout or
    /// streaming back to a caller.
    #[must_use]
    pub fn content_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Compute the content digest of the raw archive bytes, base64-encoded.
    #[must_use]
    pub fn hash(&self, algorithm: HashAlgorithm) -> String {
        match algorithm {
            HashAlgorithm::Sha256 => {
                let digest = Sha256::digest(&self.bytes);
                base64::engine::general_purpose::STANDARD.encode(digest)
            }
            HashAlgorithm::Sha512 => {
                let digest = Sha512::digest(&self.bytes);
                base64::engine::general_purpose::STANDARD.encode(digest)
            }
        }
    }
}

// --- manifest (.nuspec) XML shape -----------------------------------------

#[derive(Debug, Deserialize)]
struct NuspecDocument {
    metadata: NuspecMetadata,
}

#[derive(Debug, Deserialize)]
struct NuspecMetadata {
    id: String,
    version: String,
    #[serde(rename = "minClientVersion")]
    min_client_version: Option<String>,
    authors: Option<String>,
    description: Option<String>,
    title: Option<String>,
    tags: Option<String>,
    #[serde(rename = "projectUrl")]
    project_url: Option<String>,
    #[serde(rename = "licenseUrl")]
    license_url: Option<String>,
    #[serde(rename = "iconUrl")]
    icon_url: Option<String>,
    #[serde(rename = "requireLicenseAcceptance", default)]
    require_license_acceptance: bool,
    #[serde(rename = "developmentDependency", default)]
    development_dependency: bool,
    #[serde(rename = "releaseNotes")]
    release_notes: Option<String>,
    copyright: Option<String>,
    summary: Option<String>,
    dependencies: Option<NuspecDependencies>,
}

#[derive(Debug, Deserialize)]
struct NuspecDependencies {
    #[serde(rename = "group", default)]
    groups: Vec<NuspecGroup>,
    #[serde(rename = "dependency", default)]
    flat: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecGroup {
    #[serde(rename = "targetFramework")]
    target_framework: Option<String>,
    #[serde(rename = "dependency", default)]
    dependencies: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecDependency {
    id: String,
    version: Option<String>,
}

fn parse_manifest(xml: &str) -> Result<Manifest> {
    let doc: NuspecDocument = quick_xml::de::from_str(xml)?;
    let metadata = doc.metadata;

    let tags = metadata
        .tags
        .map(|t| t.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let mut dependency_sets = Vec::new();
    if let Some(deps) = metadata.dependencies {
        if !deps.flat.is_empty() {
            dependency_sets.push(DependencyGroup {
                target_framework: None,
                dependencies: to_dependencies(&deps.flat)?,
            });
        }
        for group in deps.groups {
            dependency_sets.push(DependencyGroup {
                target_framework: group.target_framework.map(TargetFramework),
                dependencies: to_dependencies(&group.dependencies)?,
            });
        }
    }

    // `supported_target_frameworks` is derived from every dependency
    // group's target framework; archives with no dependency groups are
    // assumed to support any framework (an empty set, left for the layout
    // to populate from directory conventions if the archive also ships a
    // `lib/<tfm>/` folder listing — out of scope for manifest parsing).
    let supported_target_frameworks = dependency_sets
        .iter()
        .filter_map(|g| g.target_framework.clone())
        .collect();

    Ok(Manifest {
        id: metadata.id,
        version: metadata.version,
        supported_target_frameworks,
        dependency_sets,
        is_symbols: false,
        min_client_version: metadata.min_client_version,
        authors: metadata.authors,
        description: metadata.description,
        title: metadata.title,
        tags,
        project_url: metadata.project_url,
        license_url: metadata.license_url,
        icon_url: metadata.icon_url,
        require_license_acceptance: metadata.require_license_acceptance,
        development_dependency: metadata.development_dependency,
        release_notes: metadata.release_notes,
        copyright: metadata.copyright,
        summary: metadata.summary,
    })
}

fn to_dependencies(raw: &[NuspecDependency]) -> Result<Vec<Dependency>> {
    raw.iter()
        .map(|d| {
            let range = match &d.version {
                Some(v) => VersionRange::parse(v)?,
                None => VersionRange::parse("0.0.0")?,
            };
            Ok(Dependency {
                id: d.id.clone(),
                version_range: range,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_test_archive(nuspec: &str, extra_entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default();
            writer.start_file("package.nuspec", options).unwrap();
            writer.write_all(nuspec.as_bytes()).unwrap();
            for (name, data) in extra_entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    const SIMPLE_NUSPEC: &str = r#"<?xml version="1.0"?>
<package>
  <metadata>
    <id>Test.Package</id>
    <version>1.2.3</version>
    <authors>Someone</authors>
    <description>A test package</description>
    <tags>a b c</tags>
    <dependencies>
      <group targetFramework="net6.0">
        <dependency id="Other.Package" version="[1.0.0, 2.0.0)" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    #[test]
    fn parses_manifest_fields_and_dependency_groups() {
        let bytes = build_test_archive(SIMPLE_NUSPEC, &[]);
        let archive = PackageArchive::from_bytes(bytes).unwrap();
        let manifest = archive.manifest();
        assert_eq!(manifest.id, "Test.Package");
        assert_eq!(manifest.version, "1.2.3");
        assert_eq!(manifest.tags, vec!["a", "b", "c"]);
        assert_eq!(manifest.dependency_sets.len(), 1);
        assert_eq!(manifest.dependency_sets[0].dependencies[0].id, "Other.Package");
        assert!(!manifest.is_symbols);
    }

    #[test]
    fn detects_symbols_archive_by_pdb_entry() {
        let bytes = build_test_archive(SIMPLE_NUSPEC, &[("lib/net6.0/test.pdb", b"pdb-bytes")]);
        let archive = PackageArchive::from_bytes(bytes).unwrap();
        assert!(archive.manifest().is_symbols);
    }

    #[test]
    fn missing_manifest_is_an_archive_error() {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"no manifest here").unwrap();
            writer.finish().unwrap();
        }
        assert!(PackageArchive::from_bytes(buf).is_err());
    }

    #[test]
    fn hash_is_stable_for_identical_bytes() {
        let bytes = build_test_archive(SIMPLE_NUSPEC, &[]);
        let a = PackageArchive::from_bytes(bytes.clone()).unwrap();
        let b = PackageArchive::from_bytes(bytes).unwrap();
        assert_eq!(a.hash(HashAlgorithm::Sha256), b.hash(HashAlgorithm::Sha256));
    }
}
