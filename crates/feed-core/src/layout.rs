//! On-disk package layout (component C).
//!
//! Owns the canonical directory shape and is the only module that turns a
//! `(id, version)` pair into a path. Grounded on the teacher's `Storage`:
//! same atomic-write-then-rename discipline, same alias validation before a
//! path is ever built from caller-supplied input.

use std::path::{Path, PathBuf};

use crate::archive::PackageArchive;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::types::{HashAlgorithm, Manifest, PackageVersion};

const NUPKG_EXTENSION: &str = "nupkg";
const HASH_EXTENSION: &str = "sha512";
const MANIFEST_EXTENSION: &str = "nuspec";

#[cfg(target_os = "windows")]
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reject an id or version segment that cannot safely become a path
/// component: empty, too long, containing a path separator or NUL byte, a
/// leading `.` or `-`, or (on Windows) a reserved device name.
fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} must not be empty")));
    }
    if value.len() > 256 {
        return Err(Error::InvalidArgument(format!("{kind} '{value}' is too long")));
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') || value.contains("..")
    {
        return Err(Error::InvalidArgument(format!(
            "{kind} '{value}' contains an invalid character sequence"
        )));
    }
    if value.starts_with('.') || value.starts_with('-') {
        return Err(Error::InvalidArgument(format!(
            "{kind} '{value}' must not start with '.' or '-'"
        )));
    }
    #[cfg(target_os = "windows")]
    {
        let upper = value.to_ascii_uppercase();
        let stem = upper.split('.').next().unwrap_or(&upper);
        if RESERVED_NAMES.contains(&stem) {
            return Err(Error::InvalidArgument(format!(
                "{kind} '{value}' is a reserved name"
            )));
        }
    }
    Ok(())
}

/// A set of paths within the layout for a single `(id, version)` entry.
#[derive(Debug, Clone)]
pub struct PackagePaths {
    pub dir: PathBuf,
    pub package_file: PathBuf,
    pub hash_file: PathBuf,
    pub manifest_file: PathBuf,
}

/// Maps `(id, version)` to canonical on-disk paths and performs the atomic
/// file operations needed to add or remove an entry.
///
/// Canonical shape: `<id-lower>/<normalized-version>/<id>.<normalized-version>.<ext>`,
/// with a `.sha512` hash sidecar and an extracted `.nuspec` manifest next to
/// the archive.
pub struct PackageLayout<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> PackageLayout<F> {
    /// Wrap a filesystem as a package layout.
    #[must_use]
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Borrow the underlying filesystem (used by the cache to locate its
    /// own file alongside the package tree).
    #[must_use]
    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// Compute the canonical paths for an `(id, version)` pair without
    /// touching disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id` or `version_normalized`
    /// cannot safely become a path component.
    pub fn paths_for(&self, id: &str, version_normalized: &str) -> Result<PackagePaths> {
        validate_segment("package id", id)?;
        validate_segment("normalized version", version_normalized)?;

        let dir = PathBuf::from(id.to_lowercase()).join(version_normalized);
        let file_stem = format!("{}.{}", id.to_lowercase(), version_normalized);
        Ok(PackagePaths {
            package_file: dir.join(format!("{file_stem}.{NUPKG_EXTENSION}")),
            hash_file: dir.join(format!("{file_stem}.{NUPKG_EXTENSION}.{HASH_EXTENSION}")),
            manifest_file: dir.join(format!("{file_stem}.{MANIFEST_EXTENSION}")),
            dir,
        })
    }

    /// Whether an entry already exists at the canonical path for `(id,
    /// version)`.
    #[must_use]
    pub fn exists(&self, id: &str, version_normalized: &str) -> bool {
        match self.paths_for(id, version_normalized) {
            Ok(paths) => self.fs.exists(&paths.package_file),
            Err(_) => false,
        }
    }

    /// Write an archive's package file, hash sidecar, and extracted
    /// manifest to their canonical paths.
    ///
    /// Overwrite semantics are the caller's responsibility (the repository
    /// engine checks `exists` first per the `AlreadyExists` invariant); this
    /// method always writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Layout`] if path computation fails, or [`Error::Io`]
    /// if the underlying writes fail.
    pub fn add(
        &self,
        version_normalized: &str,
        archive: &PackageArchive,
        hash_algorithm: HashAlgorithm,
    ) -> Result<PackagePaths> {
        let manifest = archive.manifest();
        let paths = self
            .paths_for(&manifest.id, version_normalized)
            .map_err(|e| Error::Layout(e.to_string()))?;

        self.fs.create_dir_all(&paths.dir)?;
        self.fs.write(&paths.package_file, archive.content_bytes())?;
        self.fs
            .write(&paths.hash_file, archive.hash(hash_algorithm).as_bytes())?;
        self.fs
            .write(&paths.manifest_file, manifest_to_xml(manifest).as_bytes())?;
        Ok(paths)
    }

    /// Remove the directory holding an `(id, version)` entry and everything
    /// under it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the removal fails.
    pub fn remove(&self, id: &str, version_normalized: &str) -> Result<()> {
        let paths = self
            .paths_for(id, version_normalized)
            .map_err(|e| Error::Layout(e.to_string()))?;
        self.fs.remove_dir_all(&paths.dir)
    }

    /// Read back the stored hash sidecar for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the sidecar cannot be read.
    pub fn read_hash(&self, id: &str, version_normalized: &str) -> Result<String> {
        let paths = self
            .paths_for(id, version_normalized)
            .map_err(|e| Error::Layout(e.to_string()))?;
        let bytes = self.fs.read(&paths.hash_file)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whether `(id, version)` is flagged hidden (delisted).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying check fails.
    pub fn is_hidden(&self, id: &str, version_normalized: &str) -> Result<bool> {
        let paths = self
            .paths_for(id, version_normalized)
            .map_err(|e| Error::Layout(e.to_string()))?;
        self.fs.is_hidden(&paths.package_file)
    }

    /// Flip the hidden (delisted) flag for an `(id, version)` entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying operation fails.
    pub fn set_hidden(&self, id: &str, version_normalized: &str, hidden: bool) -> Result<()> {
        let paths = self
            .paths_for(id, version_normalized)
            .map_err(|e| Error::Layout(e.to_string()))?;
        self.fs.set_hidden(&paths.package_file, hidden)
    }

    /// Enumerate every package archive under the layout root, as relative
    /// paths to `.nupkg` files. Used by a rebuild to discover entries that
    /// were dropped in by hand rather than through `add`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the walk fails.
    pub fn walk_packages(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .fs
            .walk(Path::new(""))?
            .into_iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(NUPKG_EXTENSION))
            })
            .collect())
    }

    /// Compute the filesystem-observed facts a rebuild needs: size,
    /// creation time, and hidden state for an already-written package file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be inspected.
    pub fn observe(
        &self,
        package_file: &Path,
    ) -> Result<(u64, chrono::DateTime<chrono::Utc>, bool)> {
        Ok((
            self.fs.len(package_file)?,
            self.fs.created_at(package_file)?,
            self.fs.is_hidden(package_file)?,
        ))
    }
}

/// Re-serialize a manifest as the minimal `.nuspec` XML document the layout
/// extracts alongside an archive. This is a write-back projection, not a
/// faithful copy of the original archive's manifest bytes: comments and
/// unrecognized elements in the source manifest are not preserved.
fn manifest_to_xml(manifest: &Manifest) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<package>\n  <metadata>\n");
    out.push_str(&format!("    <id>{}</id>\n", xml_escape(&manifest.id)));
    out.push_str(&format!("    <version>{}</version>\n", xml_escape(&manifest.version)));
    if let Some(v) = &manifest.min_client_version {
        out.push_str(&format!("    <minClientVersion>{}</minClientVersion>\n", xml_escape(v)));
    }
    if let Some(v) = &manifest.authors {
        out.push_str(&format!("    <authors>{}</authors>\n", xml_escape(v)));
    }
    if let Some(v) = &manifest.description {
        out.push_str(&format!("    <description>{}</description>\n", xml_escape(v)));
    }
    if !manifest.tags.is_empty() {
        out.push_str(&format!(
            "    <tags>{}</tags>\n",
            xml_escape(&manifest.tags.join(" "))
        ));
    }
    out.push_str("  </metadata>\n</package>\n");
    out
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn test_archive(id: &str, version: &str) -> PackageArchive {
        let nuspec = format!(
            "<?xml version=\"1.0\"?><package><metadata><id>{id}</id><version>{version}</version></metadata></package>"
        );
        let mut buf = Vec::new();
        {
            use std::io::Write as _;
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::FileOptions::default();
            writer.start_file("pkg.nuspec", options).unwrap();
            writer.write_all(nuspec.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        PackageArchive::from_bytes(buf).unwrap()
    }

    #[test]
    fn paths_are_lowercased_and_normalized() {
        let layout = PackageLayout::new(MemoryFileSystem::new("/virtual"));
        let paths = layout.paths_for("My.Package", "1.2.3").unwrap();
        assert_eq!(paths.package_file, PathBuf::from("my.package/1.2.3/my.package.1.2.3.nupkg"));
    }

    #[test]
    fn rejects_path_traversal_in_id() {
        let layout = PackageLayout::new(MemoryFileSystem::new("/virtual"));
        assert!(layout.paths_for("../escape", "1.0.0").is_err());
        assert!(layout.paths_for("ok", "../1.0.0").is_err());
    }

    #[test]
    fn add_then_exists_then_remove_round_trips() {
        let layout = PackageLayout::new(MemoryFileSystem::new("/virtual"));
        let archive = test_archive("Demo", "1.0.0");
        layout.add("1.0.0", &archive, HashAlgorithm::Sha256).unwrap();
        assert!(layout.exists("Demo", "1.0.0"));
        layout.remove("Demo", "1.0.0").unwrap();
        assert!(!layout.exists("Demo", "1.0.0"));
    }

    #[test]
    fn hidden_flag_round_trips_through_layout() {
        let layout = PackageLayout::new(MemoryFileSystem::new("/virtual"));
        let archive = test_archive("Demo", "1.0.0");
        layout.add("1.0.0", &archive, HashAlgorithm::Sha256).unwrap();
        assert!(!layout.is_hidden("Demo", "1.0.0").unwrap());
        layout.set_hidden("Demo", "1.0.0", true).unwrap();
        assert!(layout.is_hidden("Demo", "1.0.0").unwrap());
    }

    #[test]
    fn walk_packages_finds_nupkg_files_only() {
        let layout = PackageLayout::new(MemoryFileSystem::new("/virtual"));
        let archive = test_archive("Demo", "1.0.0");
        layout.add("1.0.0", &archive, HashAlgorithm::Sha256).unwrap();
        let found = layout.walk_packages().unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].to_string_lossy().ends_with(".nupkg"));
    }
}
