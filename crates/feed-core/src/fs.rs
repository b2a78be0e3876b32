//! Root-scoped filesystem abstraction (component A).
//!
//! Every method takes a path relative to the abstraction's root and
//! refuses to resolve outside of it. This is what lets the rest of the
//! engine (layout, cache, watcher) be tested against an in-memory double
//! instead of real disk, the same way the teacher crate's `Storage` is
//! tested purely against `tempfile::TempDir` roots but without ever
//! reaching outside them.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// A directory entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Path relative to the filesystem root.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Root-scoped file operations.
///
/// All paths passed to these methods are relative to the root; escaping the
/// root (via `..` components or an absolute path) returns
/// [`Error::InvalidArgument`].
pub trait FileSystem: Send + Sync {
    /// The absolute root directory this filesystem is scoped to.
    fn root(&self) -> &Path;

    /// Resolve a root-relative path to an absolute one, rejecting any path
    /// that would escape the root.
    fn resolve(&self, rel: &Path) -> Result<PathBuf> {
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "path '{}' escapes the repository root",
                        rel.display()
                    )));
                }
            }
        }
        Ok(self.root().join(rel))
    }

    /// Whether a file or directory exists at `rel`.
    fn exists(&self, rel: &Path) -> bool;

    /// Read the full contents of a file.
    fn read(&self, rel: &Path) -> Result<Vec<u8>>;

    /// Write `contents` to `rel`, replacing any existing file. Creates
    /// parent directories as needed.
    fn write(&self, rel: &Path, contents: &[u8]) -> Result<()>;

    /// Rename/move a file or directory, replacing any existing entry at
    /// `to`.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove a single file.
    fn remove_file(&self, rel: &Path) -> Result<()>;

    /// Remove a directory and everything under it.
    fn remove_dir_all(&self, rel: &Path) -> Result<()>;

    /// Ensure a directory (and its parents) exists.
    fn create_dir_all(&self, rel: &Path) -> Result<()>;

    /// List entries directly under `rel`. Non-recursive.
    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>>;

    /// List every file under `rel`, recursively.
    fn walk(&self, rel: &Path) -> Result<Vec<PathBuf>>;

    /// Size of the file at `rel`, in bytes.
    fn len(&self, rel: &Path) -> Result<u64>;

    /// Creation time of the file at `rel`.
    fn created_at(&self, rel: &Path) -> Result<DateTime<Utc>>;

    /// Whether `rel` is flagged hidden (used for delisting).
    fn is_hidden(&self, rel: &Path) -> Result<bool>;

    /// Flip the hidden flag on `rel`.
    fn set_hidden(&self, rel: &Path, hidden: bool) -> Result<()>;
}

fn hidden_marker(rel: &Path) -> PathBuf {
    let mut name = rel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".hidden");
    rel.with_file_name(name)
}

/// A real-disk implementation of [`FileSystem`], rooted at a canonicalized
/// directory.
///
/// "Hidden" is tracked with a sidecar marker file (`<name>.hidden`) rather
/// than a platform attribute bit, since Unix has no native hidden-file
/// attribute and this keeps delisting behavior identical across platforms.
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Open (creating if necessary) a filesystem rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `root` cannot be created or canonicalized.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }
}

impl FileSystem for LocalFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, rel: &Path) -> bool {
        self.resolve(rel).map(|p| p.exists()).unwrap_or(false)
    }

    fn read(&self, rel: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.resolve(rel)?)?)
    }

    fn write(&self, rel: &Path, contents: &[u8]) -> Result<()> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        std::fs::write(&tmp, contents)?;
        #[cfg(target_os = "windows")]
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        #[cfg(target_os = "windows")]
        if to.exists() {
            std::fs::remove_file(&to)?;
        }
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn remove_file(&self, rel: &Path) -> Result<()> {
        let path = self.resolve(rel)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn remove_dir_all(&self, rel: &Path) -> Result<()> {
        let path = self.resolve(rel)?;
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn create_dir_all(&self, rel: &Path) -> Result<()> {
        Ok(std::fs::create_dir_all(self.resolve(rel)?)?)
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>> {
        let path = self.resolve(rel)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".hidden") {
                continue;
            }
            entries.push(DirEntry {
                path: rel.join(entry.file_name()),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(entries)
    }

    fn walk(&self, rel: &Path) -> Result<Vec<PathBuf>> {
        fn walk_inner(fs: &LocalFileSystem, rel: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
            for entry in fs.read_dir(rel)? {
                if entry.is_dir {
                    walk_inner(fs, &entry.path, out)?;
                } else {
                    out.push(entry.path);
                }
            }
            Ok(())
        }
        let mut out = Vec::new();
        walk_inner(self, rel, &mut out)?;
        Ok(out)
    }

    fn len(&self, rel: &Path) -> Result<u64> {
        Ok(std::fs::metadata(self.resolve(rel)?)?.len())
    }

    fn created_at(&self, rel: &Path) -> Result<DateTime<Utc>> {
        let meta = std::fs::metadata(self.resolve(rel)?)?;
        let created = meta.created().or_else(|_| meta.modified())?;
        Ok(system_time_to_utc(created))
    }

    fn is_hidden(&self, rel: &Path) -> Result<bool> {
        Ok(self.exists(&hidden_marker(rel)))
    }

    fn set_hidden(&self, rel: &Path, hidden: bool) -> Result<()> {
        let marker = hidden_marker(rel);
        if hidden {
            self.write(&marker, b"")
        } else {
            self.remove_file(&marker)
        }
    }
}

fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// An in-memory [`FileSystem`] double, used by unit and integration tests
/// that need deterministic, fast filesystem behavior without touching
/// disk.
#[derive(Default)]
pub struct MemoryFileSystem {
    root: PathBuf,
    files: Mutex<HashMap<PathBuf, (Vec<u8>, DateTime<Utc>)>>,
    hidden: Mutex<HashMap<PathBuf, bool>>,
}

impl MemoryFileSystem {
    /// Create an empty in-memory filesystem. `root` is cosmetic — it is
    /// never touched on disk — but `full_path` fields on derived
    /// `ServerPackage` records still report paths under it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashMap::new()),
            hidden: Mutex::new(HashMap::new()),
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, rel: &Path) -> bool {
        let rel = match self.resolve(rel) {
            Ok(p) => p.strip_prefix(&self.root).unwrap_or(&p).to_path_buf(),
            Err(_) => return false,
        };
        self.files.lock().unwrap().contains_key(&rel)
    }

    fn read(&self, rel: &Path) -> Result<Vec<u8>> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.files
            .lock()
            .unwrap()
            .get(&key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")))
    }

    fn write(&self, rel: &Path, contents: &[u8]) -> Result<()> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.files
            .lock()
            .unwrap()
            .insert(key, (contents.to_vec(), Utc::now()));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_key = self.resolve(from)?.strip_prefix(&self.root).unwrap().to_path_buf();
        let to_key = self.resolve(to)?.strip_prefix(&self.root).unwrap().to_path_buf();
        let mut files = self.files.lock().unwrap();
        if let Some(entry) = files.remove(&from_key) {
            files.insert(to_key, entry);
        }
        Ok(())
    }

    fn remove_file(&self, rel: &Path) -> Result<()> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.files.lock().unwrap().remove(&key);
        Ok(())
    }

    fn remove_dir_all(&self, rel: &Path) -> Result<()> {
        let prefix = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.files.lock().unwrap().retain(|k, _| !k.starts_with(&prefix));
        self.hidden.lock().unwrap().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    fn create_dir_all(&self, _rel: &Path) -> Result<()> {
        Ok(())
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>> {
        let prefix = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        let files = self.files.lock().unwrap();
        let mut seen = std::collections::BTreeMap::new();
        for key in files.keys() {
            if let Ok(suffix) = key.strip_prefix(&prefix) {
                let mut components = suffix.components();
                if let Some(first) = components.next() {
                    let is_dir = components.next().is_some();
                    seen.insert(first.as_os_str().to_owned(), is_dir);
                }
            }
        }
        Ok(seen
            .into_iter()
            .filter(|(name, _)| !name.to_string_lossy().ends_with(".hidden"))
            .map(|(name, is_dir)| DirEntry {
                path: rel.join(name),
                is_dir,
            })
            .collect())
    }

    fn walk(&self, rel: &Path) -> Result<Vec<PathBuf>> {
        let prefix = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        let files = self.files.lock().unwrap();
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k.to_string_lossy().ends_with(".hidden"))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }

    fn len(&self, rel: &Path) -> Result<u64> {
        Ok(self.read(rel)?.len() as u64)
    }

    fn created_at(&self, rel: &Path) -> Result<DateTime<Utc>> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.files
            .lock()
            .unwrap()
            .get(&key)
            .map(|(_, t)| *t)
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")))
    }

    fn is_hidden(&self, rel: &Path) -> Result<bool> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        Ok(self.hidden.lock().unwrap().get(&key).copied().unwrap_or(false))
    }

    fn set_hidden(&self, rel: &Path, hidden: bool) -> Result<()> {
        let key = self.resolve(rel)?.strip_prefix(&self.root).unwrap().to_path_buf();
        self.hidden.lock().unwrap().insert(key, hidden);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn local_fs_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        assert!(fs.resolve(Path::new("../escape")).is_err());
        assert!(fs.resolve(Path::new("ok/../also_ok")).is_ok());
    }

    #[test]
    fn local_fs_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.write(Path::new("a/b.txt"), b"hello").unwrap();
        assert_eq!(fs.read(Path::new("a/b.txt")).unwrap(), b"hello");
        assert!(fs.exists(Path::new("a/b.txt")));
    }

    #[test]
    fn local_fs_hidden_flag_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.write(Path::new("pkg.nupkg"), b"x").unwrap();
        assert!(!fs.is_hidden(Path::new("pkg.nupkg")).unwrap());
        fs.set_hidden(Path::new("pkg.nupkg"), true).unwrap();
        assert!(fs.is_hidden(Path::new("pkg.nupkg")).unwrap());
        fs.set_hidden(Path::new("pkg.nupkg"), false).unwrap();
        assert!(!fs.is_hidden(Path::new("pkg.nupkg")).unwrap());
    }

    #[test]
    fn memory_fs_roundtrip() {
        let fs = MemoryFileSystem::new("/virtual");
        fs.write(Path::new("a/b.txt"), b"hi").unwrap();
        assert!(fs.exists(Path::new("a/b.txt")));
        assert_eq!(fs.read(Path::new("a/b.txt")).unwrap(), b"hi");
        fs.remove_file(Path::new("a/b.txt")).unwrap();
        assert!(!fs.exists(Path::new("a/b.txt")));
    }

    #[test]
    fn memory_fs_read_dir_lists_direct_children() {
        let fs = MemoryFileSystem::new("/virtual");
        fs.write(Path::new("id/1.0.0/id.1.0.0.nupkg"), b"x").unwrap();
        fs.write(Path::new("id/1.0.0/id.1.0.0.nupkg.sha512"), b"y").unwrap();
        let entries = fs.read_dir(Path::new("id")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
    }
}
