//! # feed-core
//!
//! Core functionality for a self-hosted package feed server: a concurrent,
//! self-healing package repository engine backed by a filesystem directory.
//!
//! This crate provides the foundational components for pushing, indexing,
//! querying, and delisting package archives stored as a flat directory tree
//! plus a JSON metadata cache. It's designed to tolerate the cache file
//! being deleted or corrupted at any time (a rebuild from disk recovers it)
//! and to coexist with an operator dropping archive files directly into the
//! root out-of-band.
//!
//! ## Architecture
//!
//! The crate is organized around six components:
//!
//! - **Filesystem abstraction** (`fs`): root-scoped file operations, real or
//!   in-memory
//! - **Archive reader** (`archive`): opens a package archive and extracts
//!   its manifest
//! - **On-disk layout** (`layout`): maps `(id, version)` to canonical paths
//! - **Metadata cache** (`cache`): an indexed, persisted snapshot of every
//!   package record
//! - **Repository engine** (`repository`): the concurrency-safe façade tying
//!   the above together, plus background rebuild/persist/watch tasks
//! - **Query surface** (`query`): pure functions implementing search,
//!   filtering, and the "latest version" flags
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use feed_core::{Repository, RepositoryOptions, LocalFileSystem, Compatibility};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> feed_core::Result<()> {
//! let fs = LocalFileSystem::new("/var/lib/feed")?;
//! let options = RepositoryOptions::builder("/var/lib/feed");
//! let repo = Arc::new(Repository::new(fs, options)?);
//! repo.spawn_background_tasks();
//!
//! let token = CancellationToken::new();
//! let packages = repo.get_packages(Compatibility::Default, &token).await?;
//! println!("{} packages indexed", packages.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with structured error information:
//!
//! ```rust
//! use feed_core::Error;
//!
//! fn handle(err: Error) {
//!     match err {
//!         Error::NotFound(_) => eprintln!("no such package"),
//!         e if e.is_recoverable() => eprintln!("transient error: {e}"),
//!         e => eprintln!("fatal error: {e}"),
//!     }
//! }
//! ```

/// Opens package archives and extracts manifest metadata
pub mod archive;
/// In-memory metadata cache with JSON persistence
pub mod cache;
/// Repository configuration
pub mod config;
/// Error types and result alias
pub mod error;
/// Root-scoped filesystem abstraction
pub mod fs;
/// On-disk package layout
pub mod layout;
/// Pure query/search/filter functions over a package snapshot
pub mod query;
/// The repository engine
pub mod repository;
/// Core data types and structures
pub mod types;
/// A totally-ordered package version type
pub mod version;
/// Filesystem watcher bridging `notify` into the async engine
pub mod watcher;

pub use archive::PackageArchive;
pub use cache::MetadataCache;
pub use config::RepositoryOptions;
pub use error::{Error, Result};
pub use fs::{DirEntry, FileSystem, LocalFileSystem, MemoryFileSystem};
pub use layout::{PackageLayout, PackagePaths};
pub use repository::Repository;
pub use types::*;
pub use version::PackageVersion;
pub use watcher::{ChangeEvent, DirectoryWatcher};
