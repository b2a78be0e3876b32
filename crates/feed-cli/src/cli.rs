//! CLI argument definitions for `feed-admin`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Administer a self-hosted package feed server's repository directory.
#[derive(Parser, Debug)]
#[command(name = "feed-admin", version, about)]
pub struct Cli {
    /// Root directory the repository is stored under.
    #[arg(long, env = "FEED_ROOT")]
    pub root: PathBuf,

    /// Enable debug-level logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Suppress all but error-level logging.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands supported by `feed-admin`.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push a package archive into the repository.
    Push {
        /// Path to the `.nupkg` archive to push.
        archive: PathBuf,
    },
    /// List packages, optionally filtered by id.
    List {
        /// Only list versions of this package id.
        #[arg(long)]
        id: Option<String>,
    },
    /// Free-text search across package metadata.
    Search {
        /// Search term, matched against id/title/description/tags/authors.
        term: String,
        /// Include prerelease versions in results.
        #[arg(long)]
        allow_prerelease: bool,
    },
    /// Remove a package (delete, or delist if delisting is enabled).
    Delete {
        /// Package id.
        id: String,
        /// Package version.
        version: String,
    },
    /// Force an immediate rebuild of the metadata cache from disk.
    Rebuild,
    /// Scan the repository root for loose archives and ingest them.
    Drop,
}
