//! Error types and handling for the package repository engine.
//!
//! This module provides a single error type that covers every failure mode
//! surfaced by `feed-core`: filesystem I/O, archive parsing, cache
//! corruption, and invariant violations during a rebuild. Errors are
//! categorized so that callers (the CLI front door, or an external HTTP
//! layer) can map them onto wire-level responses without matching on
//! message text.

use thiserror::Error;

/// The main error type for `feed-core` operations.
///
/// All public functions return `Result<T, Error>`. Variants map directly
/// onto the error kinds a caller needs to distinguish: a missing package is
/// not the same failure as a corrupt cache file, and callers building an
/// HTTP layer on top of this engine need to tell them apart without string
/// matching.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers reading/writing archive files, sidecar hash files, and the
    /// metadata cache file. The underlying `std::io::Error` is preserved.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested package (id, version) does not exist.
    ///
    /// `FindPackage`/`RemovePackage` on an absent package are no-ops at the
    /// repository layer; this variant is for callers (e.g. a download
    /// handler) that need a hard failure instead.
    #[error("Package not found: {0}")]
    NotFound(String),

    /// Add of an (id, version) that already exists with overwrite disabled.
    #[error("Package already exists: {id} {version}")]
    AlreadyExists {
        /// Package id.
        id: String,
        /// Package version (original string form).
        version: String,
    },

    /// Add of a symbols archive while symbols packages are being ignored.
    #[error("Symbols packages are not accepted: {id} {version}")]
    SymbolsRejected {
        /// Package id.
        id: String,
        /// Package version (original string form).
        version: String,
    },

    /// An argument supplied by the caller is invalid.
    ///
    /// Covers empty ids, malformed version strings, and other
    /// caller-correctable mistakes.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The repository was constructed with an invalid configuration value.
    ///
    /// Currently only raised for a `cache_file_name` that is not a bare
    /// filename (contains path separators or other invalid characters).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Archive parsing failed.
    ///
    /// Covers malformed zip archives and manifest (`.nuspec`) documents
    /// that cannot be parsed into a [`crate::Manifest`].
    #[error("Archive error: {0}")]
    Archive(String),

    /// An on-disk layout operation failed (component C).
    ///
    /// Distinct from `Io` because it carries a message about *which*
    /// layout invariant was violated, not just the underlying I/O failure.
    #[error("Layout error: {0}")]
    Layout(String),

    /// Serialization or deserialization of the metadata cache failed.
    ///
    /// A corrupt or schema-mismatched cache file is not fatal: callers
    /// should treat this as "delete and rebuild", per the cache-file
    /// corruption invariant.
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// An internal invariant was violated during a rebuild.
    ///
    /// This indicates a bug in the engine itself (e.g. two records
    /// surviving latest-flag computation with the same id/version) rather
    /// than a caller mistake or an environmental failure.
    #[error("Internal invariant violation: {0}")]
    Internal(String),

    /// The caller's `CancellationToken` was cancelled before the operation
    /// completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Self::Archive(format!("manifest parse error: {err}"))
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for errors that are typically transient (I/O
    /// timeouts/interruptions). Used by drop-folder ingestion to decide
    /// whether to log-and-skip a file versus treating it as a permanent
    /// rejection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            )
        )
    }

    /// Get the error category as a string identifier.
    ///
    /// Useful for logging and for callers that want to group errors
    /// (e.g. an HTTP layer mapping categories onto status codes) without
    /// matching on the full variant.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::SymbolsRejected { .. } => "symbols_rejected",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Archive(_) => "archive",
            Self::Layout(_) => "layout",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Convenience alias used throughout `feed-core`.
pub type Result<T> = std::result::Result<T, Error>;
