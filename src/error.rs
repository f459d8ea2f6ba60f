//! Centralized error handling for the canonseal integrity chain.
//!
//! Every failure in the chain is terminal for the current invocation: all
//! inputs are deterministic local state, so nothing is retried. The variants
//! mirror the verification taxonomy so a caller can match on the exact check
//! that failed, and `Display` renders the single-line diagnostics the CLI
//! prints after its `FAIL:` prefix.
//!
//! Set-mismatch variants carry bounded diff context (the verifier truncates
//! to the first [`DIFF_CONTEXT_LIMIT`] offending entries before constructing
//! the error), scalar mismatches carry named expected-vs-actual values.

use std::fmt;

/// Maximum number of offending paths reported per side of a set mismatch.
pub const DIFF_CONTEXT_LIMIT: usize = 20;

/// Main error type for canonseal operations.
#[derive(Debug)]
pub enum CanonError {
    /// I/O errors (file reads, writes, metadata)
    Io(std::io::Error),

    /// JSON parse or serialize errors (audit stamp, version lock)
    Json(String),

    /// A required artifact file is absent
    MissingArtifact(String),

    /// Manifest does not match the on-disk file set
    ManifestDrift {
        missing_in_manifest: Vec<String>,
        extra_in_manifest: Vec<String>,
    },

    /// A hash listing line could not be parsed
    HashListingMalformed(String),

    /// Hash listing is missing entries the manifest requires
    HashListingIncomplete(Vec<String>),

    /// Hash listing contains entries the manifest does not declare
    HashListingExtra(Vec<String>),

    /// A recomputed file digest differs from the listed one
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A stored audit stamp field differs from its recomputed value
    AuditStampMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Version lock and audit stamp disagree on a version field
    VersionLockMismatch {
        field: String,
        audit: String,
        lock: String,
    },

    /// A caller-supplied static invariant failed
    StaticInvariant { description: String, detail: String },

    /// Signing key is not hex or not 32 bytes
    SigningKeyInvalid(String),

    /// Export destination lies inside the source tree
    ExportLocationInvalid(String),

    /// Generic error with context
    Other(String),
}

fn fmt_paths(paths: &[String]) -> String {
    format!("[{}]", paths.join(", "))
}

impl fmt::Display for CanonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Json(msg) => write!(f, "JSON error: {msg}"),
            Self::MissingArtifact(name) => write!(f, "Missing {name}"),
            Self::ManifestDrift {
                missing_in_manifest,
                extra_in_manifest,
            } => write!(
                f,
                "manifest does not match on-disk files; \
                 missing_in_manifest (first {DIFF_CONTEXT_LIMIT}): {}; \
                 extra_in_manifest (first {DIFF_CONTEXT_LIMIT}): {}",
                fmt_paths(missing_in_manifest),
                fmt_paths(extra_in_manifest)
            ),
            Self::HashListingMalformed(line) => {
                write!(f, "malformed hash listing line: {line}")
            }
            Self::HashListingIncomplete(paths) => write!(
                f,
                "hash listing missing entries (first {DIFF_CONTEXT_LIMIT}): {}",
                fmt_paths(paths)
            ),
            Self::HashListingExtra(paths) => write!(
                f,
                "hash listing has unexpected entries (first {DIFF_CONTEXT_LIMIT}): {}",
                fmt_paths(paths)
            ),
            Self::HashMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "hash mismatch for {path}: expected {expected}, got {actual}"
            ),
            Self::AuditStampMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "audit stamp {field} mismatch: expected {expected}, got {actual}"
            ),
            Self::VersionLockMismatch { field, audit, lock } => write!(
                f,
                "{field} mismatch: audit stamp={audit} vs version lock={lock}"
            ),
            Self::StaticInvariant {
                description,
                detail,
            } => write!(f, "static invariant failed ({description}): {detail}"),
            Self::SigningKeyInvalid(msg) => write!(f, "invalid signing key: {msg}"),
            Self::ExportLocationInvalid(msg) => write!(f, "invalid export location: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CanonError {}

impl From<std::io::Error> for CanonError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CanonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<anyhow::Error> for CanonError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type alias for canonseal operations.
pub type Result<T> = std::result::Result<T, CanonError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CanonError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: CanonError = e.into();
            CanonError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: CanonError = e.into();
            CanonError::Other(format!("{}: {}", f(), err))
        })
    }
}
