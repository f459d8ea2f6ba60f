//! Audit stamp and version lock records.
//!
//! The audit stamp (`AUDIT_STAMP.json`) is the signed-off summary of the
//! canonical tree: version identifiers plus the integrity fields an external
//! verifier recomputes. The version lock (`VERSION_LOCK.json`) is an
//! independent record of the expected versions; verification requires exact,
//! type-aware equality between the two.
//!
//! Only the regeneration step mutates the stamp, and only its four integrity
//! fields: patching goes through generic JSON so any other keys a steward has
//! added survive untouched.

use crate::error::{CanonError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// File name of the audit stamp record.
pub const AUDIT_STAMP_FILE: &str = "AUDIT_STAMP.json";

/// File name of the version lock record.
pub const VERSION_LOCK_FILE: &str = "VERSION_LOCK.json";

/// Integrity fields committed inside the audit stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityStamp {
    /// SHA-256 of the manifest file's exact bytes
    pub manifest_sha256: String,

    /// Number of manifest entries
    pub repo_file_count: usize,

    /// Number of payload entries (manifest minus the exclusion set)
    pub payload_file_count: usize,

    /// Aggregate digest over the sorted payload rendering
    pub payload_root_hash: String,
}

/// Typed view of the audit stamp, as verification reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditStamp {
    /// Canonical content version (numeric comparison against the lock)
    pub canon_version: i64,

    /// Specification version (string comparison against the lock)
    pub spec_version: String,

    /// Integrity fields; defaults to empty on a stamp never regenerated
    #[serde(default)]
    pub integrity: IntegrityStamp,
}

/// Expected versions, held separately from the stamp they gate.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionLock {
    #[serde(rename = "CANON_VERSION")]
    pub canon_version: i64,

    #[serde(rename = "SPEC_VERSION")]
    pub spec_version: String,
}

fn load_json(path: &Path, artifact: &str) -> Result<Value> {
    if !path.exists() {
        return Err(CanonError::MissingArtifact(artifact.to_owned()));
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| CanonError::Json(format!("Could not parse {artifact}: {e}")))
}

/// Load and parse `<root>/AUDIT_STAMP.json`.
pub fn load_audit_stamp(root: &Path) -> Result<AuditStamp> {
    let value = load_json(&root.join(AUDIT_STAMP_FILE), AUDIT_STAMP_FILE)?;
    serde_json::from_value(value)
        .map_err(|e| CanonError::Json(format!("Could not parse {AUDIT_STAMP_FILE}: {e}")))
}

/// Load and parse `<root>/VERSION_LOCK.json`.
pub fn load_version_lock(root: &Path) -> Result<VersionLock> {
    let value = load_json(&root.join(VERSION_LOCK_FILE), VERSION_LOCK_FILE)?;
    serde_json::from_value(value)
        .map_err(|e| CanonError::Json(format!("Could not parse {VERSION_LOCK_FILE}: {e}")))
}

/// Patch the four integrity fields into the on-disk audit stamp.
///
/// All other keys, top-level and inside `integrity`, are preserved. The stamp
/// is rewritten as pretty-printed JSON with sorted keys and a trailing
/// newline so regeneration is byte-reproducible.
pub fn write_integrity(root: &Path, stamp: &IntegrityStamp) -> Result<()> {
    let path = root.join(AUDIT_STAMP_FILE);
    let mut audit = load_json(&path, AUDIT_STAMP_FILE)?;

    let obj = audit
        .as_object_mut()
        .ok_or_else(|| CanonError::Json(format!("{AUDIT_STAMP_FILE} is not a JSON object")))?;
    let integrity = obj
        .entry("integrity")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    let integrity = integrity
        .as_object_mut()
        .ok_or_else(|| CanonError::Json(format!("{AUDIT_STAMP_FILE} integrity is not an object")))?;

    integrity.insert(
        "manifest_sha256".to_owned(),
        Value::from(stamp.manifest_sha256.clone()),
    );
    integrity.insert(
        "repo_file_count".to_owned(),
        Value::from(stamp.repo_file_count),
    );
    integrity.insert(
        "payload_file_count".to_owned(),
        Value::from(stamp.payload_file_count),
    );
    integrity.insert(
        "payload_root_hash".to_owned(),
        Value::from(stamp.payload_root_hash.clone()),
    );

    let mut text = serde_json::to_string_pretty(&audit)?;
    text.push('\n');
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
