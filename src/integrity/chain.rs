//! Hash chain construction: payload root hash, hash listing, regeneration.
//!
//! The chain is deliberately flat: one SHA-256 per manifest entry in the hash
//! listing, plus one aggregate digest (the payload root hash) over the
//! substantive subset of the tree. Two exclusion rules break the circularity
//! that would otherwise make the chain impossible to close:
//!
//! - the hash listing never contains an entry for itself;
//! - the payload root hash skips the metadata artifacts (manifest, audit
//!   stamp, closeout document, hash listing), so the audit stamp can commit
//!   to the payload without depending on its own bytes.
//!
//! Regeneration order is load-bearing: the audit stamp is patched first, the
//! hash listing rebuilt second, so the listing certifies the freshly written
//! stamp. Reversed, the listing would certify stale stamp bytes and a single
//! pass could never converge. [`regenerate`] encodes that ordering; the two
//! phases are also exposed separately so the dependency stays visible in
//! type signatures.

use crate::error::{CanonError, Result, ResultExt as _};
use crate::integrity::audit::{self, IntegrityStamp};
use crate::integrity::hasher::{compute_bytes_hash, compute_file_hash};
use crate::integrity::manifest::{MANIFEST_FILE, Manifest, entry_rel};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name of the hash listing.
pub const HASHES_FILE: &str = "REPO_HASHES.sha256";

/// File name of the closeout document (payload-excluded, never read here).
pub const CLOSEOUT_FILE: &str = "CANONICAL_CLOSEOUT.md";

/// Paths excluded from the payload root hash.
///
/// These are the artifacts that describe the tree rather than constitute it.
/// Membership is tested against the bare relative path (no `./` marker).
/// Kept as an explicit constant so the exclusion rule is auditable in
/// isolation rather than buried in a naming convention.
pub const PAYLOAD_EXCLUDE: [&str; 4] = [
    MANIFEST_FILE,
    audit::AUDIT_STAMP_FILE,
    CLOSEOUT_FILE,
    HASHES_FILE,
];

/// Whether a manifest entry contributes to the payload root hash.
pub fn is_payload_entry(entry: &str) -> bool {
    !PAYLOAD_EXCLUDE.contains(&entry_rel(entry))
}

/// Aggregate digest over the payload subset, plus its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadRoot {
    /// SHA-256 over the canonical sorted rendering, lowercase hex
    pub hash: String,

    /// Number of payload entries covered
    pub file_count: usize,
}

/// Compute the payload root hash from the current on-disk payload files.
///
/// Rendering: for each payload entry (manifest minus [`PAYLOAD_EXCLUDE`]),
/// sorted by bare relative path, one line `"<sha256>  ./<rel>"`, joined with
/// `\n` and newline-terminated; the root hash is SHA-256 over those UTF-8
/// bytes. Sorting happens here, so the result is independent of manifest
/// line order.
pub fn compute_payload_root(root: &Path, manifest: &Manifest) -> Result<PayloadRoot> {
    let mut payload: Vec<&str> = manifest
        .entries()
        .iter()
        .filter(|e| is_payload_entry(e))
        .map(|e| entry_rel(e))
        .collect();
    payload.sort_unstable();

    let mut lines = Vec::with_capacity(payload.len());
    for rel in &payload {
        let sha = compute_file_hash(&root.join(rel))?;
        lines.push(format!("{sha}  ./{rel}"));
    }
    let mut material = lines.join("\n");
    material.push('\n');

    Ok(PayloadRoot {
        hash: compute_bytes_hash(material.as_bytes()),
        file_count: payload.len(),
    })
}

/// Render the hash listing for every manifest entry except the listing itself.
///
/// Lines keep manifest order and use the manifest's own path string verbatim
/// as the label, so the rendering stays stable even if path normalization
/// changes elsewhere.
pub fn build_hash_listing(root: &Path, manifest: &Manifest) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(manifest.len().saturating_sub(1));
    for entry in manifest.entries() {
        if entry_rel(entry) == HASHES_FILE {
            continue;
        }
        let sha = compute_file_hash(&root.join(entry_rel(entry)))?;
        lines.push(format!("{sha}  {entry}"));
    }
    Ok(lines)
}

/// Build and persist `<root>/REPO_HASHES.sha256`; returns the entry count.
pub fn write_hash_listing(root: &Path, manifest: &Manifest) -> Result<usize> {
    let lines = build_hash_listing(root, manifest)?;
    let path = root.join(HASHES_FILE);
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(lines.len())
}

/// Parse a hash listing into a path → digest map.
///
/// Accepts sha256sum-compatible lines: first whitespace-separated token is
/// the digest, last token is the path. Blank lines are ignored.
pub fn parse_hash_listing(text: &str) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for line in text.lines().map(str::trim).filter(|ln| !ln.is_empty()) {
        let mut parts = line.split_whitespace();
        let sha = parts.next();
        let path = parts.last();
        match (sha, path) {
            (Some(sha), Some(path)) => {
                entries.insert(path.to_owned(), sha.to_owned());
            }
            _ => return Err(CanonError::HashListingMalformed(line.to_owned())),
        }
    }
    Ok(entries)
}

/// Phase one of regeneration: recompute the integrity fields and persist the
/// patched audit stamp.
///
/// Must run before [`write_hash_listing`] so the listing captures the updated
/// stamp bytes.
pub fn patch_audit_stamp(root: &Path, manifest: &Manifest) -> Result<IntegrityStamp> {
    let payload = compute_payload_root(root, manifest)?;
    let stamp = IntegrityStamp {
        manifest_sha256: compute_file_hash(&root.join(MANIFEST_FILE))?,
        repo_file_count: manifest.len(),
        payload_file_count: payload.file_count,
        payload_root_hash: payload.hash,
    };
    audit::write_integrity(root, &stamp)?;
    Ok(stamp)
}

/// Outcome of a full regeneration pass.
#[derive(Debug, Clone)]
pub struct RegenSummary {
    /// Number of lines written to the hash listing
    pub hash_entries: usize,

    /// Integrity fields now committed in the audit stamp
    pub integrity: IntegrityStamp,
}

/// Regenerate all integrity artifacts for the tree at `root` in one pass.
pub fn regenerate(root: &Path) -> Result<RegenSummary> {
    let manifest = Manifest::load(root)?;

    // Stamp first: the listing below must hash the patched stamp bytes.
    let integrity = patch_audit_stamp(root, &manifest)?;
    let hash_entries = write_hash_listing(root, &manifest)?;

    tracing::info!(
        hash_entries,
        repo_file_count = integrity.repo_file_count,
        payload_file_count = integrity.payload_file_count,
        "regenerated integrity artifacts"
    );
    Ok(RegenSummary {
        hash_entries,
        integrity,
    })
}
