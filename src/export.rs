//! Consumer bundle export.
//!
//! A bundle is a self-contained directory holding a curated subset of the
//! canonical tree plus its own manifest and hash listing: a structurally
//! smaller instance of the same protocol, independently verifiable with
//! nothing but `sha256sum -c`. An optional detached Ed25519 signature covers
//! the hash listing bytes.
//!
//! Contract points enforced here:
//!
//! - the output directory must lie outside the source tree, checked before
//!   anything is created on disk;
//! - the bundle manifest declares the manifest, hash listing, and signature
//!   paths even when the signature never materializes; only entries that
//!   exist at hashing time are hashed;
//! - when signing happens the listing is written twice: once to have bytes to
//!   sign, once more so the final listing also certifies the signature file.
//!   The signed listing therefore never contains the signature's own digest;
//! - the exporter verifies its own bundle before reporting success.

use crate::error::{CanonError, Result, ResultExt as _};
use crate::integrity::chain::parse_hash_listing;
use crate::integrity::hasher::compute_file_hash;
use crate::integrity::manifest::{Manifest, entry_rel, list_tree_files};
use crate::signer;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the bundle manifest.
pub const BUNDLE_MANIFEST_FILE: &str = "BUNDLE_MANIFEST.txt";

/// File name of the bundle hash listing.
pub const BUNDLE_HASHES_FILE: &str = "BUNDLE_HASHES.sha256";

/// File name of the optional detached signature.
pub const BUNDLE_SIG_FILE: &str = "BUNDLE_HASHES.sig";

/// Repo-relative files included when the caller does not choose a subset.
pub fn default_include() -> Vec<String> {
    vec![
        "AUDIT_STAMP.json".to_owned(),
        "gov/STATE_SNAPSHOT.md".to_owned(),
    ]
}

/// Export configuration.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Destination directory; defaults to `~/bundles/CANON_BUNDLE_<UTC>`
    pub out_dir: Option<PathBuf>,

    /// Repo-relative payload files to export
    pub include: Vec<String>,

    /// Hex-encoded 32-byte Ed25519 private key; `None` exports unsigned
    pub signing_key_hex: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            out_dir: None,
            include: default_include(),
            signing_key_hex: None,
        }
    }
}

/// Resolved locations of a finished bundle.
#[derive(Debug, Clone)]
pub struct BundlePaths {
    pub out_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub hashes_path: PathBuf,
    /// Present on disk only for signed bundles
    pub sig_path: PathBuf,
    /// Whether a signature was written
    pub signed: bool,
}

fn utc_stamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn default_out_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CanonError::Other("Could not determine home directory".to_owned()))?;
    Ok(home
        .join("bundles")
        .join(format!("CANON_BUNDLE_{}", utc_stamp())))
}

/// Refuse destinations inside the source tree. Runs before any write.
fn check_out_dir(repo_root: &Path, out_dir: &Path) -> Result<()> {
    let repo_abs = std::path::absolute(repo_root)
        .with_context(|| format!("Failed to resolve repo root: {}", repo_root.display()))?;
    let out_abs = std::path::absolute(out_dir)
        .with_context(|| format!("Failed to resolve out dir: {}", out_dir.display()))?;
    if out_abs.starts_with(&repo_abs) {
        return Err(CanonError::ExportLocationInvalid(format!(
            "{} lies inside the source tree {}",
            out_abs.display(),
            repo_abs.display()
        )));
    }
    Ok(())
}

/// Write the bundle hash listing covering every manifest entry that exists on
/// disk, except the listing itself. Returns the entry count.
fn write_bundle_hashes(out_dir: &Path, manifest: &Manifest) -> Result<usize> {
    let mut lines = Vec::new();
    for entry in manifest.entries() {
        let rel = entry_rel(entry);
        if rel == BUNDLE_HASHES_FILE || !out_dir.join(rel).is_file() {
            continue;
        }
        let sha = compute_file_hash(&out_dir.join(rel))?;
        lines.push(format!("{sha}  {entry}"));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(out_dir.join(BUNDLE_HASHES_FILE), text)
        .context("Failed to write bundle hash listing")?;
    Ok(lines.len())
}

/// Verify a bundle in place: manifest vs disk, then hash listing vs disk.
///
/// Scoped variant of chain checks 1–2. A manifest entry with no file behind
/// it is tolerated (a declared signature that was never produced); a disk
/// file the manifest does not declare is drift.
///
/// Returns the number of hash entries verified.
pub fn verify_bundle(bundle_dir: &Path) -> Result<usize> {
    let manifest = Manifest::load_from(&bundle_dir.join(BUNDLE_MANIFEST_FILE))?;
    let declared: BTreeSet<&str> = manifest.entries().iter().map(|e| e.as_str()).collect();

    let on_disk = list_tree_files(bundle_dir)?;
    let undeclared: Vec<String> = on_disk
        .iter()
        .filter(|p| !declared.contains(p.as_str()))
        .cloned()
        .collect();
    if !undeclared.is_empty() {
        return Err(CanonError::ManifestDrift {
            missing_in_manifest: undeclared,
            extra_in_manifest: Vec::new(),
        });
    }

    let hashes_path = bundle_dir.join(BUNDLE_HASHES_FILE);
    if !hashes_path.exists() {
        return Err(CanonError::MissingArtifact(BUNDLE_HASHES_FILE.to_owned()));
    }
    let entries = parse_hash_listing(&fs::read_to_string(&hashes_path)?)?;

    let expected: Vec<&String> = manifest
        .entries()
        .iter()
        .filter(|e| entry_rel(e) != BUNDLE_HASHES_FILE && bundle_dir.join(entry_rel(e)).is_file())
        .collect();
    let expected_set: BTreeSet<&str> = expected.iter().map(|e| e.as_str()).collect();

    let missing: Vec<String> = expected
        .iter()
        .filter(|e| !entries.contains_key(e.as_str()))
        .map(|e| (*e).clone())
        .collect();
    if !missing.is_empty() {
        return Err(CanonError::HashListingIncomplete(missing));
    }
    let extra: Vec<String> = entries
        .keys()
        .filter(|k| !expected_set.contains(k.as_str()))
        .cloned()
        .collect();
    if !extra.is_empty() {
        return Err(CanonError::HashListingExtra(extra));
    }

    for entry in &expected {
        let actual = compute_file_hash(&bundle_dir.join(entry_rel(entry)))?;
        let listed = &entries[entry.as_str()];
        if actual != *listed {
            return Err(CanonError::HashMismatch {
                path: (*entry).clone(),
                expected: listed.clone(),
                actual,
            });
        }
    }

    Ok(expected.len())
}

/// Export a consumer bundle from `repo_root` per `options`.
///
/// Fails closed: the isolation guard and signing-key validation both run
/// before anything is written, and the finished bundle is self-verified
/// before this function reports success.
pub fn export_bundle(repo_root: &Path, options: &ExportOptions) -> Result<BundlePaths> {
    let out_dir = match &options.out_dir {
        Some(dir) => dir.clone(),
        None => default_out_dir()?,
    };
    check_out_dir(repo_root, &out_dir)?;

    // A bad key must not leave a half-written bundle behind
    let signing_key = options
        .signing_key_hex
        .as_deref()
        .map(signer::signing_key_from_hex)
        .transpose()?;

    for rel in &options.include {
        let src = repo_root.join(rel);
        if !src.is_file() {
            return Err(CanonError::MissingArtifact(rel.clone()));
        }
    }

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    for rel in &options.include {
        let dst = out_dir.join(rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(repo_root.join(rel), &dst)
            .with_context(|| format!("Failed to copy {rel} into bundle"))?;
    }

    // Declare the bundle artifacts alongside the payload, signature included
    // even when no key was supplied.
    let mut entries: Vec<String> = options.include.iter().map(|rel| format!("./{rel}")).collect();
    entries.push(format!("./{BUNDLE_MANIFEST_FILE}"));
    entries.push(format!("./{BUNDLE_HASHES_FILE}"));
    entries.push(format!("./{BUNDLE_SIG_FILE}"));
    entries.sort();
    let manifest = Manifest::from_entries(entries);
    let manifest_path = out_dir.join(BUNDLE_MANIFEST_FILE);
    manifest.write_to(&manifest_path)?;

    write_bundle_hashes(&out_dir, &manifest)?;

    let hashes_path = out_dir.join(BUNDLE_HASHES_FILE);
    let sig_path = out_dir.join(BUNDLE_SIG_FILE);
    let signed = if let Some(key) = signing_key {
        signer::write_detached_signature(&key, &hashes_path, &sig_path)?;
        // Second pass: the final listing must certify the signature file.
        write_bundle_hashes(&out_dir, &manifest)?;
        true
    } else {
        tracing::info!("no signing key provided; bundle is unsigned (hashes-only)");
        false
    };

    let verified = verify_bundle(&out_dir)?;
    tracing::info!(
        bundle = %out_dir.display(),
        entries = verified,
        signed,
        "bundle exported and self-verified"
    );

    Ok(BundlePaths {
        out_dir,
        manifest_path,
        hashes_path,
        sig_path,
        signed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_KEY_HEX: &str =
        "0707070707070707070707070707070707070707070707070707070707070707";

    fn touch(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn source_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        touch(
            dir.path(),
            "AUDIT_STAMP.json",
            br#"{"canon_version": 4, "spec_version": "1.1"}"#,
        );
        touch(dir.path(), "gov/STATE_SNAPSHOT.md", b"state snapshot v1\n");
        dir
    }

    #[test]
    fn test_unsigned_export_is_valid_without_signature() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();
        let out_dir = out.path().join("bundle");

        let options = ExportOptions {
            out_dir: Some(out_dir.clone()),
            ..ExportOptions::default()
        };
        let paths = export_bundle(repo.path(), &options).unwrap();

        assert!(!paths.signed);
        assert!(!paths.sig_path.exists());
        assert!(paths.manifest_path.exists());

        // Manifest declares the signature anyway
        let manifest_text = fs::read_to_string(&paths.manifest_path).unwrap();
        assert!(manifest_text.contains(BUNDLE_SIG_FILE));

        // And the listing does not cover the absent signature
        let hashes = fs::read_to_string(&paths.hashes_path).unwrap();
        assert!(!hashes.contains(BUNDLE_SIG_FILE));

        assert_eq!(verify_bundle(&out_dir).unwrap(), 3);
    }

    #[test]
    fn test_signed_export_covers_signature_file() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();
        let out_dir = out.path().join("bundle");

        let options = ExportOptions {
            out_dir: Some(out_dir.clone()),
            signing_key_hex: Some(TEST_KEY_HEX.to_owned()),
            ..ExportOptions::default()
        };
        let paths = export_bundle(repo.path(), &options).unwrap();

        assert!(paths.signed);
        assert!(paths.sig_path.exists());

        // Final listing certifies the signature file's bytes
        let hashes = fs::read_to_string(&paths.hashes_path).unwrap();
        assert!(hashes.contains(&format!("./{BUNDLE_SIG_FILE}")));

        // The signature covers the pre-signature listing: reconstruct it by
        // dropping the signature entry, then check the detached signature.
        let pre_sign: String = hashes
            .lines()
            .filter(|ln| !ln.ends_with(BUNDLE_SIG_FILE))
            .fold(String::new(), |mut acc, ln| {
                acc.push_str(ln);
                acc.push('\n');
                acc
            });
        let key = signer::signing_key_from_hex(TEST_KEY_HEX).unwrap();
        let pubkey = hex::encode(key.verifying_key().to_bytes());
        let sig = fs::read_to_string(&paths.sig_path).unwrap();
        signer::verify_detached(&pubkey, pre_sign.as_bytes(), &sig).unwrap();

        assert_eq!(verify_bundle(&out_dir).unwrap(), 4);
    }

    #[test]
    fn test_export_inside_repo_refused_before_writing() {
        let repo = source_repo();
        let inside = repo.path().join("exports/bundle");

        let options = ExportOptions {
            out_dir: Some(inside.clone()),
            ..ExportOptions::default()
        };
        let err = export_bundle(repo.path(), &options).unwrap_err();
        assert!(matches!(err, CanonError::ExportLocationInvalid(_)));
        assert!(!inside.exists());
        assert!(!repo.path().join("exports").exists());
    }

    #[test]
    fn test_bad_signing_key_refused_before_writing() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();
        let out_dir = out.path().join("bundle");

        let options = ExportOptions {
            out_dir: Some(out_dir.clone()),
            signing_key_hex: Some("deadbeef".to_owned()),
            ..ExportOptions::default()
        };
        let err = export_bundle(repo.path(), &options).unwrap_err();
        assert!(matches!(err, CanonError::SigningKeyInvalid(_)));
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_missing_include_is_typed() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();

        let options = ExportOptions {
            out_dir: Some(out.path().join("bundle")),
            include: vec!["gov/NO_SUCH_FILE.md".to_owned()],
            signing_key_hex: None,
        };
        let err = export_bundle(repo.path(), &options).unwrap_err();
        assert!(matches!(err, CanonError::MissingArtifact(ref n) if n == "gov/NO_SUCH_FILE.md"));
    }

    #[test]
    fn test_tampered_bundle_fails_self_check() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();
        let out_dir = out.path().join("bundle");

        let options = ExportOptions {
            out_dir: Some(out_dir.clone()),
            ..ExportOptions::default()
        };
        export_bundle(repo.path(), &options).unwrap();

        touch(&out_dir, "gov/STATE_SNAPSHOT.md", b"tampered\n");
        let err = verify_bundle(&out_dir).unwrap_err();
        assert!(
            matches!(err, CanonError::HashMismatch { ref path, .. } if path == "./gov/STATE_SNAPSHOT.md")
        );
    }

    #[test]
    fn test_undeclared_bundle_file_is_drift() {
        let repo = source_repo();
        let out = TempDir::new().unwrap();
        let out_dir = out.path().join("bundle");

        let options = ExportOptions {
            out_dir: Some(out_dir.clone()),
            ..ExportOptions::default()
        };
        export_bundle(repo.path(), &options).unwrap();

        touch(&out_dir, "extra.txt", b"x");
        let err = verify_bundle(&out_dir).unwrap_err();
        assert!(
            matches!(err, CanonError::ManifestDrift { ref missing_in_manifest, .. }
                if missing_in_manifest == &["./extra.txt".to_owned()])
        );
    }
}
