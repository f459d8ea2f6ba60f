//! Manifest recording, loading, and disk cross-checking.
//!
//! A manifest is an ordered list of distinct relative paths, each prefixed
//! with `./`, naming every regular file that belongs to the tree. Recording
//! derives the list from disk; loading reads a previously committed list;
//! the cross-check requires the two views to be identical in both membership
//! and order.

use crate::error::{CanonError, DIFF_CONTEXT_LIMIT, Result, ResultExt as _};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// File name of the canonical tree manifest.
pub const MANIFEST_FILE: &str = "REPO_MANIFEST.txt";

/// An ordered list of `./`-prefixed relative paths covering a file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    /// Build a manifest from pre-rendered `./`-prefixed entries.
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Load the committed manifest from `<root>/REPO_MANIFEST.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonError::MissingArtifact`] if the manifest file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&root.join(MANIFEST_FILE))
    }

    /// Load a manifest from an explicit file path.
    ///
    /// Lines are trimmed and blank lines ignored; every remaining line is one
    /// manifest entry, kept in file order.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CanonError::MissingArtifact(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            ));
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|ln| !ln.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self { entries })
    }

    /// Record a fresh manifest from the regular files currently under `root`.
    pub fn record(root: &Path) -> Result<Self> {
        Ok(Self {
            entries: list_tree_files(root)?,
        })
    }

    /// Persist the manifest as one entry per line with a trailing newline.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut text = self.entries.join("\n");
        text.push('\n');
        fs::write(path, text)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    /// Manifest entries in committed order, each `./`-prefixed.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of manifest entries (the repo file count).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip the `./` relative-root marker from a manifest entry.
pub fn entry_rel(entry: &str) -> &str {
    entry.strip_prefix("./").unwrap_or(entry)
}

/// Enumerate every regular file under `root` as a sorted list of
/// `./`-prefixed relative paths with `/` separators.
pub fn list_tree_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry
            .map_err(|e| CanonError::Other(format!("Failed to walk {}: {e}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| CanonError::Other(format!("Path outside walk root: {e}")))?;
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(format!("./{}", rel.join("/")));
    }
    files.sort();
    Ok(files)
}

/// Require the loaded manifest to equal the on-disk file set, order included.
///
/// # Errors
///
/// Returns [`CanonError::ManifestDrift`] carrying the first
/// [`DIFF_CONTEXT_LIMIT`] paths missing from each side.
pub fn cross_check(root: &Path, manifest: &Manifest) -> Result<()> {
    let actual = list_tree_files(root)?;
    if manifest.entries() == actual.as_slice() {
        return Ok(());
    }

    let mset: BTreeSet<&String> = manifest.entries().iter().collect();
    let aset: BTreeSet<&String> = actual.iter().collect();
    let missing_in_manifest: Vec<String> = aset
        .difference(&mset)
        .take(DIFF_CONTEXT_LIMIT)
        .map(|p| (*p).clone())
        .collect();
    let extra_in_manifest: Vec<String> = mset
        .difference(&aset)
        .take(DIFF_CONTEXT_LIMIT)
        .map(|p| (*p).clone())
        .collect();

    Err(CanonError::ManifestDrift {
        missing_in_manifest,
        extra_in_manifest,
    })
}
