//! Canonical-tree integrity chain.
//!
//! This is the core of canonseal: the protocol tying the manifest, the hash
//! listing, and the audit stamp to the on-disk file set so that the whole
//! tree is trusted atomically or not at all.
//!
//! ## The chain
//!
//! - [`manifest`]: the committed list of every file in the tree.
//! - The hash listing (`REPO_HASHES.sha256`): one SHA-256 per manifest entry,
//!   the listing itself excluded.
//! - The audit stamp (`AUDIT_STAMP.json`): version identifiers plus the
//!   manifest digest, file counts, and the payload root hash — a single
//!   aggregate digest over the substantive subset of the tree.
//!
//! Regeneration flows disk → manifest → audit stamp → hash listing, in that
//! order; the stamp must be patched before the listing is rebuilt so the
//! listing certifies fresh stamp bytes (see [`chain`]). Verification runs the
//! reverse comparison as four independent fail-closed checks (see
//! [`verifier`]).
//!
//! ## Submodules
//!
//! - [`hasher`]: streaming SHA-256 digests
//! - [`manifest`]: recording, loading, disk cross-check
//! - [`chain`]: payload root hash, hash listing, two-phase regeneration
//! - [`audit`]: audit stamp and version lock records
//! - [`verifier`]: the four-check chain verifier and its plug point

pub mod audit;
pub mod chain;
pub mod hasher;
pub mod manifest;
pub mod verifier;

pub use audit::{AuditStamp, IntegrityStamp, VersionLock};
pub use chain::{PayloadRoot, RegenSummary, compute_payload_root, regenerate};
pub use hasher::{compute_bytes_hash, compute_file_hash};
pub use manifest::Manifest;
pub use verifier::{StaticInvariant, VerificationReport, verify_chain};
