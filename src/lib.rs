//! # canonseal - Deterministic Offline Integrity Chain
//!
//! canonseal maintains and verifies the integrity chain of a versioned
//! artifact tree (the "canonical bundle"): a flat manifest of files, a
//! detached hash listing covering that manifest, and an audit stamp that
//! cryptographically commits to the whole tree's content. It can also export
//! a minimal, independently verifiable consumer bundle, optionally with a
//! detached Ed25519 signature.
//!
//! Everything is synchronous, single-threaded, and offline: blocking file
//! I/O plus CPU-bound hashing, no network, no retries. Every input is
//! deterministic local state, so any failure is terminal for the invocation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use canonseal::integrity;
//! use std::path::Path;
//!
//! # fn example() -> canonseal::error::Result<()> {
//! let root = Path::new(".");
//!
//! // Rebuild AUDIT_STAMP.json and REPO_HASHES.sha256 from disk
//! let summary = integrity::regenerate(root)?;
//! println!("payload root: {}", summary.integrity.payload_root_hash);
//!
//! // Later, verify the whole chain fail-closed
//! let report = integrity::verify_chain(root, &[])?;
//! for pass in &report.passes {
//!     println!("PASS: {pass}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`integrity`]: manifest, hash chain, audit stamp, and the verifier
//! - [`export`]: consumer bundle exporter with self-verification
//! - [`signer`]: detached Ed25519 signatures over hash listing bytes
//! - [`error`]: the failure taxonomy and result utilities
//! - [`logging`]: tracing subscriber setup for the CLI

#![warn(clippy::all, rust_2018_idioms)]

pub mod error;
pub mod export;
pub mod integrity;
pub mod logging;
pub mod signer;
