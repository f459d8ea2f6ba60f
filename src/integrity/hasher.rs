//! Streaming cryptographic hash computation.
//!
//! Every digest in the chain (per-file entries, manifest digest, payload root)
//! is SHA-256 rendered as lowercase hex. Files are hashed without being loaded
//! into memory so arbitrarily large payload documents stay cheap to cover.

use crate::error::{Result, ResultExt as _};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::Path;

/// Buffer size for streaming file reads (64 KB).
///
/// Large enough to keep syscall overhead negligible for the document-sized
/// files a canonical tree holds, small enough that memory use is flat.
const BUFFER_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 digest of an in-memory byte sequence.
///
/// Returns the digest as a lowercase hexadecimal string (64 characters).
/// Used for the payload root hash, which is computed over a rendered listing
/// rather than a file on disk.
pub fn compute_bytes_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 digest of a file using streaming I/O.
///
/// Reads the file in fixed-size chunks and updates the hash incrementally;
/// the result is independent of chunk boundaries.
///
/// # Errors
///
/// Returns an error if the file does not exist or cannot be read. A missing
/// file must surface as a verification failure, never as an empty digest, so
/// I/O errors always propagate.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        if bytes_read == 0 {
            break; // EOF
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
