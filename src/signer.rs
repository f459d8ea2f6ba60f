//! Detached Ed25519 signatures over hash listing bytes.
//!
//! Signing is an optional terminal step of bundle export: given an externally
//! supplied 32-byte private key (hex-encoded), the exporter signs the exact
//! bytes of the bundle hash listing and writes the signature hex-encoded,
//! newline-terminated, alongside it. No key means a valid unsigned bundle.
//!
//! Consumer-side verification is exposed for external verifiers; the
//! regeneration path never calls it.

use crate::error::{CanonError, Result, ResultExt as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::fs;
use std::path::Path;

/// Decode a hex-encoded 32-byte Ed25519 private key.
///
/// # Errors
///
/// Returns [`CanonError::SigningKeyInvalid`] if the input is not hex or not
/// exactly 32 bytes.
pub fn signing_key_from_hex(hex_str: &str) -> Result<SigningKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CanonError::SigningKeyInvalid(format!("not hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| {
            CanonError::SigningKeyInvalid(format!("expected 32 bytes, got {}", b.len()))
        })?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Sign a byte sequence, returning the signature as lowercase hex.
pub fn sign_bytes(key: &SigningKey, data: &[u8]) -> String {
    hex::encode(key.sign(data).to_bytes())
}

/// Sign the exact bytes of `data_path` and write the detached signature to
/// `sig_path` as a single hex line with a trailing newline.
pub fn write_detached_signature(key: &SigningKey, data_path: &Path, sig_path: &Path) -> Result<()> {
    let data = fs::read(data_path)
        .with_context(|| format!("Failed to read {}", data_path.display()))?;
    let mut sig = sign_bytes(key, &data);
    sig.push('\n');
    fs::write(sig_path, sig)
        .with_context(|| format!("Failed to write {}", sig_path.display()))?;
    Ok(())
}

/// Verify a detached hex signature against data and a hex-encoded public key.
///
/// Consumer-side interface; returns `Ok(())` only for a valid signature.
pub fn verify_detached(pubkey_hex: &str, data: &[u8], sig_hex: &str) -> Result<()> {
    let pk_bytes = hex::decode(pubkey_hex.trim())
        .map_err(|e| CanonError::SigningKeyInvalid(format!("public key not hex: {e}")))?;
    let pk_bytes: [u8; 32] = pk_bytes.try_into().map_err(|b: Vec<u8>| {
        CanonError::SigningKeyInvalid(format!("public key expected 32 bytes, got {}", b.len()))
    })?;
    let key = VerifyingKey::from_bytes(&pk_bytes)
        .map_err(|e| CanonError::SigningKeyInvalid(format!("invalid public key: {e}")))?;

    let sig_bytes = hex::decode(sig_hex.trim())
        .map_err(|e| CanonError::Other(format!("signature not hex: {e}")))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|b: Vec<u8>| CanonError::Other(format!("signature expected 64 bytes, got {}", b.len())))?;
    let signature = Signature::from_bytes(&sig_bytes);

    key.verify(data, &signature)
        .map_err(|e| CanonError::Other(format!("signature verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_KEY_HEX: &str =
        "0707070707070707070707070707070707070707070707070707070707070707";

    #[test]
    fn test_sign_and_verify_round_trip() {
        let key = signing_key_from_hex(TEST_KEY_HEX).unwrap();
        let data = b"aa  ./AUDIT_STAMP.json\n";

        let sig = sign_bytes(&key, data);
        assert_eq!(sig.len(), 128); // 64 signature bytes, hex-encoded

        let pubkey = hex::encode(key.verifying_key().to_bytes());
        verify_detached(&pubkey, data, &sig).unwrap();
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let key = signing_key_from_hex(TEST_KEY_HEX).unwrap();
        let sig = sign_bytes(&key, b"original");
        let pubkey = hex::encode(key.verifying_key().to_bytes());

        assert!(verify_detached(&pubkey, b"tampered", &sig).is_err());
    }

    #[test]
    fn test_key_not_hex() {
        let err = signing_key_from_hex("zz").unwrap_err();
        assert!(matches!(err, CanonError::SigningKeyInvalid(_)));
    }

    #[test]
    fn test_key_wrong_length() {
        let err = signing_key_from_hex("0707").unwrap_err();
        match err {
            CanonError::SigningKeyInvalid(msg) => assert!(msg.contains("expected 32 bytes")),
            other => panic!("expected SigningKeyInvalid, got {other}"),
        }
    }

    #[test]
    fn test_detached_signature_file_format() {
        let dir = TempDir::new().unwrap();
        let data_path = dir.path().join("HASHES");
        let sig_path = dir.path().join("HASHES.sig");
        fs::write(&data_path, b"listing bytes").unwrap();

        let key = signing_key_from_hex(TEST_KEY_HEX).unwrap();
        write_detached_signature(&key, &data_path, &sig_path).unwrap();

        let sig = fs::read_to_string(&sig_path).unwrap();
        assert!(sig.ends_with('\n'));
        let sig = sig.trim();
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        let pubkey = hex::encode(key.verifying_key().to_bytes());
        verify_detached(&pubkey, b"listing bytes", sig).unwrap();
    }
}
