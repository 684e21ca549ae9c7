//! Detached-signature verification for package files.
//!
//! Packages are signed with Ed25519 over the SHA-256 digest of the file. The
//! signature lives next to the file as `<file>.sig`. The trusted public key is
//! supplied either as bytes or as a path to a key file.
//!
//! # Accepted Encodings
//!
//! Public key material:
//! - 32 raw bytes
//! - hex text (64 characters)
//! - base64 text of the 32-byte key, or of the DER `SubjectPublicKeyInfo`
//! - either of the text forms wrapped in `-----BEGIN ...-----` armor
//!
//! Signatures: 64 raw bytes, hex text (128 characters) or base64 text.
//!
//! # Fail-Closed Contract
//!
//! [`verify`] and the `verify_file_*` helpers return `bool`. Every failure
//! (malformed key, unreadable file or signature, mismatch) yields `false` and is
//! only logged at debug level. Use [`PackageVerifier::check`] when the reason
//! matters.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::constants::SIGNATURE_EXTENSION;

/// DER prefix of an Ed25519 `SubjectPublicKeyInfo` (as written by `openssl pkey -pubout`).
const ED25519_SPKI_PREFIX: [u8; 12] =
    [0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00];

/// Where the trusted public key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedCertificate {
    /// Key material held in memory.
    Bytes(Vec<u8>),
    /// Key material read from a file at verification time.
    File(PathBuf),
}

/// Why a verification did not succeed.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("signature does not match {0}")]
    Mismatch(PathBuf),
}

/// Path of the detached signature for `file`.
pub fn signature_path(file: &Path) -> PathBuf {
    let mut os = file.as_os_str().to_owned();
    os.push(".");
    os.push(SIGNATURE_EXTENSION);
    PathBuf::from(os)
}

/// Decodes Ed25519 public key material in any accepted encoding.
pub fn decode_public_key(material: &[u8]) -> Result<VerifyingKey, VerifyError> {
    let bytes = if material.len() == 32 {
        material.to_vec()
    } else {
        let text = std::str::from_utf8(material)
            .map_err(|_| VerifyError::InvalidKey("not 32 raw bytes or text".to_string()))?;
        let body = strip_armor(text);
        let decoded = decode_text(&body, 32)
            .ok_or_else(|| VerifyError::InvalidKey("not hex or base64".to_string()))?;
        match decoded.strip_prefix(ED25519_SPKI_PREFIX.as_slice()) {
            Some(raw) => raw.to_vec(),
            None => decoded,
        }
    };

    let raw: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| VerifyError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&raw).map_err(|e| VerifyError::InvalidKey(e.to_string()))
}

/// Decodes a detached signature in any accepted encoding.
pub fn decode_signature(material: &[u8]) -> Result<Signature, VerifyError> {
    let bytes = if material.len() == 64 {
        material.to_vec()
    } else {
        let text = std::str::from_utf8(material)
            .map_err(|_| VerifyError::InvalidSignature("not 64 raw bytes or text".to_string()))?;
        decode_text(&strip_armor(text), 64)
            .ok_or_else(|| VerifyError::InvalidSignature("not hex or base64".to_string()))?
    };
    Signature::from_slice(&bytes).map_err(|e| VerifyError::InvalidSignature(e.to_string()))
}

fn strip_armor(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

/// Hex is tried first when the length matches exactly, then base64.
fn decode_text(body: &str, raw_len: usize) -> Option<Vec<u8>> {
    if body.len() == raw_len * 2 {
        if let Ok(bytes) = hex::decode(body) {
            return Some(bytes);
        }
    }
    STANDARD.decode(body).ok()
}

/// Streams `path` through SHA-256.
pub fn file_digest(path: &Path) -> io::Result<[u8; 32]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// A loaded trust anchor.
#[derive(Debug, Clone)]
pub struct PackageVerifier {
    key: VerifyingKey,
}

impl PackageVerifier {
    pub fn from_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Loads the key from certificate material.
    pub fn from_certificate(certificate: &TrustedCertificate) -> Result<Self, VerifyError> {
        let key = match certificate {
            TrustedCertificate::Bytes(bytes) => decode_public_key(bytes)?,
            TrustedCertificate::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| VerifyError::Io {
                    path: path.clone(),
                    source,
                })?;
                decode_public_key(&bytes)?
            }
        };
        Ok(Self { key })
    }

    /// Checks `file` against its detached signature, reporting the reason on failure.
    pub fn check(&self, file: &Path) -> Result<(), VerifyError> {
        let sig_path = signature_path(file);
        let sig_bytes = std::fs::read(&sig_path).map_err(|source| VerifyError::Io {
            path: sig_path.clone(),
            source,
        })?;
        let signature = decode_signature(&sig_bytes)?;
        let digest = file_digest(file).map_err(|source| VerifyError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        self.key
            .verify_strict(&digest, &signature)
            .map_err(|_| VerifyError::Mismatch(file.to_path_buf()))
    }

    /// Fail-closed form of [`check`](Self::check).
    pub fn verify_file(&self, file: &Path) -> bool {
        match self.check(file) {
            Ok(()) => true,
            Err(e) => {
                debug!(file = %file.display(), error = %e, "Signature verification failed");
                false
            }
        }
    }
}

/// Verifies `file` against `trusted_certificate`. Never fails; any problem yields `false`.
pub fn verify(trusted_certificate: &TrustedCertificate, file: &Path) -> bool {
    match PackageVerifier::from_certificate(trusted_certificate) {
        Ok(verifier) => verifier.verify_file(file),
        Err(e) => {
            debug!(file = %file.display(), error = %e, "Trusted key is unusable");
            false
        }
    }
}

pub fn verify_file_with_key_bytes(key: &[u8], file: &Path) -> bool {
    verify(&TrustedCertificate::Bytes(key.to_vec()), file)
}

pub fn verify_file_with_key_file(key_path: &Path, file: &Path) -> bool {
    verify(&TrustedCertificate::File(key_path.to_path_buf()), file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sign_file, test_signing_key};
    use ed25519_dalek::Signer;
    use tempfile::TempDir;

    fn signed_file(dir: &Path) -> PathBuf {
        let file = dir.join("dbghelp.dll");
        std::fs::write(&file, b"module bytes").unwrap();
        sign_file(&test_signing_key(7), &file);
        file
    }

    #[test]
    fn test_verify_accepts_every_key_encoding() {
        let temp = TempDir::new().unwrap();
        let file = signed_file(temp.path());
        let public = test_signing_key(7).verifying_key().to_bytes();

        let raw = public.to_vec();
        let hex_text = hex::encode(public).into_bytes();
        let b64 = STANDARD.encode(public).into_bytes();
        let mut spki = ED25519_SPKI_PREFIX.to_vec();
        spki.extend_from_slice(&public);
        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            STANDARD.encode(&spki)
        )
        .into_bytes();

        for material in [raw, hex_text, b64, pem] {
            assert!(verify_file_with_key_bytes(&material, &file));
        }
    }

    #[test]
    fn test_verify_with_key_file() {
        let temp = TempDir::new().unwrap();
        let file = signed_file(temp.path());
        let key_path = temp.path().join("trusted.pub");
        std::fs::write(&key_path, STANDARD.encode(test_signing_key(7).verifying_key().to_bytes()))
            .unwrap();

        assert!(verify_file_with_key_file(&key_path, &file));
        assert!(!verify_file_with_key_file(&temp.path().join("missing.pub"), &file));
    }

    #[test]
    fn test_verify_is_fail_closed() {
        let temp = TempDir::new().unwrap();
        let file = signed_file(temp.path());
        let other_key = test_signing_key(8).verifying_key().to_bytes();

        assert!(!verify_file_with_key_bytes(&other_key, &file));
        assert!(!verify_file_with_key_bytes(b"not a key", &file));
        assert!(!verify_file_with_key_bytes(&[], &file));

        let public = test_signing_key(7).verifying_key().to_bytes();
        assert!(!verify_file_with_key_bytes(&public, &temp.path().join("absent.dll")));

        // tampered content
        std::fs::write(&file, b"module bytes!").unwrap();
        assert!(!verify_file_with_key_bytes(&public, &file));
    }

    #[test]
    fn test_missing_or_garbled_signature() {
        let temp = TempDir::new().unwrap();
        let file = signed_file(temp.path());
        let verifier = PackageVerifier::from_key(test_signing_key(7).verifying_key());

        std::fs::write(signature_path(&file), b"!!!").unwrap();
        assert!(matches!(verifier.check(&file), Err(VerifyError::InvalidSignature(_))));

        std::fs::remove_file(signature_path(&file)).unwrap();
        assert!(matches!(verifier.check(&file), Err(VerifyError::Io { .. })));
    }

    #[test]
    fn test_raw_and_hex_signatures() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("pkg.zip");
        std::fs::write(&file, b"zip").unwrap();
        let key = test_signing_key(3);
        let signature = key.sign(&file_digest(&file).unwrap());
        let verifier = PackageVerifier::from_key(key.verifying_key());

        std::fs::write(signature_path(&file), signature.to_bytes()).unwrap();
        assert!(verifier.verify_file(&file));

        std::fs::write(signature_path(&file), hex::encode(signature.to_bytes())).unwrap();
        assert!(verifier.verify_file(&file));
    }

    #[test]
    fn test_signature_path_appends_extension() {
        assert_eq!(signature_path(Path::new("a/b.dll")), PathBuf::from("a/b.dll.sig"));
    }
}
