//! PEM and SPKI helpers for public key material.
//!
//! The encoders are only compiled for tests, or with the `test-support`
//! feature, where they turn freshly generated key pairs into PEM files.

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::ModelError;

/// Wrap DER bytes in PEM with the given label.
#[cfg(any(test, feature = "test-support"))]
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    use std::fmt::Write;

    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.extend(chunk.iter().copied().map(char::from));
        pem.push('\n');
    }
    let _ = writeln!(pem, "-----END {label}-----");
    pem
}

/// Extract the DER body of the first PEM block in `pem`.
///
/// Text before the `BEGIN` line is ignored, so key files carrying a
/// comment header still load.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>, ModelError> {
    let mut b64 = String::new();
    let mut in_body = false;
    let mut closed = false;

    for line in pem.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("-----BEGIN ") {
            in_body = true;
            continue;
        }
        if trimmed.starts_with("-----END ") {
            closed = in_body;
            break;
        }
        if in_body {
            b64.push_str(trimmed);
        }
    }

    if !closed {
        return Err(ModelError::InvalidPem("no complete PEM block found".to_owned()));
    }
    if b64.is_empty() {
        return Err(ModelError::InvalidPem("PEM block is empty".to_owned()));
    }

    base64::engine::general_purpose::STANDARD
        .decode(&b64)
        .map_err(|e| ModelError::InvalidPem(format!("bad base64 body: {e}")))
}

/// Fingerprint of a public key: lowercase hex SHA-256 of its SPKI DER.
pub fn fingerprint(spki_der: &[u8]) -> String {
    hex::encode(Sha256::digest(spki_der))
}

/// Encode a raw P-256 public key (uncompressed point, 65 bytes) as
/// `SubjectPublicKeyInfo` DER.
#[cfg(any(test, feature = "test-support"))]
pub fn encode_p256_spki(point: &[u8]) -> Vec<u8> {
    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 26] = [
        0x30, 0x59,                                     // SEQUENCE (89 bytes)
        0x30, 0x13,                                     // SEQUENCE (19 bytes)
        0x06, 0x07,                                     // OID (7 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01,       // 1.2.840.10045.2.1 id-ecPublicKey
        0x06, 0x08,                                     // OID (8 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, // 1.2.840.10045.3.1.7 prime256v1
        0x03, 0x42, 0x00,                               // BIT STRING (66 bytes)
    ];

    [SPKI_HEADER.as_slice(), point].concat()
}

/// Encode a raw Ed25519 public key (32 bytes) as `SubjectPublicKeyInfo` DER.
#[cfg(any(test, feature = "test-support"))]
pub fn encode_ed25519_spki(key: &[u8]) -> Vec<u8> {
    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 12] = [
        0x30, 0x2a,                   // SEQUENCE (42 bytes)
        0x30, 0x05,                   // SEQUENCE (5 bytes)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 id-Ed25519
        0x03, 0x21, 0x00,             // BIT STRING (33 bytes)
    ];

    [SPKI_HEADER.as_slice(), key].concat()
}
