//! Subject checksum binding.
//!
//! An evidence is only meaningful for the artifact content it recorded.
//! The comparison is exact: both sides are expected to be lowercase hex
//! as produced by the repository.

use std::io::Read;
use std::path::Path;

use evidence_model::VerificationStatus;
use sha2::{Digest, Sha256};

use crate::error::VerifyError;

/// Compare the caller's subject digest with the digest recorded in the evidence.
///
/// An empty recorded digest never matches.
pub fn verify_checksum(subject_sha256: &str, evidence_subject_sha256: &str) -> VerificationStatus {
    VerificationStatus::from_bool(
        !evidence_subject_sha256.is_empty() && subject_sha256 == evidence_subject_sha256,
    )
}

/// Compute the SHA-256 hex digest of a file, streaming its content.
pub fn sha256_file(path: &Path) -> Result<String, VerifyError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 hex digest of a byte slice.
#[cfg(test)]
pub(crate) fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
