//! Trust keys for DSSE signature verification.
//!
//! Keys are PEM-encoded PKIX public keys. The algorithm is inferred from
//! the key itself (RSA, ECDSA P-256/P-384, Ed25519), so a key file needs
//! no accompanying algorithm flag.

use std::fmt;
use std::path::Path;

use evidence_model::pem::{fingerprint, pem_to_der};
use sigstore::crypto::{CosignVerificationKey, Signature};

/// A public key able to verify DSSE signatures.
pub struct TrustedKey {
    key: CosignVerificationKey,
    fingerprint: String,
}

impl TrustedKey {
    /// Build a key from PEM text.
    ///
    /// Returns a description of the problem when the PEM cannot be decoded
    /// or holds an unsupported key type.
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        let der = pem_to_der(pem).map_err(|e| e.to_string())?;
        Self::from_spki_der(&der)
    }

    /// Build a key from `SubjectPublicKeyInfo` DER.
    fn from_spki_der(der: &[u8]) -> Result<Self, String> {
        let key = CosignVerificationKey::try_from_der(der)
            .map_err(|e| format!("unsupported public key: {e}"))?;
        Ok(Self {
            key,
            fingerprint: fingerprint(der),
        })
    }

    /// Read and decode a key file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let pem = std::fs::read_to_string(path).map_err(|e| format!("failed to read key: {e}"))?;
        Self::from_pem(&pem)
    }

    /// Hex SHA-256 of the key's SPKI DER.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Check `signature` (raw bytes) over `message`.
    pub fn verifies(&self, message: &[u8], signature: &[u8]) -> bool {
        self.key
            .verify_signature(Signature::Raw(signature), message)
            .is_ok()
    }
}

impl fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
