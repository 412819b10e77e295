//! DSSE (Dead Simple Signing Envelope) wire format.
//!
//! Signatures are computed over the pre-authentication encoding (PAE) of
//! the payload type and the decoded payload bytes, never over the JSON
//! serialization of the envelope.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A DSSE envelope as stored in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseEnvelope {
    /// Base64-encoded payload (usually an in-toto statement).
    pub payload: String,
    /// Media type of the decoded payload.
    pub payload_type: String,
    /// Signatures over `PAE(payload_type, payload)`, in envelope order.
    pub signatures: Vec<DsseSignature>,
}

/// One signature entry of a DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    /// Optional hint identifying the signing key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyid: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
}

impl DsseEnvelope {
    /// Parse an envelope from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode the payload into the exact bytes that were signed.
    pub fn decoded_payload(&self) -> Result<Vec<u8>, ModelError> {
        decode_base64(&self.payload, "payload")
    }

    /// The PAE message every signature of this envelope must cover.
    pub fn pae_message(&self) -> Result<Vec<u8>, ModelError> {
        let payload = self.decoded_payload()?;
        Ok(pae(&self.payload_type, &payload))
    }
}

impl DsseSignature {
    /// Decode the raw signature bytes.
    pub fn decoded_sig(&self) -> Result<Vec<u8>, ModelError> {
        decode_base64(&self.sig, "sig")
    }
}

/// DSSE v1 pre-authentication encoding.
///
/// `"DSSEv1" SP len(type) SP type SP len(body) SP body`, lengths in ASCII decimal.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

// DSSE producers disagree on the alphabet, so accept both.
fn decode_base64(value: &str, field: &'static str) -> Result<Vec<u8>, ModelError> {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE};

    STANDARD
        .decode(value)
        .or_else(|_| URL_SAFE.decode(value))
        .map_err(|source| ModelError::InvalidBase64 { field, source })
}
