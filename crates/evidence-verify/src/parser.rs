//! Evidence blob parsing and format detection.
//!
//! A blob is first tried as a Sigstore bundle, the more specific format,
//! and only then as a bare DSSE envelope. Detection is structural: a
//! Sigstore bundle must carry a Sigstore bundle `mediaType` and a
//! `verificationMaterial` object before it is decoded as one. Once a blob
//! is detected as a bundle, decode errors are reported against the bundle.

use std::io::Read;

use evidence_model::{DecodedEvidence, DsseEnvelope, EvidenceMetadata};
use sigstore_verify::types::Bundle;

use crate::error::VerifyError;
use crate::source::EvidenceSource;

const SIGSTORE_BUNDLE_MEDIA_TYPE_PREFIX: &str = "application/vnd.dev.sigstore.bundle";

/// Turns an evidence record into decoded evidence.
pub trait EvidenceParsing {
    /// Fetch and decode the blob referenced by `metadata`.
    fn parse(&self, metadata: &EvidenceMetadata) -> Result<DecodedEvidence, VerifyError>;
}

/// Parses evidence blobs read from an [`EvidenceSource`].
pub struct EvidenceParser<'a> {
    source: &'a dyn EvidenceSource,
}

impl<'a> EvidenceParser<'a> {
    /// Create a parser reading blobs from `source`.
    pub fn new(source: &'a dyn EvidenceSource) -> Self {
        Self { source }
    }
}

impl EvidenceParsing for EvidenceParser<'_> {
    fn parse(&self, metadata: &EvidenceMetadata) -> Result<DecodedEvidence, VerifyError> {
        let path = metadata.download_path.as_str();
        if path.is_empty() {
            return Err(VerifyError::EmptyDownloadPath);
        }

        let mut bytes = Vec::new();
        self.source
            .read_remote_file(path)
            .and_then(|mut reader| reader.read_to_end(&mut bytes))
            .map_err(|source| VerifyError::Fetch {
                path: path.to_owned(),
                source,
            })?;

        let evidence = decode_evidence(&bytes, path)?;
        tracing::debug!(path, media_type = %evidence.media_type(), "parsed evidence");
        Ok(evidence)
    }
}

/// Decode raw blob bytes, Sigstore bundle first, then DSSE.
///
/// A document that declares itself a Sigstore bundle is never retried as a
/// DSSE envelope: if it does not decode, it is an invalid bundle.
pub fn decode_evidence(bytes: &[u8], path: &str) -> Result<DecodedEvidence, VerifyError> {
    let unsupported = || VerifyError::UnsupportedEvidence(path.to_owned());
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| {
        tracing::debug!(path, error = %e, "evidence is not JSON");
        unsupported()
    })?;

    if looks_like_sigstore_bundle(&value) {
        let bundle = serde_json::from_value::<Bundle>(value)
            .map_err(|e| VerifyError::InvalidBundle(e.to_string()))?;
        return Ok(DecodedEvidence::SigstoreBundle(Box::new(bundle)));
    }

    DsseEnvelope::from_slice(bytes)
        .map(DecodedEvidence::Dsse)
        .map_err(|e| {
            tracing::debug!(path, error = %e, "not a DSSE envelope");
            unsupported()
        })
}

fn looks_like_sigstore_bundle(value: &serde_json::Value) -> bool {
    let has_media_type = value
        .get("mediaType")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|mt| mt.starts_with(SIGSTORE_BUNDLE_MEDIA_TYPE_PREFIX));
    let has_material = value
        .get("verificationMaterial")
        .is_some_and(serde_json::Value::is_object);
    has_media_type && has_material
}
