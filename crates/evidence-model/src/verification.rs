//! Per-evidence verification results and the aggregate report.
//!
//! An [`EvidenceVerification`] is created once an evidence blob has been
//! decoded and is then filled in by the checksum check and exactly one
//! signature verifier. [`VerificationResponse`] collects them in input
//! order together with the fail-closed overall status.

use std::fmt;

use serde::Serialize;
use sigstore_verify::types::Bundle;

use crate::dsse::DsseEnvelope;
use crate::metadata::EvidenceMetadata;

/// Version of the report layout. Bump whenever the JSON shape changes.
pub const SCHEMA_VERSION: &str = "1.0";

/// Outcome of one verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// The check passed.
    Success,
    /// The check ran and did not pass.
    Failed,
}

impl VerificationStatus {
    /// `Success` when `ok`, `Failed` otherwise.
    pub const fn from_bool(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failed }
    }

    /// Returns `true` for [`VerificationStatus::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Lowercase label used in every report format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope format of a decoded evidence blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    /// A bare DSSE envelope verified against trust keys.
    #[serde(rename = "dsse")]
    SimpleDsse,
    /// A Sigstore bundle verified against the Sigstore trust root.
    #[serde(rename = "sigstore-bundle")]
    SigstoreBundle,
}

impl MediaType {
    /// Label used in every report format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimpleDsse => "dsse",
            Self::SigstoreBundle => "sigstore-bundle",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the key that verified an evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeySource {
    /// A key file supplied by the caller.
    #[serde(rename = "User Provided Key")]
    UserProvided,
    /// The public key the repository stored next to the evidence.
    #[serde(rename = "Artifactory Key")]
    Artifactory,
    /// The certificate or key embedded in a Sigstore bundle.
    #[serde(rename = "Sigstore Bundle Key")]
    SigstoreBundle,
}

impl KeySource {
    /// Human-readable label, identical to the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserProvided => "User Provided Key",
            Self::Artifactory => "Artifactory Key",
            Self::SigstoreBundle => "Sigstore Bundle Key",
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded evidence blob. Exactly one format is ever held.
#[derive(Debug, Clone, Serialize)]
pub enum DecodedEvidence {
    /// A bare DSSE envelope.
    #[serde(rename = "dsseEnvelope")]
    Dsse(DsseEnvelope),
    /// A Sigstore bundle.
    #[serde(rename = "sigstoreBundle")]
    SigstoreBundle(Box<Bundle>),
}

impl DecodedEvidence {
    /// The media type implied by the variant.
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::Dsse(_) => MediaType::SimpleDsse,
            Self::SigstoreBundle(_) => MediaType::SigstoreBundle,
        }
    }
}

/// Signer details reported by a successful Sigstore verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigstoreOutcome {
    /// Certificate identity (SAN), when the bundle carries a certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// OIDC issuer of the signing certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Transparency log integration time (Unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated_time: Option<i64>,
    /// Non-fatal findings from the verifier.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The checks recorded for one evidence.
///
/// Only the signature status matching the evidence's media type is
/// meaningful; the other one stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceVerificationResult {
    /// Recorded subject digest vs. the caller's subject digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_verification_status: Option<VerificationStatus>,
    /// DSSE signature check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures_verification_status: Option<VerificationStatus>,
    /// Sigstore bundle check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigstore_bundle_verification_status: Option<VerificationStatus>,
    /// Which key tier verified the signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_source: Option<KeySource>,
    /// Hex SHA-256 of the verifying key's SPKI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    /// Why a soft verification failure happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Signer details from a successful Sigstore verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigstore: Option<SigstoreOutcome>,
}

/// Verification state of one evidence record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceVerification {
    /// Repository path the evidence was read from.
    pub download_path: String,
    /// Subject digest recorded in the evidence metadata.
    #[serde(rename = "evidenceSubjectSha256")]
    pub subject_checksum: String,
    /// Predicate type URI.
    pub predicate_type: String,
    /// Identity that created the evidence.
    pub created_by: String,
    /// Creation timestamp as reported by the repository.
    pub created_at: String,
    media_type: MediaType,
    #[serde(flatten)]
    evidence: DecodedEvidence,
    /// Accumulated check results.
    pub verification_result: EvidenceVerificationResult,
}

impl EvidenceVerification {
    /// Start a result for `metadata` holding the decoded `evidence`.
    pub fn new(metadata: &EvidenceMetadata, evidence: DecodedEvidence) -> Self {
        Self {
            download_path: metadata.download_path.clone(),
            subject_checksum: metadata.subject.sha256.clone(),
            predicate_type: metadata.predicate_type.clone(),
            created_by: metadata.created_by.clone(),
            created_at: metadata.created_at.clone(),
            media_type: evidence.media_type(),
            evidence,
            verification_result: EvidenceVerificationResult::default(),
        }
    }

    /// Format of the decoded evidence.
    pub const fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// The DSSE envelope, if this is a DSSE evidence.
    pub fn dsse_envelope(&self) -> Option<&DsseEnvelope> {
        match &self.evidence {
            DecodedEvidence::Dsse(env) => Some(env),
            DecodedEvidence::SigstoreBundle(_) => None,
        }
    }

    /// The Sigstore bundle, if this is a Sigstore evidence.
    pub fn sigstore_bundle(&self) -> Option<&Bundle> {
        match &self.evidence {
            DecodedEvidence::SigstoreBundle(bundle) => Some(bundle),
            DecodedEvidence::Dsse(_) => None,
        }
    }

    /// The signature status that counts for this evidence's media type.
    pub const fn signature_status(&self) -> Option<VerificationStatus> {
        match self.media_type {
            MediaType::SimpleDsse => self.verification_result.signatures_verification_status,
            MediaType::SigstoreBundle => {
                self.verification_result.sigstore_bundle_verification_status
            }
        }
    }

    /// Checksum and signature both passed.
    pub fn is_verified(&self) -> bool {
        self.verification_result.sha256_verification_status == Some(VerificationStatus::Success)
            && self.signature_status() == Some(VerificationStatus::Success)
    }
}

/// The subject artifact a report is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Repository path of the subject, as given by the caller.
    pub path: String,
    /// Hex SHA-256 of the subject's current content.
    pub sha256: String,
}

/// Aggregate verification report for one subject.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// The verified subject.
    pub subject: Subject,
    /// One entry per evidence record, in input order.
    pub evidence_verifications: Vec<EvidenceVerification>,
    /// `Success` only when every entry verified.
    pub overall_verification_status: VerificationStatus,
}

impl VerificationResponse {
    /// Number of evidence entries that fully verified.
    pub fn verified_count(&self) -> usize {
        self.evidence_verifications
            .iter()
            .filter(|v| v.is_verified())
            .count()
    }

    /// Returns `true` when the overall status is `Failed`.
    pub const fn is_failed(&self) -> bool {
        matches!(self.overall_verification_status, VerificationStatus::Failed)
    }
}
