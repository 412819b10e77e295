//! Sigstore bundle verification.
//!
//! A bundle is verified against the Sigstore trusted root and a
//! [`BundlePolicy`], with the caller's subject digest as the artifact the
//! bundle's in-toto statement must name. Policy and signature failures are
//! recorded on the evidence; a missing trust root or a structurally
//! unusable bundle aborts the run.

use std::cell::OnceCell;

use evidence_model::{EvidenceVerification, KeySource, SigstoreOutcome, VerificationStatus};
use serde::{Deserialize, Deserializer};
use sigstore_verify::VerificationPolicy;
use sigstore_verify::trust_root::TrustedRoot;
use sigstore_verify::types::bundle::{SignatureContent, VerificationMaterialContent};
use sigstore_verify::types::{Bundle, Sha256Hash};

use crate::error::VerifyError;
use crate::trust::TrustRootProvider;

/// Verifies the Sigstore bundle held by an evidence result.
pub trait SigstoreVerification {
    /// Record the bundle outcome on `result`.
    fn verify(
        &self,
        subject_sha256: &str,
        result: &mut EvidenceVerification,
    ) -> Result<(), VerifyError>;
}

/// Minimum counts of independent attestations a bundle must carry.
///
/// A transparency log or observer threshold of `0` disables that check.
/// The certificate chain is always verified, so the SCT threshold only
/// accepts `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlePolicy {
    /// Signed certificate timestamps on the signing certificate.
    #[serde(deserialize_with = "deserialize_sct_threshold")]
    pub signed_certificate_timestamps: u32,
    /// Observer timestamps (log integration times or RFC 3161 tokens).
    pub observer_timestamps: u32,
    /// Transparency log entries.
    pub transparency_log_entries: u32,
}

impl Default for BundlePolicy {
    fn default() -> Self {
        Self {
            signed_certificate_timestamps: 1,
            observer_timestamps: 1,
            transparency_log_entries: 1,
        }
    }
}

fn sct_threshold_error(value: u32) -> String {
    format!(
        "signed_certificate_timestamps must be 1 (got {value}): the certificate chain is always \
         verified and SCTs are not counted"
    )
}

fn deserialize_sct_threshold<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u32::deserialize(deserializer)?;
    if value == 1 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(sct_threshold_error(value)))
    }
}

impl BundlePolicy {
    /// Reject thresholds the verifier cannot enforce.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.signed_certificate_timestamps != 1 {
            return Err(VerifyError::InvalidPolicy(sct_threshold_error(
                self.signed_certificate_timestamps,
            )));
        }
        Ok(())
    }

    /// Translate the thresholds into a cryptographic verification policy.
    ///
    /// The certificate check is never skipped.
    pub fn verification_policy(&self) -> Result<VerificationPolicy, VerifyError> {
        self.validate()?;
        let mut policy = VerificationPolicy::default();
        if self.transparency_log_entries == 0 {
            policy = policy.skip_tlog();
        }
        if self.observer_timestamps == 0 {
            policy = policy.skip_timestamp();
        }
        Ok(policy)
    }

    /// Check the counted thresholds the cryptographic policy cannot express.
    fn check_counts(&self, bundle: &Bundle) -> Result<(), String> {
        let material = &bundle.verification_material;
        let tlog_count = material.tlog_entries.len();
        if tlog_count < self.transparency_log_entries as usize {
            return Err(format!(
                "bundle has {tlog_count} transparency log entries, policy requires {}",
                self.transparency_log_entries
            ));
        }

        let rfc3161 = material.timestamp_verification_data.rfc3161_timestamps.len();
        let integrated = material
            .tlog_entries
            .iter()
            .filter(|e| e.integrated_time > 0)
            .count();
        let observed = rfc3161 + integrated;
        if observed < self.observer_timestamps as usize {
            return Err(format!(
                "bundle has {observed} observer timestamps, policy requires {}",
                self.observer_timestamps
            ));
        }
        Ok(())
    }
}

/// Reject bundles that can never verify as DSSE evidence.
fn check_structure(bundle: &Bundle) -> Result<(), VerifyError> {
    if !matches!(bundle.content, SignatureContent::DsseEnvelope(_)) {
        return Err(VerifyError::InvalidBundle(
            "bundle carries a message signature, not a DSSE envelope".to_owned(),
        ));
    }
    if matches!(
        &bundle.verification_material.content,
        VerificationMaterialContent::X509CertificateChain { certificates } if certificates.is_empty()
    ) {
        return Err(VerifyError::InvalidBundle("empty certificate chain".to_owned()));
    }
    Ok(())
}

/// Cryptographic verification of one bundle against a trusted root.
pub trait BundleCheck {
    /// Verify `bundle` for the artifact `digest`. An `Err` carries the
    /// reason the bundle did not verify.
    fn check(
        &self,
        digest: Sha256Hash,
        bundle: &Bundle,
        policy: &VerificationPolicy,
        root: &TrustedRoot,
    ) -> Result<SigstoreOutcome, String>;
}

/// [`BundleCheck`] backed by `sigstore_verify::verify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigstoreBundleCheck;

impl BundleCheck for SigstoreBundleCheck {
    fn check(
        &self,
        digest: Sha256Hash,
        bundle: &Bundle,
        policy: &VerificationPolicy,
        root: &TrustedRoot,
    ) -> Result<SigstoreOutcome, String> {
        match sigstore_verify::verify(digest, bundle, policy, root) {
            Ok(res) if res.success => Ok(SigstoreOutcome {
                identity: res.identity,
                issuer: res.issuer,
                integrated_time: res.integrated_time,
                warnings: res.warnings,
            }),
            Ok(_) => Err("Sigstore verification did not succeed".to_owned()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Sigstore verifier with a lazily loaded trust root.
pub struct SigstoreVerifier {
    provider: Box<dyn TrustRootProvider>,
    policy: BundlePolicy,
    check: Box<dyn BundleCheck>,
    trusted_root: OnceCell<TrustedRoot>,
}

impl SigstoreVerifier {
    /// Create a verifier; the trust root is loaded on the first bundle.
    pub fn new(provider: Box<dyn TrustRootProvider>, policy: BundlePolicy) -> Self {
        Self::with_bundle_check(provider, policy, Box::new(SigstoreBundleCheck))
    }

    /// Create a verifier that delegates the cryptographic check to `check`.
    pub fn with_bundle_check(
        provider: Box<dyn TrustRootProvider>,
        policy: BundlePolicy,
        check: Box<dyn BundleCheck>,
    ) -> Self {
        Self {
            provider,
            policy,
            check,
            trusted_root: OnceCell::new(),
        }
    }

    fn trusted_root(&self) -> Result<&TrustedRoot, VerifyError> {
        if let Some(root) = self.trusted_root.get() {
            return Ok(root);
        }
        let root = self.provider.load_trusted_root()?;
        Ok(self.trusted_root.get_or_init(|| root))
    }

    fn check_bundle(
        &self,
        subject_sha256: &str,
        bundle: &Bundle,
    ) -> Result<Result<SigstoreOutcome, String>, VerifyError> {
        check_structure(bundle)?;
        let policy = self.policy.verification_policy()?;

        let root = self.trusted_root()?;
        let digest = Sha256Hash::from_hex(subject_sha256)
            .map_err(|e| VerifyError::InvalidDigest(format!("{subject_sha256}: {e}")))?;

        let outcome = self
            .check
            .check(digest, bundle, &policy, root)
            .and_then(|details| self.policy.check_counts(bundle).map(|()| details));
        Ok(outcome)
    }
}

impl SigstoreVerification for SigstoreVerifier {
    fn verify(
        &self,
        subject_sha256: &str,
        result: &mut EvidenceVerification,
    ) -> Result<(), VerifyError> {
        let bundle = result.sigstore_bundle().ok_or_else(|| {
            VerifyError::InvalidInput(format!(
                "evidence {} holds no Sigstore bundle",
                result.download_path
            ))
        })?;

        let outcome = self.check_bundle(subject_sha256, bundle)?;
        let r = &mut result.verification_result;
        match outcome {
            Ok(details) => {
                tracing::info!(
                    path = %result.download_path,
                    identity = details.identity.as_deref().unwrap_or("-"),
                    "Sigstore bundle verified"
                );
                r.sigstore_bundle_verification_status = Some(VerificationStatus::Success);
                r.key_source = Some(KeySource::SigstoreBundle);
                r.sigstore = Some(details);
            }
            Err(reason) => {
                tracing::info!(path = %result.download_path, reason = %reason, "Sigstore bundle not verified");
                r.sigstore_bundle_verification_status = Some(VerificationStatus::Failed);
                r.failure_reason = Some(reason);
            }
        }
        Ok(())
    }
}
