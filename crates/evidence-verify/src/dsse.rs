//! DSSE envelope verification with two-tier key resolution.
//!
//! Local keys supplied by the caller are tried first. Only when none of
//! them verifies, and only when the caller allows it, is the public key
//! the repository stored next to the evidence tried. The first key and
//! signature pair that verifies wins; nothing after it is consulted.

use std::cell::OnceCell;
use std::path::PathBuf;

use evidence_model::{
    DsseEnvelope, EvidenceMetadata, EvidenceVerification, KeySource, VerificationStatus,
};

use crate::error::VerifyError;
use crate::keys::TrustedKey;

/// Verifies the DSSE envelope held by an evidence result.
pub trait DsseVerification {
    /// Record the signature outcome on `result`.
    ///
    /// A signature that does not verify is recorded as `Failed`; `Err` is
    /// reserved for key material that cannot be loaded at all.
    fn verify(
        &self,
        subject_sha256: &str,
        metadata: &EvidenceMetadata,
        result: &mut EvidenceVerification,
    ) -> Result<(), VerifyError>;
}

/// Supplies the repository-embedded keys for an evidence record.
pub trait ArtifactoryKeyProvider {
    /// Keys to try for `metadata`. An empty list is not an error.
    fn keys_for(&self, metadata: &EvidenceMetadata) -> Result<Vec<TrustedKey>, VerifyError>;
}

/// Reads the `signingKey.publicKey` PEM stored in the evidence metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedKeyProvider;

impl ArtifactoryKeyProvider for EmbeddedKeyProvider {
    fn keys_for(&self, metadata: &EvidenceMetadata) -> Result<Vec<TrustedKey>, VerifyError> {
        let Some(pem) = metadata.embedded_public_key() else {
            return Ok(Vec::new());
        };
        let key = TrustedKey::from_pem(pem).map_err(|reason| VerifyError::ArtifactoryKey {
            predicate_type: metadata.predicate_type.clone(),
            reason,
        })?;
        Ok(vec![key])
    }
}

/// DSSE verifier holding the caller's key configuration.
pub struct DsseVerifier {
    key_paths: Vec<PathBuf>,
    use_artifactory_keys: bool,
    artifactory_keys: Box<dyn ArtifactoryKeyProvider>,
    local_keys: OnceCell<Vec<TrustedKey>>,
}

impl DsseVerifier {
    /// Create a verifier for the given local key files.
    ///
    /// Empty paths are skipped. Files are read lazily, on first use.
    pub fn new(key_paths: Vec<PathBuf>, use_artifactory_keys: bool) -> Self {
        Self::with_key_provider(key_paths, use_artifactory_keys, Box::new(EmbeddedKeyProvider))
    }

    /// Create a verifier with a custom source of repository-embedded keys.
    pub fn with_key_provider(
        key_paths: Vec<PathBuf>,
        use_artifactory_keys: bool,
        artifactory_keys: Box<dyn ArtifactoryKeyProvider>,
    ) -> Self {
        Self {
            key_paths,
            use_artifactory_keys,
            artifactory_keys,
            local_keys: OnceCell::new(),
        }
    }

    /// The local keys, loaded once per verifier.
    fn local_keys(&self) -> Result<&[TrustedKey], VerifyError> {
        if let Some(keys) = self.local_keys.get() {
            return Ok(keys);
        }

        let mut keys = Vec::with_capacity(self.key_paths.len());
        for path in &self.key_paths {
            if path.as_os_str().is_empty() {
                continue;
            }
            let key = TrustedKey::from_file(path).map_err(|reason| VerifyError::KeyLoad {
                path: path.display().to_string(),
                reason,
            })?;
            tracing::info!(path = %path.display(), fingerprint = key.fingerprint(), "loaded trust key");
            keys.push(key);
        }
        Ok(self.local_keys.get_or_init(|| keys))
    }
}

impl DsseVerification for DsseVerifier {
    fn verify(
        &self,
        _subject_sha256: &str,
        metadata: &EvidenceMetadata,
        result: &mut EvidenceVerification,
    ) -> Result<(), VerifyError> {
        let envelope = result
            .dsse_envelope()
            .ok_or_else(|| {
                VerifyError::InvalidInput(format!(
                    "evidence {} holds no DSSE envelope",
                    result.download_path
                ))
            })?
            .clone();

        let message = match envelope.pae_message() {
            Ok(message) => message,
            Err(e) => {
                record_failure(result, format!("invalid DSSE envelope: {e}"));
                return Ok(());
            }
        };

        let local = self.local_keys()?;
        if let Some(key) = find_verifying_key(local, &envelope, &message) {
            record_success(result, KeySource::UserProvided, key.fingerprint());
            return Ok(());
        }

        if !self.use_artifactory_keys {
            let reason = if local.is_empty() {
                "no trust keys configured".to_owned()
            } else {
                format!("none of the {} provided keys verified the envelope", local.len())
            };
            record_failure(result, reason);
            return Ok(());
        }

        let embedded = self.artifactory_keys.keys_for(metadata)?;
        if let Some(key) = find_verifying_key(&embedded, &envelope, &message) {
            record_success(result, KeySource::Artifactory, key.fingerprint());
            return Ok(());
        }

        let tried = local.len() + embedded.len();
        let reason = if tried == 0 {
            "no trust keys available for this evidence".to_owned()
        } else {
            format!("none of the {tried} available keys verified the envelope")
        };
        record_failure(result, reason);
        Ok(())
    }
}

/// First key, in order, that verifies any of the envelope's signatures.
fn find_verifying_key<'k>(
    keys: &'k [TrustedKey],
    envelope: &DsseEnvelope,
    message: &[u8],
) -> Option<&'k TrustedKey> {
    let signatures: Vec<Vec<u8>> = envelope
        .signatures
        .iter()
        .filter_map(|s| match s.decoded_sig() {
            Ok(sig) => Some(sig),
            Err(e) => {
                tracing::debug!(keyid = %s.keyid, error = %e, "skipping undecodable signature");
                None
            }
        })
        .collect();

    keys.iter()
        .find(|key| signatures.iter().any(|sig| key.verifies(message, sig)))
}

fn record_success(result: &mut EvidenceVerification, source: KeySource, fingerprint: &str) {
    tracing::info!(
        path = %result.download_path,
        key_source = %source,
        fingerprint,
        "DSSE signature verified"
    );
    let r = &mut result.verification_result;
    r.signatures_verification_status = Some(VerificationStatus::Success);
    r.key_source = Some(source);
    r.key_fingerprint = Some(fingerprint.to_owned());
}

fn record_failure(result: &mut EvidenceVerification, reason: String) {
    tracing::info!(path = %result.download_path, reason = %reason, "DSSE signature not verified");
    let r = &mut result.verification_result;
    r.signatures_verification_status = Some(VerificationStatus::Failed);
    r.failure_reason = Some(reason);
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use base64::Engine;
    use evidence_model::{DecodedEvidence, DsseSignature, SigningKey, dsse::pae};

    use super::*;
    use crate::keys::test_keys::TestKey;

    const PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
    const PAYLOAD: &[u8] = br#"{"_type":"https://in-toto.io/Statement/v1"}"#;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn envelope_signed_by(signers: &[&TestKey]) -> DsseEnvelope {
        let message = pae(PAYLOAD_TYPE, PAYLOAD);
        DsseEnvelope {
            payload: b64(PAYLOAD),
            payload_type: PAYLOAD_TYPE.to_owned(),
            signatures: signers
                .iter()
                .map(|s| DsseSignature {
                    keyid: String::new(),
                    sig: b64(&s.sign(&message)),
                })
                .collect(),
        }
    }

    fn metadata(embedded: Option<&TestKey>) -> EvidenceMetadata {
        EvidenceMetadata {
            download_path: "repo/.evidence/e.json".to_owned(),
            predicate_type: "https://slsa.dev/provenance/v1".to_owned(),
            signing_key: embedded.map(|k| SigningKey {
                alias: "ci".to_owned(),
                public_key: k.public_pem(),
            }),
            ..Default::default()
        }
    }

    fn result_for(meta: &EvidenceMetadata, env: DsseEnvelope) -> EvidenceVerification {
        EvidenceVerification::new(meta, DecodedEvidence::Dsse(env))
    }

    fn write_keys(dir: &std::path::Path, keys: &[&TestKey]) -> Vec<PathBuf> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| {
                let path = dir.join(format!("key{i}.pem"));
                std::fs::write(&path, k.public_pem()).expect("write key");
                path
            })
            .collect()
    }

    /// Counts how often the embedded-key tier is consulted.
    struct CountingProvider {
        calls: Rc<Cell<usize>>,
    }

    impl ArtifactoryKeyProvider for CountingProvider {
        fn keys_for(&self, metadata: &EvidenceMetadata) -> Result<Vec<TrustedKey>, VerifyError> {
            self.calls.set(self.calls.get() + 1);
            EmbeddedKeyProvider.keys_for(metadata)
        }
    }

    #[test]
    fn second_local_key_verifies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let unrelated = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&unrelated, &signer]);

        let meta = metadata(None);
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        DsseVerifier::new(paths, false)
            .verify("", &meta, &mut result)
            .expect("verify");

        let r = &result.verification_result;
        assert_eq!(r.signatures_verification_status, Some(VerificationStatus::Success));
        assert_eq!(r.key_source, Some(KeySource::UserProvided));
        let expected = TrustedKey::from_pem(&signer.public_pem()).expect("load");
        assert_eq!(r.key_fingerprint.as_deref(), Some(expected.fingerprint()));
    }

    #[test]
    fn any_envelope_signature_may_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ed25519();
        let stranger = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&signer]);

        let meta = metadata(None);
        let mut result = result_for(&meta, envelope_signed_by(&[&stranger, &signer]));
        DsseVerifier::new(paths, false)
            .verify("", &meta, &mut result)
            .expect("verify");
        assert_eq!(
            result.verification_result.signatures_verification_status,
            Some(VerificationStatus::Success)
        );
    }

    #[test]
    fn local_match_never_consults_embedded_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&signer]);
        let calls = Rc::new(Cell::new(0));

        let verifier = DsseVerifier::with_key_provider(
            paths,
            true,
            Box::new(CountingProvider {
                calls: Rc::clone(&calls),
            }),
        );
        let meta = metadata(Some(&signer));
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        verifier.verify("", &meta, &mut result).expect("verify");

        assert_eq!(calls.get(), 0);
        assert_eq!(result.verification_result.key_source, Some(KeySource::UserProvided));
    }

    #[test]
    fn embedded_key_used_when_local_keys_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&TestKey::ecdsa()]);

        let meta = metadata(Some(&signer));
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        DsseVerifier::new(paths, true)
            .verify("", &meta, &mut result)
            .expect("verify");

        let r = &result.verification_result;
        assert_eq!(r.signatures_verification_status, Some(VerificationStatus::Success));
        assert_eq!(r.key_source, Some(KeySource::Artifactory));
    }

    #[test]
    fn restricted_to_local_keys_ignores_embedded_key() {
        let signer = TestKey::ecdsa();
        let calls = Rc::new(Cell::new(0));
        let verifier = DsseVerifier::with_key_provider(
            Vec::new(),
            false,
            Box::new(CountingProvider {
                calls: Rc::clone(&calls),
            }),
        );

        let meta = metadata(Some(&signer));
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        verifier.verify("", &meta, &mut result).expect("verify");

        assert_eq!(calls.get(), 0);
        let r = &result.verification_result;
        assert_eq!(r.signatures_verification_status, Some(VerificationStatus::Failed));
        assert!(r.key_source.is_none());
        assert!(r.failure_reason.is_some());
    }

    #[test]
    fn missing_embedded_key_is_a_soft_failure() {
        let signer = TestKey::ecdsa();
        let meta = metadata(None);
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        DsseVerifier::new(Vec::new(), true)
            .verify("", &meta, &mut result)
            .expect("verify");
        assert_eq!(
            result.verification_result.signatures_verification_status,
            Some(VerificationStatus::Failed)
        );
    }

    #[test]
    fn undecodable_embedded_key_is_a_hard_error() {
        let signer = TestKey::ecdsa();
        let mut meta = metadata(None);
        meta.signing_key = Some(SigningKey {
            alias: "broken".to_owned(),
            public_key: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".to_owned(),
        });
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        let err = DsseVerifier::new(Vec::new(), true)
            .verify("", &meta, &mut result)
            .expect_err("should fail");
        assert!(matches!(err, VerifyError::ArtifactoryKey { .. }));
    }

    #[test]
    fn unreadable_local_key_is_a_hard_error() {
        let signer = TestKey::ecdsa();
        let meta = metadata(None);
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        let err = DsseVerifier::new(vec![PathBuf::from("/nonexistent/key.pem")], true)
            .verify("", &meta, &mut result)
            .expect_err("should fail");
        assert!(matches!(err, VerifyError::KeyLoad { ref path, .. } if path.contains("key.pem")));
    }

    #[test]
    fn empty_key_paths_are_skipped() {
        let signer = TestKey::ecdsa();
        let meta = metadata(Some(&signer));
        let mut result = result_for(&meta, envelope_signed_by(&[&signer]));
        DsseVerifier::new(vec![PathBuf::new()], true)
            .verify("", &meta, &mut result)
            .expect("verify");
        assert_eq!(result.verification_result.key_source, Some(KeySource::Artifactory));
    }

    #[test]
    fn local_keys_are_loaded_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&signer]);
        let verifier = DsseVerifier::new(paths.clone(), false);

        let meta = metadata(None);
        let mut first = result_for(&meta, envelope_signed_by(&[&signer]));
        verifier.verify("", &meta, &mut first).expect("verify");

        // Removing the file after the first load must not matter.
        std::fs::remove_file(&paths[0]).expect("remove");
        let mut second = result_for(&meta, envelope_signed_by(&[&signer]));
        verifier.verify("", &meta, &mut second).expect("verify");
        assert_eq!(
            second.verification_result.signatures_verification_status,
            Some(VerificationStatus::Success)
        );
    }

    #[test]
    fn tampered_payload_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let paths = write_keys(dir.path(), &[&signer]);

        let mut env = envelope_signed_by(&[&signer]);
        env.payload = b64(b"{\"tampered\":true}");
        let meta = metadata(None);
        let mut result = result_for(&meta, env);
        DsseVerifier::new(paths, false)
            .verify("", &meta, &mut result)
            .expect("verify");
        assert_eq!(
            result.verification_result.signatures_verification_status,
            Some(VerificationStatus::Failed)
        );
    }
}
