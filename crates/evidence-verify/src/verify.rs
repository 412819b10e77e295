//! Top-level verification orchestrator.
//!
//! The `EvidenceVerifier` walks the evidence records of one subject in
//! order: parse the blob, bind it to the subject checksum, verify its
//! signature with the verifier matching its format, and fold the outcome
//! into a fail-closed [`VerificationResponse`].

use std::path::PathBuf;

use evidence_model::{
    DecodedEvidence, EvidenceMetadata, EvidenceVerification, SCHEMA_VERSION, Subject,
    VerificationResponse, VerificationStatus,
};

use crate::checksum::verify_checksum;
use crate::dsse::{DsseVerification, DsseVerifier};
use crate::error::VerifyError;
use crate::parser::{EvidenceParser, EvidenceParsing};
use crate::sigstore::{BundlePolicy, SigstoreVerification, SigstoreVerifier};
use crate::source::EvidenceSource;
use crate::trust::TrustRootProvider;

/// Configuration for a verification run.
#[derive(Debug, Clone, Default)]
pub struct VerifyConfig {
    /// Local public key files, tried in order before any other key.
    pub key_paths: Vec<PathBuf>,
    /// Fall back to the public key the repository stored with the evidence.
    pub use_artifactory_keys: bool,
    /// Thresholds for Sigstore bundles.
    pub bundle_policy: BundlePolicy,
}

/// Receives progress notifications. Cannot influence the results.
pub trait ProgressSink {
    /// Called once, before the first record, with the number of records.
    fn start(&self, total: usize);
    /// Called after each record has been fully processed.
    fn inc(&self);
}

/// Orchestrates parsing and verification of all evidence for a subject.
pub struct EvidenceVerifier<'a> {
    parser: Box<dyn EvidenceParsing + 'a>,
    dsse: Box<dyn DsseVerification + 'a>,
    sigstore: Box<dyn SigstoreVerification + 'a>,
    progress: Option<&'a dyn ProgressSink>,
}

impl<'a> EvidenceVerifier<'a> {
    /// Build the standard verifier reading blobs from `source`.
    pub fn new(
        config: VerifyConfig,
        source: &'a dyn EvidenceSource,
        trust_root: Box<dyn TrustRootProvider>,
    ) -> Self {
        Self::from_parts(
            Box::new(EvidenceParser::new(source)),
            Box::new(DsseVerifier::new(config.key_paths, config.use_artifactory_keys)),
            Box::new(SigstoreVerifier::new(trust_root, config.bundle_policy)),
        )
    }

    /// Assemble a verifier from individual stages.
    pub fn from_parts(
        parser: Box<dyn EvidenceParsing + 'a>,
        dsse: Box<dyn DsseVerification + 'a>,
        sigstore: Box<dyn SigstoreVerification + 'a>,
    ) -> Self {
        Self {
            parser,
            dsse,
            sigstore,
            progress: None,
        }
    }

    /// Report progress to `sink`.
    #[must_use]
    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Verify every evidence record of the subject.
    ///
    /// Records are processed sequentially and reported in input order. A
    /// record that cannot be parsed aborts the whole run.
    pub fn verify(
        &self,
        subject_sha256: &str,
        metadata: Option<&[EvidenceMetadata]>,
        subject_path: &str,
    ) -> Result<VerificationResponse, VerifyError> {
        let records = match metadata {
            Some(records) if !records.is_empty() => records,
            _ => return Err(VerifyError::NoEvidence),
        };

        tracing::info!(subject = subject_path, count = records.len(), "verifying evidence");
        if let Some(sink) = self.progress {
            sink.start(records.len());
        }

        let mut verifications = Vec::with_capacity(records.len());
        let mut overall = VerificationStatus::Success;
        for record in records {
            let verification = self.verify_one(subject_sha256, record)?;
            // An evidence counts only once every check has positively passed.
            if !verification.is_verified() {
                overall = VerificationStatus::Failed;
            }
            verifications.push(verification);
            if let Some(sink) = self.progress {
                sink.inc();
            }
        }

        tracing::info!(
            subject = subject_path,
            status = %overall,
            "evidence verification finished"
        );
        Ok(VerificationResponse {
            schema_version: SCHEMA_VERSION.to_owned(),
            subject: Subject {
                path: subject_path.to_owned(),
                sha256: subject_sha256.to_owned(),
            },
            evidence_verifications: verifications,
            overall_verification_status: overall,
        })
    }

    fn verify_one(
        &self,
        subject_sha256: &str,
        record: &EvidenceMetadata,
    ) -> Result<EvidenceVerification, VerifyError> {
        let evidence = self.parser.parse(record)?;
        let is_dsse = matches!(evidence, DecodedEvidence::Dsse(_));
        let mut verification = EvidenceVerification::new(record, evidence);

        let checksum = verify_checksum(subject_sha256, &record.subject.sha256);
        if !checksum.is_success() {
            tracing::info!(
                path = %record.download_path,
                expected = subject_sha256,
                recorded = %record.subject.sha256,
                "evidence subject checksum mismatch"
            );
        }
        verification.verification_result.sha256_verification_status = Some(checksum);

        if is_dsse {
            self.dsse.verify(subject_sha256, record, &mut verification)?;
        } else {
            self.sigstore.verify(subject_sha256, &mut verification)?;
        }
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::io::Read;

    use base64::Engine;
    use evidence_model::{DsseEnvelope, DsseSignature, EvidenceSubject, KeySource, dsse::pae};
    use sigstore_verify::trust_root::TrustedRoot;

    use super::*;
    use crate::checksum::sha256_bytes;
    use crate::keys::test_keys::TestKey;

    struct MapSource(HashMap<String, Vec<u8>>);

    impl EvidenceSource for MapSource {
        fn read_remote_file(&self, path: &str) -> std::io::Result<Box<dyn Read + '_>> {
            self.0
                .get(path)
                .map(|b| Box::new(b.as_slice()) as Box<dyn Read + '_>)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
    }

    struct OfflineTrustRoot;

    impl TrustRootProvider for OfflineTrustRoot {
        fn load_trusted_root(&self) -> Result<TrustedRoot, VerifyError> {
            Err(VerifyError::TrustRoot("offline".to_owned()))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        started: Cell<Option<usize>>,
        ticks: Cell<usize>,
    }

    impl ProgressSink for RecordingProgress {
        fn start(&self, total: usize) {
            self.started.set(Some(total));
        }
        fn inc(&self) {
            self.ticks.set(self.ticks.get() + 1);
        }
    }

    fn signed_envelope(signer: &TestKey) -> Vec<u8> {
        let payload = br#"{"_type":"https://in-toto.io/Statement/v1"}"#;
        let payload_type = "application/vnd.in-toto+json";
        let b64 = |b: &[u8]| base64::engine::general_purpose::STANDARD.encode(b);
        let envelope = DsseEnvelope {
            payload: b64(payload),
            payload_type: payload_type.to_owned(),
            signatures: vec![DsseSignature {
                keyid: String::new(),
                sig: b64(&signer.sign(&pae(payload_type, payload))),
            }],
        };
        serde_json::to_vec(&envelope).expect("serialize")
    }

    fn record(path: &str, subject_sha256: &str) -> EvidenceMetadata {
        EvidenceMetadata {
            download_path: path.to_owned(),
            predicate_type: "https://slsa.dev/provenance/v1".to_owned(),
            subject: EvidenceSubject {
                sha256: subject_sha256.to_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: VerifyConfig,
        source: MapSource,
    }

    /// One DSSE evidence at `e1.json` signed by a key the config trusts.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let signer = TestKey::ecdsa();
        let key_path = dir.path().join("trusted.pem");
        std::fs::write(&key_path, signer.public_pem()).expect("write key");

        let mut blobs = HashMap::new();
        blobs.insert("e1.json".to_owned(), signed_envelope(&signer));
        blobs.insert("e2.json".to_owned(), signed_envelope(&signer));
        blobs.insert("junk.json".to_owned(), b"{\"x\":1}".to_vec());
        blobs.insert(
            "bundle.json".to_owned(),
            br#"{"mediaType":"application/vnd.dev.sigstore.bundle.v0.3+json","verificationMaterial":{"publicKey":{"hint":"aGludA=="},"tlogEntries":[]}}"#.to_vec(),
        );
        blobs.insert(
            "keyed-bundle.json".to_owned(),
            br#"{"mediaType":"application/vnd.dev.sigstore.bundle.v0.3+json","verificationMaterial":{"publicKey":{"hint":"aGludA=="},"tlogEntries":[]},"dsseEnvelope":{"payloadType":"application/vnd.in-toto+json","payload":"e30=","signatures":[{"keyid":"","sig":"AAAA"}]}}"#.to_vec(),
        );

        Fixture {
            _dir: dir,
            config: VerifyConfig {
                key_paths: vec![key_path],
                use_artifactory_keys: false,
                bundle_policy: BundlePolicy::default(),
            },
            source: MapSource(blobs),
        }
    }

    #[test]
    fn matching_dsse_evidence_succeeds() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot));

        let response = verifier
            .verify(&subject, Some(&[record("e1.json", &subject)]), "repo/app.bin")
            .expect("verify");

        assert_eq!(response.schema_version, "1.0");
        assert_eq!(response.subject.path, "repo/app.bin");
        assert_eq!(response.overall_verification_status, VerificationStatus::Success);
        let r = &response.evidence_verifications[0].verification_result;
        assert_eq!(r.sha256_verification_status, Some(VerificationStatus::Success));
        assert_eq!(r.signatures_verification_status, Some(VerificationStatus::Success));
        assert_eq!(r.key_source, Some(KeySource::UserProvided));
        assert!(r.key_fingerprint.is_some());
    }

    #[test]
    fn recorded_checksum_mismatch_fails_overall() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let stale = sha256_bytes(b"older artifact");
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot));

        let response = verifier
            .verify(&subject, Some(&[record("e1.json", &stale)]), "repo/app.bin")
            .expect("verify");

        assert_eq!(response.overall_verification_status, VerificationStatus::Failed);
        let entry = &response.evidence_verifications[0];
        assert_eq!(
            entry.verification_result.sha256_verification_status,
            Some(VerificationStatus::Failed)
        );
        assert!(!entry.is_verified());
    }

    #[test]
    fn one_failure_fails_overall_and_keeps_every_entry() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot));

        let records = [
            record("e1.json", &subject),
            record("e2.json", "0000"),
            record("e1.json", &subject),
        ];
        let response = verifier
            .verify(&subject, Some(records.as_slice()), "repo/app.bin")
            .expect("verify");

        assert_eq!(response.evidence_verifications.len(), 3);
        assert_eq!(response.verified_count(), 2);
        assert_eq!(response.overall_verification_status, VerificationStatus::Failed);
        assert_eq!(response.evidence_verifications[1].download_path, "e2.json");
    }

    #[test]
    fn no_metadata_is_rejected() {
        let fx = fixture();
        let verifier = EvidenceVerifier::new(fx.config, &fx.source, Box::new(OfflineTrustRoot));
        assert!(matches!(
            verifier.verify("ab", None, "p"),
            Err(VerifyError::NoEvidence)
        ));
        assert!(matches!(
            verifier.verify("ab", Some(&[]), "p"),
            Err(VerifyError::NoEvidence)
        ));
    }

    #[test]
    fn unparseable_evidence_aborts_the_batch() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot));

        let records = [record("e1.json", &subject), record("junk.json", &subject)];
        let err = verifier
            .verify(&subject, Some(records.as_slice()), "p")
            .expect_err("should abort");
        assert!(matches!(err, VerifyError::UnsupportedEvidence(ref p) if p == "junk.json"));
    }

    #[test]
    fn bundle_without_content_is_a_hard_error() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot));

        let err = verifier
            .verify(&subject, Some(&[record("bundle.json", &subject)]), "p")
            .expect_err("should fail");
        assert!(matches!(err, VerifyError::InvalidBundle(_)), "got: {err}");
    }

    #[test]
    fn progress_is_reported_per_record() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let progress = RecordingProgress::default();
        let verifier =
            EvidenceVerifier::new(fx.config.clone(), &fx.source, Box::new(OfflineTrustRoot))
                .with_progress(&progress);

        let records = [record("e1.json", &subject), record("e2.json", &subject)];
        verifier
            .verify(&subject, Some(records.as_slice()), "p")
            .expect("verify");
        assert_eq!(progress.started.get(), Some(2));
        assert_eq!(progress.ticks.get(), 2);
    }

    /// Dispatch stubs that record which verifier ran for which record.
    struct StubDsse<'l>(&'l RefCell<Vec<String>>);
    struct StubSigstore<'l>(&'l RefCell<Vec<String>>);

    impl DsseVerification for StubDsse<'_> {
        fn verify(
            &self,
            _: &str,
            metadata: &EvidenceMetadata,
            result: &mut EvidenceVerification,
        ) -> Result<(), VerifyError> {
            self.0.borrow_mut().push(format!("dsse:{}", metadata.download_path));
            result.verification_result.signatures_verification_status =
                Some(VerificationStatus::Success);
            Ok(())
        }
    }

    impl SigstoreVerification for StubSigstore<'_> {
        fn verify(&self, _: &str, result: &mut EvidenceVerification) -> Result<(), VerifyError> {
            self.0.borrow_mut().push(format!("sigstore:{}", result.download_path));
            result.verification_result.sigstore_bundle_verification_status =
                Some(VerificationStatus::Success);
            Ok(())
        }
    }

    #[test]
    fn each_format_goes_to_its_own_verifier() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let log = RefCell::new(Vec::new());
        let verifier = EvidenceVerifier::from_parts(
            Box::new(EvidenceParser::new(&fx.source)),
            Box::new(StubDsse(&log)),
            Box::new(StubSigstore(&log)),
        );

        let records = [record("keyed-bundle.json", &subject), record("e1.json", &subject)];
        let response = verifier
            .verify(&subject, Some(records.as_slice()), "p")
            .expect("verify");

        assert_eq!(*log.borrow(), vec!["sigstore:keyed-bundle.json", "dsse:e1.json"]);
        assert_eq!(response.overall_verification_status, VerificationStatus::Success);
        assert_eq!(response.verified_count(), 2);
    }

    /// Verifiers that return without recording any status.
    struct SilentDsse;
    struct SilentSigstore;

    impl DsseVerification for SilentDsse {
        fn verify(
            &self,
            _: &str,
            _: &EvidenceMetadata,
            _: &mut EvidenceVerification,
        ) -> Result<(), VerifyError> {
            Ok(())
        }
    }

    impl SigstoreVerification for SilentSigstore {
        fn verify(&self, _: &str, _: &mut EvidenceVerification) -> Result<(), VerifyError> {
            Ok(())
        }
    }

    #[test]
    fn missing_signature_status_fails_overall() {
        let fx = fixture();
        let subject = sha256_bytes(b"artifact");
        let verifier = EvidenceVerifier::from_parts(
            Box::new(EvidenceParser::new(&fx.source)),
            Box::new(SilentDsse),
            Box::new(SilentSigstore),
        );

        let records = [record("e1.json", &subject), record("keyed-bundle.json", &subject)];
        let response = verifier
            .verify(&subject, Some(records.as_slice()), "p")
            .expect("verify");

        assert_eq!(response.verified_count(), 0);
        assert_eq!(response.overall_verification_status, VerificationStatus::Failed);
        let r = &response.evidence_verifications[0].verification_result;
        assert_eq!(r.sha256_verification_status, Some(VerificationStatus::Success));
        assert!(r.signatures_verification_status.is_none());
    }
}
