//! Data model for client-side evidence verification.
//!
//! `evidence-model` holds the plain data types shared by the verification
//! engine and the CLI: the DSSE envelope wire format, the evidence metadata
//! returned by the repository search, the per-evidence verification
//! accumulator, and the aggregate report.

pub mod dsse;
pub mod error;
pub mod metadata;
pub mod pem;
pub mod verification;

pub use dsse::{DsseEnvelope, DsseSignature};
pub use error::ModelError;
pub use metadata::{
    EvidenceMetadata, EvidenceSubject, SearchEvidenceResponse, SigningKey, parse_metadata,
};
pub use verification::{
    DecodedEvidence, EvidenceVerification, EvidenceVerificationResult, KeySource, MediaType,
    SCHEMA_VERSION, SigstoreOutcome, Subject, VerificationResponse, VerificationStatus,
};
