//! Client-side verification of evidence attached to repository artifacts.
//!
//! `evidence-verify` takes the evidence records of one subject, fetches
//! each blob, and checks it independently of the repository:
//! 1. **Parse**: Sigstore bundle first, then a bare DSSE envelope
//! 2. **Checksum**: the evidence must name the subject's SHA-256
//! 3. **Signature**: local keys, then repository keys when allowed, or the
//!    Sigstore trust root for bundles
//!
//! The run result is fail-closed: one failed record fails the subject.

pub mod checksum;
pub mod dsse;
pub mod error;
pub mod keys;
pub mod parser;
pub mod report;
pub mod sigstore;
pub mod source;
pub mod trust;
pub mod verify;

// Re-export primary types for convenience.
pub use error::VerifyError;
pub use report::{ReportFormat, ReportOutcome, ReportPrinter};
// `crate::` keeps the module apart from the `sigstore` dependency.
pub use crate::sigstore::{BundleCheck, BundlePolicy, SigstoreBundleCheck};
pub use source::{DirectoryEvidenceSource, EvidenceSource};
pub use trust::{FileTrustRootProvider, TrustRootProvider, TufTrustRootProvider};
pub use verify::{EvidenceVerifier, ProgressSink, VerifyConfig};
