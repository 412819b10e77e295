//! Error types for the verification engine.
//!
//! Everything here is a hard error: the run stops and no report is
//! produced. A signature or checksum that simply does not match is
//! recorded as a failed status on the evidence instead.

use evidence_model::ModelError;

/// Errors from the evidence verification engine.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No evidence metadata was supplied.
    #[error("no evidence metadata provided")]
    NoEvidence,

    /// A verifier was handed a result it cannot process.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The evidence record has no download path.
    #[error("evidence has an empty download path")]
    EmptyDownloadPath,

    /// Reading the evidence blob failed.
    #[error("failed to read evidence {path}: {source}")]
    Fetch {
        /// Repository path of the blob.
        path: String,
        /// Underlying read error.
        source: std::io::Error,
    },

    /// The blob is neither a Sigstore bundle nor a DSSE envelope.
    #[error("unsupported evidence file for client-side verification: {0}")]
    UnsupportedEvidence(String),

    /// A configured local key could not be loaded.
    #[error("failed to load key {path}: {reason}")]
    KeyLoad {
        /// Path of the key file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The repository-embedded public key could not be decoded.
    #[error("failed to load artifactory key for predicate type {predicate_type}: {reason}")]
    ArtifactoryKey {
        /// Predicate type of the evidence carrying the key.
        predicate_type: String,
        /// What went wrong.
        reason: String,
    },

    /// The Sigstore trust root could not be loaded.
    #[error("failed to load Sigstore trusted root: {0}")]
    TrustRoot(String),

    /// The Sigstore bundle is structurally unusable.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// The bundle policy holds a threshold that cannot be enforced.
    #[error("invalid bundle policy: {0}")]
    InvalidPolicy(String),

    /// The subject digest is not valid hex SHA-256.
    #[error("invalid hex digest: {0}")]
    InvalidDigest(String),

    /// A model type failed to decode.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// I/O error during verification.
    #[error("verification I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
