//! Error types for the evidence data model.

/// Errors from decoding evidence model types.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A base64 field could not be decoded.
    #[error("invalid base64 in {field}: {source}")]
    InvalidBase64 {
        /// The field that held the bad value.
        field: &'static str,
        /// Underlying decode error.
        source: base64::DecodeError,
    },

    /// A JSON document could not be parsed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A PEM block was missing or malformed.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),
}
