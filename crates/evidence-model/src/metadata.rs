//! Evidence metadata as returned by the repository's evidence search.
//!
//! The search API answers with a GraphQL-shaped document
//! (`data.evidence.searchEvidence.edges[].node`). Consumers usually only
//! need the flattened list of nodes, which [`parse_metadata`] produces
//! from either that document or a bare JSON array of records.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One evidence record attached to a subject artifact.
///
/// Read-only input to verification. Every field defaults to empty so
/// partially populated search results still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidenceMetadata {
    /// Repository path of the evidence blob.
    pub download_path: String,
    /// File name of the evidence blob.
    pub name: String,
    /// Digest of the evidence blob itself (not of the subject).
    pub sha256: String,
    /// Repository holding the evidence blob.
    pub repository_key: String,
    /// Folder of the evidence blob within the repository.
    pub path: String,
    /// Predicate type URI, e.g. `https://slsa.dev/provenance/v1`.
    pub predicate_type: String,
    /// Predicate category reported by the repository.
    pub predicate_category: String,
    /// Short predicate name reported by the repository.
    pub predicate_slug: String,
    /// Creation timestamp as reported by the repository.
    pub created_at: String,
    /// Identity that created the evidence.
    pub created_by: String,
    /// Integration that produced the evidence, when known.
    pub provider_id: String,
    /// The artifact the evidence claims to describe.
    pub subject: EvidenceSubject,
    /// The signer's public key, when the repository stores it.
    pub signing_key: Option<SigningKey>,
}

/// The subject recorded inside an evidence record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidenceSubject {
    /// Hex SHA-256 the evidence recorded for its subject.
    pub sha256: String,
    /// Repository of the subject.
    pub repository_key: String,
    /// Folder of the subject within the repository.
    pub path: String,
    /// File name of the subject.
    pub name: String,
}

/// Public key material stored next to the evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigningKey {
    /// Key alias in the repository's key store.
    pub alias: String,
    /// PEM-encoded PKIX public key; empty when unknown.
    pub public_key: String,
}

impl EvidenceMetadata {
    /// The embedded public key PEM, if one is present and non-empty.
    pub fn embedded_public_key(&self) -> Option<&str> {
        self.signing_key
            .as_ref()
            .map(|k| k.public_key.as_str())
            .filter(|pem| !pem.trim().is_empty())
    }
}

/// The evidence search response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEvidenceResponse {
    /// Top-level GraphQL `data` object.
    #[serde(default)]
    pub data: SearchEvidenceData,
}

/// `data` object of a search response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEvidenceData {
    /// `evidence` query result.
    #[serde(default)]
    pub evidence: EvidenceQuery,
}

/// `evidence` query result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceQuery {
    /// `searchEvidence` connection.
    #[serde(default)]
    pub search_evidence: SearchEvidence,
}

/// GraphQL connection of evidence nodes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEvidence {
    /// Edges, one per evidence record.
    #[serde(default)]
    pub edges: Vec<SearchEvidenceEdge>,
}

/// One edge of the search connection.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEvidenceEdge {
    /// The evidence record.
    pub node: EvidenceMetadata,
}

impl SearchEvidenceResponse {
    /// Flatten the response into evidence records, preserving order.
    pub fn into_metadata(self) -> Vec<EvidenceMetadata> {
        self.data
            .evidence
            .search_evidence
            .edges
            .into_iter()
            .map(|edge| edge.node)
            .collect()
    }
}

/// Parse evidence records from either a search response or a bare array.
pub fn parse_metadata(bytes: &[u8]) -> Result<Vec<EvidenceMetadata>, ModelError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    let response: SearchEvidenceResponse = serde_json::from_value(value)?;
    Ok(response.into_metadata())
}
