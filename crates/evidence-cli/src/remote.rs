//! Evidence source backed by an Artifactory instance.

use std::io::{self, Read};

use evidence_verify::EvidenceSource;

/// Fetches evidence blobs over HTTP from `<url>/artifactory/<path>`.
pub(crate) struct ArtifactoryEvidenceSource {
    client: reqwest::blocking::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ArtifactoryEvidenceSource {
    /// Create a source for the instance at `url`, authenticating with
    /// `access_token` when one is given.
    pub(crate) fn new(url: &str, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: url.trim_end_matches('/').to_owned(),
            access_token,
        }
    }

    fn blob_url(&self, path: &str) -> String {
        format!("{}/artifactory/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl EvidenceSource for ArtifactoryEvidenceSource {
    fn read_remote_file(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let url = self.blob_url(path);
        tracing::debug!(url = %url, "fetching evidence");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .map_err(|e| io::Error::other(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let kind = if status == reqwest::StatusCode::NOT_FOUND {
                io::ErrorKind::NotFound
            } else if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                io::ErrorKind::PermissionDenied
            } else {
                io::ErrorKind::Other
            };
            return Err(io::Error::new(kind, format!("{url} returned {status}")));
        }
        Ok(Box::new(resp))
    }
}
