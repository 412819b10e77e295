//! Sigstore trust root providers.
//!
//! The production provider fetches the trusted root through Sigstore's TUF
//! repository and caches it on disk. The file provider reads a
//! `trusted_root.json` directly, for air-gapped hosts.

use std::path::PathBuf;

use sigstore_trust_root::{PRODUCTION_TUF_ROOT, TufConfig};
use sigstore_verify::trust_root::TrustedRoot;

use crate::error::VerifyError;

/// Loads the trust anchors used for Sigstore bundle verification.
pub trait TrustRootProvider {
    /// Produce the trusted root. Called at most once per verifier.
    fn load_trusted_root(&self) -> Result<TrustedRoot, VerifyError>;
}

/// Default on-disk cache for TUF metadata: `<cache>/evidence/security/certs`.
pub fn default_tuf_cache_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.cache_dir().join("evidence/security/certs"))
}

/// Fetches the Sigstore production trusted root over TUF.
#[derive(Debug, Clone, Default)]
pub struct TufTrustRootProvider {
    cache_dir: Option<PathBuf>,
}

impl TufTrustRootProvider {
    /// Use `cache_dir` for TUF metadata, or the default cache when `None`.
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }
}

impl TrustRootProvider for TufTrustRootProvider {
    fn load_trusted_root(&self) -> Result<TrustedRoot, VerifyError> {
        let mut config = TufConfig::production();
        if let Some(dir) = self.cache_dir.clone().or_else(default_tuf_cache_dir) {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VerifyError::TrustRoot(format!(
                    "failed to create TUF cache directory {}: {e}",
                    dir.display()
                ))
            })?;
            tracing::debug!(cache_dir = %dir.display(), "using TUF cache");
            config = config.with_cache_dir(dir);
        }

        // The engine is synchronous; the TUF client is not.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VerifyError::TrustRoot(format!("failed to start TUF runtime: {e}")))?;

        let root = runtime
            .block_on(TrustedRoot::from_tuf_with_config(config, PRODUCTION_TUF_ROOT))
            .map_err(|e| VerifyError::TrustRoot(e.to_string()))?;
        tracing::info!("loaded Sigstore trusted root via TUF");
        Ok(root)
    }
}

/// Reads a trusted root JSON document from disk.
#[derive(Debug, Clone)]
pub struct FileTrustRootProvider {
    path: PathBuf,
}

impl FileTrustRootProvider {
    /// Read the trusted root from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TrustRootProvider for FileTrustRootProvider {
    fn load_trusted_root(&self) -> Result<TrustedRoot, VerifyError> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            VerifyError::TrustRoot(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let root = TrustedRoot::from_json(&json).map_err(|e| {
            VerifyError::TrustRoot(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        tracing::info!(path = %self.path.display(), "loaded Sigstore trusted root from file");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use sigstore_verify::trust_root::SIGSTORE_PRODUCTION_TRUSTED_ROOT;

    use super::*;

    #[test]
    fn missing_trusted_root_file_is_a_trust_root_error() {
        let err = FileTrustRootProvider::new("/nonexistent/trusted_root.json")
            .load_trusted_root()
            .err()
            .expect("should fail");
        assert!(matches!(err, VerifyError::TrustRoot(_)));
        assert!(err.to_string().contains("trusted_root.json"));
    }

    #[test]
    fn malformed_trusted_root_file_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().expect("tempfile");
        std::fs::write(tmp.path(), "not json").expect("write");
        let err = FileTrustRootProvider::new(tmp.path())
            .load_trusted_root()
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("failed to parse"), "got: {err}");
    }

    #[test]
    fn trusted_root_file_is_loaded() {
        let tmp = tempfile::NamedTempFile::new().expect("tempfile");
        std::fs::write(tmp.path(), SIGSTORE_PRODUCTION_TRUSTED_ROOT).expect("write");
        FileTrustRootProvider::new(tmp.path())
            .load_trusted_root()
            .expect("should load");
    }

    #[test]
    fn default_cache_dir_ends_with_certs() {
        if let Some(dir) = default_tuf_cache_dir() {
            assert!(dir.ends_with("evidence/security/certs"));
        }
    }
}
