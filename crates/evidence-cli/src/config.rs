//! Configuration file for `evd`.
//!
//! Resolution order:
//! 1. The path given with `--config` (must exist)
//! 2. `config.toml` in the XDG config dir (`~/.config/evd/`), if present
//! 3. Built-in defaults
//!
//! Command-line flags always override values read from the file.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use evidence_verify::BundlePolicy;
use serde::Deserialize;

/// Settings read from `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Local public key files.
    pub(crate) keys: Vec<PathBuf>,
    /// Fall back to the key stored with the evidence.
    pub(crate) use_artifactory_keys: bool,
    /// Default report format.
    pub(crate) format: Option<String>,
    /// Repository base URL for fetching evidence blobs.
    pub(crate) url: Option<String>,
    /// Bearer token for the repository.
    pub(crate) access_token: Option<String>,
    /// Offline `trusted_root.json`, bypassing TUF.
    pub(crate) trusted_root: Option<PathBuf>,
    /// TUF metadata cache directory.
    pub(crate) cache_dir: Option<PathBuf>,
    /// Sigstore bundle thresholds.
    pub(crate) policy: BundlePolicy,
}

/// Default config location, `~/.config/evd/config.toml` on Linux.
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "evd", "evd")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the configuration, honouring an explicit `--config` path.
pub(crate) fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => load_file(&path),
        _ => Ok(Config::default()),
    }
}

fn load_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
    let config = toml::from_str(&content)
        .wrap_err_with(|| format!("invalid config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}
