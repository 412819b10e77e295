//! The `evd verify` subcommand.
//!
//! Verifies every evidence record of one subject and prints a report.

use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Args};
use color_eyre::eyre::{Result, WrapErr, bail};
use evidence_model::parse_metadata;
use evidence_verify::checksum::sha256_file;
use evidence_verify::{
    DirectoryEvidenceSource, EvidenceSource, EvidenceVerifier, FileTrustRootProvider,
    ProgressSink, ReportFormat, ReportOutcome, TrustRootProvider, TufTrustRootProvider,
    VerifyConfig,
};

use crate::config;
use crate::remote::ArtifactoryEvidenceSource;

/// Arguments for `evd verify`.
#[derive(Args)]
#[command(group(ArgGroup::new("subject").required(true).args(["subject_sha256", "subject_file"])))]
pub struct VerifyArgs {
    /// SHA-256 of the subject artifact, hex encoded.
    #[arg(long, value_name = "HEX")]
    pub subject_sha256: Option<String>,

    /// Local copy of the subject artifact; its SHA-256 is computed.
    #[arg(long, value_name = "PATH")]
    pub subject_file: Option<PathBuf>,

    /// Repository path of the subject, shown in the report.
    #[arg(long, value_name = "REPO_PATH")]
    pub subject_path: Option<String>,

    /// Evidence metadata JSON (search response or bare array).
    #[arg(long, value_name = "PATH")]
    pub metadata: PathBuf,

    /// Read evidence blobs from a local directory mirroring the repository.
    #[arg(long, value_name = "DIR", conflicts_with = "url")]
    pub evidence_dir: Option<PathBuf>,

    /// Fetch evidence blobs from this Artifactory base URL.
    #[arg(long, env = "EVD_URL", value_name = "URL")]
    pub url: Option<String>,

    /// Bearer token for `--url`.
    #[arg(long, env = "EVD_ACCESS_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Public key files, `;`-separated or repeated. Tried in order.
    #[arg(long, env = "EVD_SIGNING_KEYS", value_name = "PATHS", value_delimiter = ';')]
    pub keys: Vec<PathBuf>,

    /// Fall back to the public key the repository stored with the evidence.
    #[arg(long, overrides_with = "no_use_artifactory_keys")]
    pub use_artifactory_keys: bool,

    /// Never use repository-stored keys, even when the config enables them.
    #[arg(long, overrides_with = "use_artifactory_keys")]
    pub no_use_artifactory_keys: bool,

    /// Report format: text, json or markdown.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// Sigstore `trusted_root.json` to use instead of fetching it over TUF.
    #[arg(long, value_name = "PATH")]
    pub trusted_root: Option<PathBuf>,

    /// Cache directory for TUF metadata.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Configuration file (defaults to `~/.config/evd/config.toml`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Logs verification progress.
#[derive(Default)]
struct TracingProgress {
    total: Cell<usize>,
    done: Cell<usize>,
}

impl ProgressSink for TracingProgress {
    fn start(&self, total: usize) {
        self.total.set(total);
        tracing::info!(total, "verifying evidence");
    }

    fn inc(&self) {
        self.done.set(self.done.get() + 1);
        tracing::info!(done = self.done.get(), total = self.total.get(), "evidence processed");
    }
}

/// Resolve a `--flag`/`--no-flag` pair against the config value.
///
/// The pair overrides itself, so at most one of `enable` and `disable` is set.
fn resolve_flag(enable: bool, disable: bool, config: bool) -> bool {
    if enable {
        true
    } else if disable {
        false
    } else {
        config
    }
}

/// Execute the verify command.
pub fn execute(args: VerifyArgs) -> Result<()> {
    let config = config::load(args.config.as_deref())?;

    let subject_sha256 = match (&args.subject_sha256, &args.subject_file) {
        (Some(hex), _) => hex.trim().to_owned(),
        (None, Some(path)) => sha256_file(path)?,
        (None, None) => bail!("either --subject-sha256 or --subject-file is required"),
    };
    let subject_path = args
        .subject_path
        .clone()
        .or_else(|| args.subject_file.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();

    let metadata_bytes = std::fs::read(&args.metadata)
        .wrap_err_with(|| format!("failed to read {}", args.metadata.display()))?;
    let metadata = parse_metadata(&metadata_bytes)
        .wrap_err_with(|| format!("invalid evidence metadata in {}", args.metadata.display()))?;

    let source: Box<dyn EvidenceSource> = match (&args.evidence_dir, args.url.or(config.url)) {
        (Some(dir), _) => Box::new(DirectoryEvidenceSource::new(dir)),
        (None, Some(url)) => Box::new(ArtifactoryEvidenceSource::new(
            &url,
            args.access_token.or(config.access_token),
        )),
        (None, None) => bail!("no evidence location: pass --evidence-dir or --url"),
    };

    let trust_root: Box<dyn TrustRootProvider> =
        match args.trusted_root.or(config.trusted_root) {
            Some(path) => Box::new(FileTrustRootProvider::new(path)),
            None => Box::new(TufTrustRootProvider::new(args.cache_dir.or(config.cache_dir))),
        };

    let format = match (args.format, config.format.as_deref()) {
        (Some(format), _) => format,
        (None, Some(name)) => name
            .parse::<ReportFormat>()
            .map_err(color_eyre::eyre::Report::msg)?,
        (None, None) => ReportFormat::default(),
    };

    let verify_config = VerifyConfig {
        key_paths: if args.keys.is_empty() { config.keys } else { args.keys },
        use_artifactory_keys: resolve_flag(
            args.use_artifactory_keys,
            args.no_use_artifactory_keys,
            config.use_artifactory_keys,
        ),
        bundle_policy: config.policy,
    };

    let progress = TracingProgress::default();
    let verifier =
        EvidenceVerifier::new(verify_config, source.as_ref(), trust_root).with_progress(&progress);
    let response = verifier.verify(&subject_sha256, Some(metadata.as_slice()), &subject_path)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = format.printer().print(&response, &mut out)?;
    out.flush()?;

    if outcome == ReportOutcome::Failed {
        process::exit(1);
    }

    Ok(())
}
