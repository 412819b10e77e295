//! evd: client-side verification of repository evidence.
//!
//! Checks DSSE envelopes and Sigstore bundles attached to an artifact
//! without trusting the repository's own verdict.

mod commands;
mod config;
mod remote;

use clap::Parser;
use color_eyre::eyre::Result;

/// evd: verify the evidence attached to a repository artifact.
///
/// Every evidence blob is checked against the artifact's SHA-256 and its
/// signature is verified locally, with your keys or the Sigstore trust root.
#[derive(Parser)]
#[command(name = "evd", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Verify every evidence recorded for a subject.
    Verify(commands::verify::VerifyArgs),
}

// Synchronous on purpose: the TUF provider and the HTTP source each drive
// their own runtime, which cannot be nested inside another one.
fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Reports go to stdout; keep logs out of them.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args),
    }
}
