//! Rendering of verification responses.
//!
//! Three formats are supported: an aligned plain-text listing, pretty
//! JSON following the report schema, and Markdown tables for CI job
//! summaries. Every printer reports [`ReportOutcome::Failed`] exactly when
//! the overall status is failed, whatever the format.

use std::fmt::Write;
use std::io;
use std::str::FromStr;

use chrono::DateTime;
use evidence_model::{EvidenceVerification, MediaType, VerificationResponse};

use crate::error::VerifyError;

/// Output format of a verification report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Aligned plain text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// Markdown tables.
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plaintext" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown report format `{other}` (expected text, json or markdown)")),
        }
    }
}

impl ReportFormat {
    /// The printer for this format.
    pub fn printer(self) -> Box<dyn ReportPrinter> {
        match self {
            Self::Text => Box::new(TextReportPrinter),
            Self::Json => Box::new(JsonReportPrinter),
            Self::Markdown => Box::new(MarkdownReportPrinter),
        }
    }
}

/// Whether a printed report passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Every evidence verified.
    Passed,
    /// At least one evidence failed.
    Failed,
}

impl ReportOutcome {
    fn of(response: &VerificationResponse) -> Self {
        if response.is_failed() {
            Self::Failed
        } else {
            Self::Passed
        }
    }
}

/// Writes a verification report.
pub trait ReportPrinter {
    /// Print `response` to `out` and report whether it passed.
    fn print(
        &self,
        response: &VerificationResponse,
        out: &mut dyn io::Write,
    ) -> Result<ReportOutcome, VerifyError>;
}

/// Aligned plain-text printer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReportPrinter;

impl ReportPrinter for TextReportPrinter {
    fn print(
        &self,
        response: &VerificationResponse,
        out: &mut dyn io::Write,
    ) -> Result<ReportOutcome, VerifyError> {
        out.write_all(format_text(response).as_bytes())?;
        Ok(ReportOutcome::of(response))
    }
}

/// Pretty JSON printer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportPrinter;

impl ReportPrinter for JsonReportPrinter {
    fn print(
        &self,
        response: &VerificationResponse,
        out: &mut dyn io::Write,
    ) -> Result<ReportOutcome, VerifyError> {
        out.write_all(format_json(response)?.as_bytes())?;
        Ok(ReportOutcome::of(response))
    }
}

/// Markdown printer, suitable for CI job summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownReportPrinter;

impl ReportPrinter for MarkdownReportPrinter {
    fn print(
        &self,
        response: &VerificationResponse,
        out: &mut dyn io::Write,
    ) -> Result<ReportOutcome, VerifyError> {
        out.write_all(format_markdown(response).as_bytes())?;
        Ok(ReportOutcome::of(response))
    }
}

/// Pretty JSON, terminated by a newline.
pub fn format_json(response: &VerificationResponse) -> Result<String, VerifyError> {
    let mut out = serde_json::to_string_pretty(response)?;
    out.push('\n');
    Ok(out)
}

/// Plain-text report.
pub fn format_text(response: &VerificationResponse) -> String {
    let total = response.evidence_verifications.len();
    let mut out = String::new();
    let _ = writeln!(out, "Subject sha256:        {}", response.subject.sha256);
    let _ = writeln!(out, "Subject:               {}", response.subject.path);
    let _ = writeln!(out, "Loaded {total} evidence");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Verification passed for {} out of {total} evidence",
        response.verified_count()
    );
    let _ = writeln!(out);
    for (i, v) in response.evidence_verifications.iter().enumerate() {
        format_text_entry(&mut out, i + 1, v);
    }
    out
}

fn format_text_entry(out: &mut String, number: usize, v: &EvidenceVerification) {
    let r = &v.verification_result;
    let status = |s: Option<evidence_model::VerificationStatus>| {
        s.map_or("failed", evidence_model::VerificationStatus::as_str)
    };

    let _ = writeln!(out, "- Evidence {number}:");
    let _ = writeln!(out, "    - Media type:                     {}", v.media_type());
    let _ = writeln!(out, "    - Predicate type:                 {}", v.predicate_type);
    let _ = writeln!(out, "    - Evidence subject sha256:        {}", v.subject_checksum);
    if let Some(source) = r.key_source {
        let _ = writeln!(out, "    - Key source:                     {source}");
    }
    if let Some(fp) = &r.key_fingerprint {
        let _ = writeln!(out, "    - Key fingerprint:                {fp}");
    }
    let _ = writeln!(
        out,
        "    - Sha256 verification status:     {}",
        status(r.sha256_verification_status)
    );
    match v.media_type() {
        MediaType::SimpleDsse => {
            let _ = writeln!(
                out,
                "    - Signatures verification status: {}",
                status(r.signatures_verification_status)
            );
        }
        MediaType::SigstoreBundle => {
            let _ = writeln!(
                out,
                "    - Sigstore verification status:   {}",
                status(r.sigstore_bundle_verification_status)
            );
        }
    }
    if let Some(details) = &r.sigstore {
        if let Some(identity) = &details.identity {
            let _ = writeln!(out, "    - Signer identity:                {identity}");
        }
        if let Some(issuer) = &details.issuer {
            let _ = writeln!(out, "    - Signer issuer:                  {issuer}");
        }
        if let Some(signed_at) = details
            .integrated_time
            .and_then(|t| DateTime::from_timestamp(t, 0))
        {
            let _ = writeln!(out, "    - Signed at:                      {}", signed_at.to_rfc3339());
        }
    }
    if let Some(reason) = &r.failure_reason {
        let _ = writeln!(out, "    - Failure reason:                 {reason}");
    }
}

/// Markdown report with a quick summary and a full results table.
pub fn format_markdown(response: &VerificationResponse) -> String {
    let entries = &response.evidence_verifications;
    let verified = response.verified_count();
    let label = |v: &EvidenceVerification| if v.is_verified() { "success" } else { "failed" };

    let mut out = String::new();
    let _ = writeln!(out, "# Evidence Verification Result");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Subject:** {}  ", response.subject.path);
    let _ = writeln!(out, "**Subject sha256:** {}  ", response.subject.sha256);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Quick Summary");
    let _ = writeln!(out, "| Predicate type | Verification status |");
    let _ = writeln!(out, "|-|-|");
    for v in entries {
        let _ = writeln!(out, "| {} | {} |", md_cell(&v.predicate_type), label(v));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "**Total loaded evidence:** {}  ", entries.len());
    let _ = writeln!(out, "**Successful verifications:** {verified}  ");
    let _ = writeln!(out, "**Failed verifications:** {}  ", entries.len() - verified);
    let _ = writeln!(
        out,
        "**Overall verification status:** {}  ",
        response.overall_verification_status
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Full Results");
    let _ = writeln!(
        out,
        "| Predicate type | Subject Path | Subject Digest | Media type | Key source | Key fingerprint | Verification status | Failure reason |"
    );
    let _ = writeln!(out, "|-|-|-|-|-|-|-|-|");
    for v in entries {
        let r = &v.verification_result;
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            md_cell(&v.predicate_type),
            md_cell(&response.subject.path),
            response.subject.sha256,
            v.media_type(),
            r.key_source.map_or("-", |s| s.as_str()),
            r.key_fingerprint.as_deref().unwrap_or("-"),
            label(v),
            md_cell(r.failure_reason.as_deref().unwrap_or("-")),
        );
    }
    out
}

// Pipes would split a table cell.
fn md_cell(value: &str) -> String {
    value.replace('|', "\\|")
}
