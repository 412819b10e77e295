//! Evidence blob sources.
//!
//! The engine never talks to the repository directly; it reads evidence
//! blobs through an [`EvidenceSource`] chosen by the caller.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Something that can open an evidence blob by repository path.
pub trait EvidenceSource {
    /// Open the blob at `path` for reading.
    ///
    /// The reader is dropped, and thereby closed, on every exit path.
    fn read_remote_file(&self, path: &str) -> std::io::Result<Box<dyn Read + '_>>;
}

/// Reads evidence blobs from a local directory mirroring the repository layout.
#[derive(Debug, Clone)]
pub struct DirectoryEvidenceSource {
    root: PathBuf,
}

impl DirectoryEvidenceSource {
    /// Serve blobs from files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("evidence path escapes the evidence directory: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl EvidenceSource for DirectoryEvidenceSource {
    fn read_remote_file(&self, path: &str) -> std::io::Result<Box<dyn Read + '_>> {
        let full = self.resolve(path)?;
        tracing::debug!(path = %full.display(), "opening evidence file");
        Ok(Box::new(std::fs::File::open(full)?))
    }
}
