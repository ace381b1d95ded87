//! Error taxonomy for the report pipeline.

use std::path::PathBuf;

/// Every failure the pipeline can surface. None of them are recovered
/// locally; they propagate to the binary, which exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Source missing, unreadable or not UTF-8; output not writable.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Markdown converter could not produce HTML.
    #[error("Markdown conversion failed: {0}")]
    Conversion(String),

    /// Fonts, stylesheet or PDF emission failed.
    #[error("PDF rendering failed: {0}")]
    Render(String),
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
