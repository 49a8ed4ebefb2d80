//! Error handling for texeq
//!
//! This module provides the library error type and result alias, plus the
//! closed set of per-file failures collected by batch runs.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Library error type
#[derive(Debug, Error)]
pub enum TexeqError {
    /// IO error, with the file it happened on
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Document has no `\begin{document}...\end{document}` body
    #[error("missing \\begin{{document}}...\\end{{document}} body")]
    MissingDocumentBody,
    /// A persisted equation table could not be read back
    #[error("malformed equation table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },
    /// Identifier text that does not follow the `EQ..Q` scheme
    #[error("invalid equation identifier '{0}'")]
    InvalidIdentifier(String),
    /// Input path is not a directory
    #[error("{} is not a valid directory", .0.display())]
    NotADirectory(PathBuf),
    /// Worker pool could not be started
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    /// Run report serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for texeq operations
pub type TexeqResult<T> = Result<T, TexeqError>;

// Convenience constructors for errors
impl TexeqError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        TexeqError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TexeqError::MalformedTable {
            line,
            reason: reason.into(),
        }
    }
}

/// Which stage of the two-stage rendering toolchain failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStage {
    /// Document to intermediate markup
    Convert,
    /// Intermediate markup to XHTML
    Post,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStage::Convert => write!(f, "MathML conversion"),
            RenderStage::Post => write!(f, "MathML postprocessing"),
        }
    }
}

/// Typed outcome of a failed rendering call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RenderFailure {
    #[error("{stage} failed - timeout")]
    Timeout { stage: RenderStage },
    #[error("{stage} failed - empty output")]
    EmptyOutput { stage: RenderStage },
    #[error("{stage} failed - {message}")]
    Transport { stage: RenderStage, message: String },
}

impl RenderFailure {
    /// Timeouts and empty outputs may succeed on a later attempt; transport
    /// errors usually mean the toolchain is missing or broken.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RenderFailure::Transport { .. })
    }
}

/// Per-file failure recorded in a run log. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FileFailure {
    #[error("Error: \\begin{{document}} error")]
    StructuralParseMiss,
    #[error("no math found")]
    NoMathFound,
    #[error("{0}")]
    Render(RenderFailure),
    #[error("IO error: {message}")]
    Io { message: String },
    #[error("worker panicked: {message}")]
    Panicked { message: String },
}

impl From<RenderFailure> for FileFailure {
    fn from(failure: RenderFailure) -> Self {
        FileFailure::Render(failure)
    }
}

impl From<TexeqError> for FileFailure {
    fn from(err: TexeqError) -> Self {
        match err {
            TexeqError::MissingDocumentBody => FileFailure::StructuralParseMiss,
            other => FileFailure::Io {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = TexeqError::io(
            "corpus/a.tex",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("corpus/a.tex"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_malformed_table_display() {
        let err = TexeqError::malformed(7, "expected 2 or 3 columns");
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_render_failure_messages() {
        let timeout = RenderFailure::Timeout {
            stage: RenderStage::Convert,
        };
        assert_eq!(timeout.to_string(), "MathML conversion failed - timeout");
        assert!(timeout.is_retryable());

        let transport = RenderFailure::Transport {
            stage: RenderStage::Post,
            message: "No such file or directory".to_string(),
        };
        assert!(!transport.is_retryable());
    }

    #[test]
    fn test_missing_body_maps_to_structural_miss() {
        let failure: FileFailure = TexeqError::MissingDocumentBody.into();
        assert_eq!(failure, FileFailure::StructuralParseMiss);
    }
}
