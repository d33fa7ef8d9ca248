use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocvecError>;

/// Every failure surfaced by docvec-core.
#[derive(Debug, Error)]
pub enum DocvecError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to encode artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode artifact: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vector dimension mismatch (expected {expected}, got {actual})")]
    VecDimensionMismatch { expected: usize, actual: usize },

    #[error("vector dimension must be non-zero")]
    ZeroDimension,

    #[error("invalid artifact {path:?}: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("corrupted store: {reason}")]
    CorruptStore { reason: String },

    #[error("local index `{name}` is missing its {artifact} at {path:?}")]
    MissingLocalArtifact {
        name: String,
        artifact: &'static str,
        path: PathBuf,
    },

    #[error("no local indices found in {dir:?}")]
    NoLocalIndices { dir: PathBuf },

    #[error("merge validation failed: {what} count mismatch (sources {expected}, merged {actual})")]
    MergeValidation {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("embedding count mismatch: {inputs} inputs produced {outputs} vectors")]
    EmbeddingCountMismatch { inputs: usize, outputs: usize },

    #[error("embedding request failed: {reason}")]
    Embedding { reason: String },

    #[error("no valid text segments in {source_file}")]
    NoSegments { source_file: String },

    #[error("content to append is empty")]
    EmptyContent,

    #[error("lock error: {0}")]
    Lock(String),
}

impl DocvecError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            reason: reason.into(),
        }
    }

    /// Prefixes the reason of a corruption error with where it was found.
    pub(crate) fn in_context(self, context: &str) -> Self {
        match self {
            Self::CorruptStore { reason } => Self::CorruptStore {
                reason: format!("{context}: {reason}"),
            },
            other => other,
        }
    }

    pub(crate) fn embedding(reason: impl Into<String>) -> Self {
        Self::Embedding {
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "api_embed")]
impl From<reqwest::Error> for DocvecError {
    fn from(err: reqwest::Error) -> Self {
        Self::embedding(err.to_string())
    }
}
