use std::path::PathBuf;

use thiserror::Error;

/// Spool failures surfaced to callers. Append failures are fatal for the
/// call, never for the process.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode spool record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SpoolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpoolError::Io {
            path: path.into(),
            source,
        }
    }
}
