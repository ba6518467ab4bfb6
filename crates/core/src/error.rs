use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, transforming or writing an entity set
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output location already exists and is not empty: {0}")]
    OutputExists(PathBuf),
}

impl SynthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SynthError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        SynthError::Csv {
            path: path.into(),
            source,
        }
    }
}
