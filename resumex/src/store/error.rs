//! Errors raised by the session store.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while reading, writing or resolving sessions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session matches the identifier or prefix.
    #[error("no session found matching ID '{0}'")]
    NotFound(String),

    /// More than one session matches the prefix.
    #[error("multiple sessions ({count}) match ID '{prefix}', use full ID")]
    Ambiguous {
        /// The prefix that was looked up.
        prefix: String,
        /// Number of matching sessions.
        count: usize,
    },

    /// File-system failure.
    #[error("I/O error on {}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded.
    #[error("invalid session record {}", path.display())]
    Json {
        /// Record path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
