//! Error types for the promec controller
//!
//! Only [`Error::Config`] is fatal. Everything else aborts the current
//! reconciliation cycle and is retried on the next tick.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (list or create failed)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Watched directory could not be read
    #[error("failed to read directory {}: {source}", path.display())]
    Io {
        /// Directory that was being listed
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// Missing or invalid startup setting
    #[error("configuration error [{field}]: {message}")]
    Config {
        /// Name of the offending setting (e.g. "pvc-name")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred (e.g. "create_client")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error for the given setting
    pub fn config(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an I/O error for the given directory
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Whether the next reconciliation cycle may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::Config { .. })
    }

    /// Whether the API server rejected a create because the object exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 409
        )
    }
}
