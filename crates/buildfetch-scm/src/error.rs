//! Error types for buildfetch-scm

use thiserror::Error;

/// Errors raised by a source-control connector.
///
/// The core propagates these unchanged; it never inspects the message.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Could not reach or authenticate against the server
    #[error("Connection to repository failed: {0}")]
    Connection(String),

    /// Workspace, stream, snapshot or build definition does not exist
    #[error("{kind} not found: {name}")]
    SourceNotFound { kind: String, name: String },

    /// File or item missing from a component
    #[error("Item not found in component {component}: {path}")]
    ItemNotFound { component: String, path: String },

    /// Server-side operation failed
    #[error("Repository operation '{operation}' failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    /// Fixture or server payload could not be interpreted
    #[error("Invalid repository data: {0}")]
    InvalidData(String),

    /// IO error while materializing files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::InvalidData(err.to_string())
    }
}

/// Result type for connector operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
