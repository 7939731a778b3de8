//! Error taxonomy for the fetch pipeline.
//!
//! Three families, kept apart so callers can tell "fix your configuration"
//! from "fix your build machine" from "the server said no":
//! - [`ConfigurationError`]: caller-fixable, never retried
//! - [`EnvironmentError`]: the sandbox could not be prepared or written
//! - [`RepositoryError`]: raised by the connector, propagated untouched

use std::path::PathBuf;

pub use buildfetch_scm::RepositoryError;

/// Configuration problems detected before or while resolving the load plan.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("more than one component with name '{name}' ({count} matches)")]
    AmbiguousComponentName { name: String, count: usize },

    #[error("component '{name}' not found")]
    ComponentNotFound { name: String },

    #[error("load rules are not provided in XML format: {path}")]
    LoadRulesNotXml { path: String },

    #[error(
        "multiple load rule files, one per component, is not supported with the \"use load rules\" load policy ({count} files configured)"
    )]
    MultipleLoadRuleFiles { count: usize },

    #[error("the selected load policy requires server version {required} or later; connected server is {actual}")]
    UnsupportedServerVersion { required: String, actual: String },

    #[error("invalid load rule file '{path}': {reason}")]
    InvalidLoadRule { path: String, reason: String },

    #[error("fetch destination must not be empty")]
    EmptyDestination,

    #[error("fetch destination '{path}' contains the character '{character}', which is not allowed on this platform")]
    InvalidDestination { path: String, character: char },

    #[error("component '{name}' cannot be used as a folder name: character '{character}' is not allowed on this platform")]
    InvalidComponentFolder { name: String, character: char },

    #[error("invalid build configuration {path}: {reason}")]
    InvalidConfigFile { path: String, reason: String },
}

/// The build machine could not prepare the sandbox.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("fetch destination {} exists and is not a directory", .path.display())]
    DestinationNotDirectory { path: PathBuf },

    #[error("failed to delete {}: {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {}: {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which family an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Environment,
    Repository,
}

/// Any failure of the fetch pipeline. Every variant fails the build.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Configuration(_) => ErrorKind::Configuration,
            FetchError::Environment(_) => ErrorKind::Environment,
            FetchError::Repository(_) => ErrorKind::Repository,
        }
    }
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
