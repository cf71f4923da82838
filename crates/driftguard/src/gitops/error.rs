//! Desired-state source error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from Git and manifest-index operations.
#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git repository not initialized at '{0}'")]
    GitNotInitialized(PathBuf),

    #[error("Failed to read manifest '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk manifest tree '{path}': {message}")]
    WalkTree { path: PathBuf, message: String },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Working tree setup failed for '{path}': {source}")]
    WorkTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for desired-state operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;
