use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftGuardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    GitOps(#[from] crate::gitops::GitOpsError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] crate::cluster::ClusterError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Server error: {0}")]
    Server(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(String),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, DriftGuardError>;
