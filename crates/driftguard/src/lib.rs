pub mod cluster;
pub mod config;
pub mod controller;
pub mod db;
pub mod detector;
pub mod error;
pub mod gitops;
pub mod hash;
pub mod model;
pub mod server;
pub mod transition;

pub use cluster::{ClusterClient, ClusterError, KubectlClient};
pub use config::{load_config, Config};
pub use controller::DriftController;
pub use db::{Database, DatabaseError, DriftFilter};
pub use detector::DriftDetector;
pub use error::{ConfigError, DriftGuardError, Result};
pub use gitops::{GitDesiredState, GitOpsError, GitRepository, ManifestIndex};
pub use model::{
    normalize_kind, resource_id, ChangeType, DriftChange, DriftRecord, DriftResult, DriftStatus,
    Severity,
};
pub use transition::{next_state, TransitionEvent, RESOLUTION_MESSAGE};
