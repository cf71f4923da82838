//! Desired-state source: a Git working tree plus an index of the manifest
//! documents it contains.

pub mod error;
pub mod manifests;
pub mod repository;

pub use error::{GitOpsError, Result};
pub use manifests::ManifestIndex;
pub use repository::{GitRepository, PullResult};

use serde_json::Value;
use std::path::Path;

/// The desired-state source consumed by the reconciler: clone at startup,
/// fast-forward pull plus index rebuild on every pass, manifest lookup by
/// resource identity.
pub struct GitDesiredState {
    repo: GitRepository,
    index: ManifestIndex,
    /// Set when this process created the working tree and should remove it
    /// on shutdown.
    owns_work_tree: bool,
}

impl GitDesiredState {
    pub fn new(repo: GitRepository, owns_work_tree: bool) -> Self {
        Self {
            repo,
            index: ManifestIndex::default(),
            owns_work_tree,
        }
    }

    pub fn repo_path(&self) -> &Path {
        self.repo.repo_path()
    }

    /// Clones (or reuses) the working tree and builds the initial index.
    pub async fn clone_repo(&mut self) -> Result<()> {
        self.repo.clone_repo().await?;
        self.index = ManifestIndex::build(self.repo.repo_path())?;
        Ok(())
    }

    /// Fast-forwards the working tree and rebuilds the index. Returns the
    /// number of files the pull changed.
    pub async fn refresh(&mut self) -> Result<u32> {
        let pull = self.repo.pull().await?;
        if pull.files_changed > 0 {
            log::info!(
                "Desired-state refresh: {} file(s) changed, now at {}",
                pull.files_changed,
                pull.commit
            );
        } else {
            log::debug!("Desired-state refresh: up to date at {}", pull.commit);
        }
        self.index = ManifestIndex::build(self.repo.repo_path())?;
        Ok(pull.files_changed)
    }

    /// Looks up the declared manifest for a resource, or `None` when the
    /// resource is not declared in Git.
    pub fn get_manifest_for_resource(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Option<&Value> {
        self.index.get(kind, namespace, name)
    }

    /// Removes the working tree when this process created it.
    pub fn cleanup(&self) {
        if !self.owns_work_tree {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(self.repo.repo_path()) {
            log::warn!(
                "Failed to remove working tree {}: {}",
                self.repo.repo_path().display(),
                e
            );
        }
    }
}
