//! Git repository operations.
//!
//! Shells out to the `git` binary. The working tree is read-only from the
//! controller's perspective: clone once at startup, fast-forward pull on
//! every pass.

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;

use super::error::{GitOpsError, Result};

/// Result of a fast-forward pull.
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Head commit of the working tree after the pull.
    pub commit: String,
    /// Number of files the pull changed, 0 when already up to date.
    pub files_changed: u32,
}

/// Handle on the local working tree of the desired-state repository.
pub struct GitRepository {
    repo_path: PathBuf,
    url: String,
    branch: String,
}

impl GitRepository {
    pub fn new(repo_path: impl Into<PathBuf>, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            url: url.into(),
            branch: branch.into(),
        }
    }

    /// Returns the working tree path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Returns the configured branch name.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Checks whether the working tree holds a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Ensures the working tree exists and is current: clones on first use,
    /// fast-forwards when a clone from an earlier run is already present.
    pub async fn clone_repo(&self) -> Result<()> {
        if self.is_git_repo() {
            log::info!(
                "Reusing existing working tree at {}",
                self.repo_path.display()
            );
            self.pull().await?;
            return Ok(());
        }

        if let Some(parent) = self.repo_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitOpsError::WorkTree {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let output = Command::new("git")
            .arg("clone")
            .arg("--branch")
            .arg(&self.branch)
            .arg("--single-branch")
            .arg(&self.url)
            .arg(&self.repo_path)
            .output()
            .await
            .map_err(|e| self.spawn_failure("clone", e))?;

        if output.status.success() {
            log::info!(
                "Cloned {} (branch {}) into {}",
                self.url,
                self.branch,
                self.repo_path.display()
            );
            Ok(())
        } else {
            Err(self.git_failure("clone", &output))
        }
    }

    /// Fast-forwards the working tree to the remote branch head. Safe to
    /// call repeatedly. The change count is taken from the commit range the
    /// pull advanced over, so a no-op pull reports zero.
    pub async fn pull(&self) -> Result<PullResult> {
        if !self.is_git_repo() {
            return Err(GitOpsError::GitNotInitialized(self.repo_path.clone()));
        }

        let before = self.head_commit().await?;

        let output = self
            .run_git("pull", &["pull", "--ff-only", "origin", &self.branch])
            .await?;
        if !output.status.success() {
            return Err(self.git_failure("pull", &output));
        }

        let after = self.head_commit().await?;
        if before == after {
            return Ok(PullResult {
                commit: after,
                files_changed: 0,
            });
        }

        let range = format!("{}..{}", before, after);
        let diff = self
            .run_git("diff", &["diff", "--name-only", &range])
            .await?;
        if !diff.status.success() {
            return Err(self.git_failure("diff", &diff));
        }

        let files_changed = String::from_utf8_lossy(&diff.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count() as u32;

        Ok(PullResult {
            commit: after,
            files_changed,
        })
    }

    /// Current commit hash of the working tree head.
    pub async fn head_commit(&self) -> Result<String> {
        let output = self.run_git("rev-parse", &["rev-parse", "HEAD"]).await?;
        if !output.status.success() {
            return Err(self.git_failure("rev-parse", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_git(&self, action: &str, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_failure(action, e))
    }

    /// Error for a git command that ran but exited non-zero. The message
    /// names the action and the monitored branch so pass-level log lines
    /// identify which desired-state operation failed.
    fn git_failure(&self, action: &str, output: &Output) -> GitOpsError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = match stderr.trim() {
            "" => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match stdout.trim() {
                    "" => format!("exit code {}", output.status.code().unwrap_or(-1)),
                    out => out.to_string(),
                }
            }
            err => err.to_string(),
        };
        GitOpsError::GitOperation(format!(
            "{} (branch {}): {}",
            action, self.branch, detail
        ))
    }

    fn spawn_failure(&self, action: &str, error: std::io::Error) -> GitOpsError {
        GitOpsError::GitOperation(format!("could not run git {}: {}", action, error))
    }
}
