//! Live-state source.
//!
//! The reconciler only needs two capabilities from the cluster: enumerate
//! namespaces and list the manifests of one kind in one namespace. The
//! trait keeps the reconciler testable without a cluster; the production
//! implementation shells out to `kubectl` and parses its JSON output.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

/// Errors from live-state operations.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("kubectl invocation failed: {0}")]
    Spawn(String),

    #[error("kubectl failed for {subject}: {message}")]
    CommandFailed { subject: String, message: String },

    #[error("Failed to parse kubectl output for {subject}: {message}")]
    ParseOutput { subject: String, message: String },
}

/// Read-only view of the live cluster state.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// All namespaces the cluster reports.
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError>;

    /// Full manifests of every resource of `kind_token` (kubectl plural
    /// form, e.g. `deployments`) in `namespace`.
    async fn list_resources(
        &self,
        kind_token: &str,
        namespace: &str,
    ) -> Result<Vec<Value>, ClusterError>;
}

/// `kubectl`-backed live-state source.
pub struct KubectlClient {
    kubeconfig: Option<String>,
    context: Option<String>,
}

impl KubectlClient {
    pub fn new(kubeconfig: Option<String>, context: Option<String>) -> Self {
        Self {
            kubeconfig,
            context,
        }
    }

    async fn run_kubectl(&self, args: &[&str], subject: &str) -> Result<Value, ClusterError> {
        let mut cmd = Command::new("kubectl");
        if let Some(ref kubeconfig) = self.kubeconfig {
            cmd.args(["--kubeconfig", kubeconfig.as_str()]);
        }
        if let Some(ref context) = self.context {
            cmd.args(["--context", context.as_str()]);
        }
        cmd.args(args).args(["-o", "json"]);

        let output = cmd
            .output()
            .await
            .map_err(|e| ClusterError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                subject: subject.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ClusterError::ParseOutput {
            subject: subject.to_string(),
            message: e.to_string(),
        })
    }

    fn items(list: Value, subject: &str) -> Result<Vec<Value>, ClusterError> {
        match list.get("items") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(ClusterError::ParseOutput {
                subject: subject.to_string(),
                message: "response has no items array".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ClusterClient for KubectlClient {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let list = self.run_kubectl(&["get", "namespaces"], "namespaces").await?;
        let items = Self::items(list, "namespaces")?;

        Ok(items
            .iter()
            .filter_map(|item| item["metadata"]["name"].as_str())
            .map(String::from)
            .collect())
    }

    async fn list_resources(
        &self,
        kind_token: &str,
        namespace: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let subject = format!("{}/{}", namespace, kind_token);
        let list = self
            .run_kubectl(&["get", kind_token, "-n", namespace], &subject)
            .await?;
        Self::items(list, &subject)
    }
}
