//! Test harness for end-to-end reconciliation tests.
//!
//! Provides a real local Git origin repository (driven through the `git`
//! binary, as in production), an in-memory fake cluster, and an in-memory
//! store wired into a `DriftController`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use driftguard::cluster::{ClusterClient, ClusterError};
use driftguard::config::load_config_from_str;
use driftguard::controller::DriftController;
use driftguard::db::Database;
use driftguard::gitops::{GitDesiredState, GitRepository};

/// A local Git repository acting as the desired-state origin.
pub struct GitFixture {
    dir: TempDir,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "fixture@test.local"]);
        run_git(dir.path(), &["config", "user.name", "Fixture"]);
        // An initial commit so clones always succeed.
        std::fs::write(dir.path().join("README.md"), "manifests\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-m", "initial"]);
        Self { dir }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    /// Writes a file and commits it.
    pub fn commit_file(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        run_git(self.dir.path(), &["add", "."]);
        run_git(self.dir.path(), &["commit", "-m", "update"]);
    }

    /// Removes a file and commits the deletion.
    pub fn remove_file(&self, relative: &str) {
        run_git(self.dir.path(), &["rm", relative]);
        run_git(self.dir.path(), &["commit", "-m", "remove"]);
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("git invocation failed");
    assert!(
        output.status.success(),
        "git {:?}: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// In-memory live-state source with mutable contents.
#[derive(Default)]
pub struct FakeCluster {
    namespaces: Mutex<Vec<String>>,
    /// Resources keyed by `(namespace, kind_token)`.
    resources: Mutex<HashMap<(String, String), Vec<Value>>>,
    /// Pairs whose listing fails.
    failing: Mutex<HashSet<(String, String)>>,
}

impl FakeCluster {
    pub fn new(namespaces: &[&str]) -> Arc<Self> {
        let cluster = Self::default();
        *cluster.namespaces.lock().unwrap() =
            namespaces.iter().map(|s| s.to_string()).collect();
        Arc::new(cluster)
    }

    pub fn set_namespaces(&self, namespaces: &[&str]) {
        *self.namespaces.lock().unwrap() = namespaces.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_resources(&self, namespace: &str, token: &str, items: Vec<Value>) {
        self.resources
            .lock()
            .unwrap()
            .insert((namespace.to_string(), token.to_string()), items);
    }

    pub fn fail_listing(&self, namespace: &str, token: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((namespace.to_string(), token.to_string()));
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        Ok(self.namespaces.lock().unwrap().clone())
    }

    async fn list_resources(
        &self,
        kind_token: &str,
        namespace: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let key = (namespace.to_string(), kind_token.to_string());
        if self.failing.lock().unwrap().contains(&key) {
            return Err(ClusterError::CommandFailed {
                subject: format!("{}/{}", namespace, kind_token),
                message: "injected listing failure".to_string(),
            });
        }
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

/// Everything a reconciliation test needs, wired together.
pub struct Harness {
    pub origin: GitFixture,
    pub cluster: Arc<FakeCluster>,
    pub db: Database,
    pub controller: Arc<DriftController>,
    work_dir: TempDir,
}

impl Harness {
    /// Builds a harness monitoring `namespaces` for `resource_tokens`. The
    /// desired-state working tree is cloned before the controller is
    /// constructed, so tests can run passes without starting the loop.
    pub async fn new(namespaces: &[&str], resource_tokens: &[&str]) -> Self {
        Self::with_interval(namespaces, resource_tokens, 3600).await
    }

    pub async fn with_interval(
        namespaces: &[&str],
        resource_tokens: &[&str],
        interval_secs: u64,
    ) -> Self {
        let origin = GitFixture::new();
        let cluster = FakeCluster::new(namespaces);
        let db = Database::open_in_memory().unwrap();

        let work_dir = TempDir::new().unwrap();
        let clone_path = work_dir.path().join("desired");
        let repo = GitRepository::new(&clone_path, origin.url(), "main");
        let mut desired = GitDesiredState::new(repo, false);
        desired.clone_repo().await.unwrap();

        let namespaces_yaml = if namespaces.is_empty() {
            "[]".to_string()
        } else {
            format!("[{}]", namespaces.join(", "))
        };
        let config = load_config_from_str(&format!(
            r#"
git:
  url: {}
kubernetes:
  namespaces: {}
  resources: [{}]
reconcile:
  interval_secs: {}
"#,
            origin.url(),
            namespaces_yaml,
            resource_tokens.join(", "),
            interval_secs
        ))
        .unwrap();

        let controller = DriftController::new(&config, db.clone(), cluster.clone(), desired);

        Self {
            origin,
            cluster,
            db,
            controller,
            work_dir,
        }
    }
}

/// A live Deployment manifest as the cluster would report it, including
/// server-populated fields Git never declares.
pub fn live_deployment(namespace: &str, name: &str, replicas: i64, image: &str) -> Value {
    serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "6be1df31-9497-4b2a-9e83-2f0d10e15d81",
            "resourceVersion": "123456"
        },
        "spec": {
            "replicas": replicas,
            "template": {
                "spec": {
                    "containers": [{"name": "app", "image": image}]
                }
            }
        },
        "status": {
            "readyReplicas": replicas,
            "availableReplicas": replicas
        }
    })
}

/// The Git-side declaration matching `live_deployment`.
pub fn deployment_manifest(namespace: &str, name: &str, replicas: i64, image: &str) -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
  namespace: {namespace}
spec:
  replicas: {replicas}
  template:
    spec:
      containers:
        - name: app
          image: {image}
"#
    )
}
