//! Manifest index over the Git working tree.
//!
//! Walks the working tree for YAML files, parses each as a multi-document
//! stream, and indexes every Kubernetes-shaped document by
//! `(kind, namespace, name)`. Documents only need `apiVersion`, `kind` and
//! `metadata.name` to be indexed; no further schema validation is applied.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::error::{GitOpsError, Result};

type ManifestKey = (String, String, String);

/// In-memory index of the manifests declared in Git, rebuilt after every
/// successful pull.
#[derive(Debug, Default)]
pub struct ManifestIndex {
    manifests: HashMap<ManifestKey, Value>,
}

impl ManifestIndex {
    /// Builds an index from every YAML document under `root`.
    pub fn build(root: &Path) -> Result<Self> {
        let mut manifests = HashMap::new();
        let mut files = 0usize;

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| GitOpsError::WalkTree {
                path: root.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();

            if !path.is_file() || !is_visible_yaml(root, path) {
                continue;
            }

            files += 1;
            index_file(path, &mut manifests)?;
        }

        log::debug!(
            "Indexed {} manifest document(s) from {} YAML file(s)",
            manifests.len(),
            files
        );

        Ok(Self { manifests })
    }

    /// Looks up the declared manifest for a resource identity. Returns
    /// `None` when the resource is not declared in Git.
    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<&Value> {
        self.manifests
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// Hidden files and directories (`.git`, `.github`, ...) are skipped, as is
/// anything without a YAML extension.
fn is_visible_yaml(root: &Path, path: &Path) -> bool {
    if let Ok(relative) = path.strip_prefix(root) {
        let hidden = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
        });
        if hidden {
            return false;
        }
    }

    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn index_file(path: &Path, manifests: &mut HashMap<ManifestKey, Value>) -> Result<()> {
    let content = std::fs::read_to_string(path).map_err(|e| GitOpsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    for document in serde_yaml::Deserializer::from_str(&content) {
        let yaml = match serde_yaml::Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                // A broken document must never abort a pass; the stale
                // index entry (if any) keeps serving until the file parses
                // again.
                log::warn!("Skipping unparseable document in {}: {}", path.display(), e);
                continue;
            }
        };

        let manifest: Value = match serde_json::to_value(&yaml) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Skipping non-JSON-convertible document in {}: {}", path.display(), e);
                continue;
            }
        };

        let Some(key) = manifest_key(&manifest) else {
            log::debug!(
                "Skipping document without apiVersion/kind/metadata.name in {}",
                path.display()
            );
            continue;
        };

        if manifests.contains_key(&key) {
            log::warn!(
                "Duplicate manifest {}:{}:{} in {}; last document wins",
                key.0,
                key.1,
                key.2,
                path.display()
            );
        }
        manifests.insert(key, manifest);
    }

    Ok(())
}

fn manifest_key(manifest: &Value) -> Option<ManifestKey> {
    manifest.get("apiVersion")?;
    let kind = manifest.get("kind")?.as_str()?;
    let metadata = manifest.get("metadata")?;
    let name = metadata.get("name")?.as_str()?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or("");

    Some((kind.to_string(), namespace.to_string(), name.to_string()))
}
