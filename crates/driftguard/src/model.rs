//! Core data model for drift tracking.
//!
//! A drift record is the single persistent artifact of the system: one row
//! per resource identity, upserted on every reconciliation pass. Everything
//! else (diff results, transition decisions) is transient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Drift status of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    /// Live state currently diverges from Git.
    Active,
    /// A previous drift episode ended; live state matches Git again.
    Resolved,
    /// No drift has been observed since tracking began.
    None,
}

impl DriftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftStatus::Active => "active",
            DriftStatus::Resolved => "resolved",
            DriftStatus::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DriftStatus::Active),
            "resolved" => Some(DriftStatus::Resolved),
            "none" => Some(DriftStatus::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an individual field change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an individual field change.
///
/// Domain categories are assigned by substring match on the field path;
/// structural categories come from the shape comparison itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Scaling,
    VersionChange,
    ResourceChange,
    ConfigurationChange,
    LabelChange,
    AnnotationChange,
    PortChange,
    VolumeChange,
    SecretChange,
    ConfigMapChange,
    GenericChange,
    TypeChange,
    MissingField,
    MissingElement,
    ExtraElement,
    ArrayLength,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Scaling => "Scaling",
            ChangeType::VersionChange => "VersionChange",
            ChangeType::ResourceChange => "ResourceChange",
            ChangeType::ConfigurationChange => "ConfigurationChange",
            ChangeType::LabelChange => "LabelChange",
            ChangeType::AnnotationChange => "AnnotationChange",
            ChangeType::PortChange => "PortChange",
            ChangeType::VolumeChange => "VolumeChange",
            ChangeType::SecretChange => "SecretChange",
            ChangeType::ConfigMapChange => "ConfigMapChange",
            ChangeType::GenericChange => "GenericChange",
            ChangeType::TypeChange => "TypeChange",
            ChangeType::MissingField => "MissingField",
            ChangeType::MissingElement => "MissingElement",
            ChangeType::ExtraElement => "ExtraElement",
            ChangeType::ArrayLength => "ArrayLength",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed difference between live and desired state.
///
/// `from` is the value seen live, `to` the value declared in Git.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftChange {
    /// Dotted field path with `[i]` for sequence indices.
    pub field: String,
    pub from: Value,
    pub to: Value,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub severity: Severity,
}

/// Transient result of evaluating one resource on one pass.
#[derive(Debug, Clone)]
pub struct DriftResult {
    pub resource_id: String,
    pub detected: bool,
    pub changes: Vec<DriftChange>,
    pub evaluated_at: DateTime<Utc>,
    pub live_state: Value,
    /// None when the resource is not declared in Git.
    pub desired_state: Option<Value>,
}

impl DriftResult {
    /// Outcome for a live resource with no manifest in Git. Undeclared
    /// resources are never considered drifted.
    pub fn undeclared(resource_id: String, live_state: Value, now: DateTime<Utc>) -> Self {
        Self {
            resource_id,
            detected: false,
            changes: Vec::new(),
            evaluated_at: now,
            live_state,
            desired_state: None,
        }
    }
}

/// Persistent drift record, one per resource identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftRecord {
    /// Opaque identifier assigned on first insert.
    pub id: String,
    /// `"<Kind>:<Namespace>:<Name>"`, unique in the store.
    pub resource_id: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub drift_detected: bool,
    pub drift_status: DriftStatus,
    /// Change list of the most recent evaluation while active, retained
    /// after resolution for forensics.
    pub drift_details: Vec<DriftChange>,
    pub desired_state: Option<Value>,
    pub live_state: Value,
    /// `sha256:`-prefixed hash of the canonicalised desired state.
    pub last_known_good_hash: Option<String>,
    /// Start of the current (or last) drift episode.
    pub first_detected: Option<DateTime<Utc>>,
    /// When the last episode transitioned into `resolved`.
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_message: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Builds the stable resource identity string used to correlate
/// observations across passes.
pub fn resource_id(kind: &str, namespace: &str, name: &str) -> String {
    format!("{}:{}:{}", kind, namespace, name)
}

/// Normalises a configured resource token to the canonical PascalCase kind
/// shared by the cluster and Git sides. Unknown tokens pass through
/// unchanged.
pub fn normalize_kind(token: &str) -> String {
    match token {
        "deployments" => "Deployment",
        "services" => "Service",
        "configmaps" => "ConfigMap",
        "secrets" => "Secret",
        "pods" => "Pod",
        "ingresses" => "Ingress",
        "jobs" => "Job",
        "cronjobs" => "CronJob",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_format() {
        assert_eq!(
            resource_id("Deployment", "prod", "api"),
            "Deployment:prod:api"
        );
    }

    #[test]
    fn test_normalize_known_kinds() {
        assert_eq!(normalize_kind("deployments"), "Deployment");
        assert_eq!(normalize_kind("services"), "Service");
        assert_eq!(normalize_kind("configmaps"), "ConfigMap");
        assert_eq!(normalize_kind("secrets"), "Secret");
        assert_eq!(normalize_kind("pods"), "Pod");
        assert_eq!(normalize_kind("ingresses"), "Ingress");
        assert_eq!(normalize_kind("jobs"), "Job");
        assert_eq!(normalize_kind("cronjobs"), "CronJob");
    }

    #[test]
    fn test_normalize_unknown_kind_passes_through() {
        assert_eq!(normalize_kind("statefulsets"), "statefulsets");
        assert_eq!(normalize_kind("CustomThing"), "CustomThing");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [DriftStatus::Active, DriftStatus::Resolved, DriftStatus::None] {
            assert_eq!(DriftStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DriftStatus::parse("pending"), None);
    }

    #[test]
    fn test_change_type_serializes_to_tag_string() {
        let json = serde_json::to_string(&ChangeType::VersionChange).unwrap();
        assert_eq!(json, "\"VersionChange\"");
        let json = serde_json::to_string(&ChangeType::MissingField).unwrap();
        assert_eq!(json, "\"MissingField\"");
    }

    #[test]
    fn test_drift_change_serialization() {
        let change = DriftChange {
            field: "spec.replicas".to_string(),
            from: serde_json::json!(3),
            to: serde_json::json!(2),
            change_type: ChangeType::Scaling,
            severity: Severity::High,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["field"], "spec.replicas");
        assert_eq!(json["type"], "Scaling");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["from"], 3);
        assert_eq!(json["to"], 2);
    }

    #[test]
    fn test_record_serializes_nullable_fields() {
        let record = DriftRecord {
            id: "r1".to_string(),
            resource_id: "Deployment:ns:app".to_string(),
            kind: "Deployment".to_string(),
            namespace: "ns".to_string(),
            name: "app".to_string(),
            drift_detected: false,
            drift_status: DriftStatus::None,
            drift_details: Vec::new(),
            desired_state: None,
            live_state: serde_json::json!({"kind": "Deployment"}),
            last_known_good_hash: None,
            first_detected: None,
            resolved_at: None,
            resolution_message: None,
            last_updated: Utc::now(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["first_detected"].is_null());
        assert!(json["resolved_at"].is_null());
        assert!(json["desired_state"].is_null());
        assert_eq!(json["drift_status"], "none");
        assert_eq!(json["drift_details"], serde_json::json!([]));
    }
}
