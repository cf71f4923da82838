//! Semantic diff engine.
//!
//! Compares a live manifest against its desired form from Git and emits an
//! ordered list of classified field changes. The walk is driven by the
//! desired side: fields present only in live state (server-populated
//! `status`, defaulted values, managed metadata) are not reported, which
//! keeps real drift visible above the noise floor.
//!
//! The engine is pure; identical inputs produce identical change lists.
//! Mappings are traversed in sorted key order.

use chrono::Utc;
use serde_json::Value;

use crate::model::{ChangeType, DriftChange, DriftResult, Severity};

/// Stateless drift detector.
#[derive(Debug, Default)]
pub struct DriftDetector;

impl DriftDetector {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates one resource: walks the desired tree against the live tree
    /// and collects every divergence.
    pub fn detect_drift(&self, resource_id: &str, live: &Value, desired: &Value) -> DriftResult {
        log::debug!("Starting drift detection for {}", resource_id);

        let mut changes = Vec::new();
        deep_compare("", live, desired, &mut changes);

        let detected = !changes.is_empty();
        if detected {
            log::debug!(
                "Drift detected for {}: {} change(s)",
                resource_id,
                changes.len()
            );
        }

        DriftResult {
            resource_id: resource_id.to_string(),
            detected,
            changes,
            evaluated_at: Utc::now(),
            live_state: live.clone(),
            desired_state: Some(desired.clone()),
        }
    }
}

fn deep_compare(path: &str, live: &Value, desired: &Value, changes: &mut Vec<DriftChange>) {
    if json_type(live) != json_type(desired) {
        changes.push(DriftChange {
            field: path.to_string(),
            from: live.clone(),
            to: desired.clone(),
            change_type: ChangeType::TypeChange,
            severity: Severity::Medium,
        });
        return;
    }

    match (live, desired) {
        (Value::Object(live_map), Value::Object(desired_map)) => {
            for (key, desired_value) in desired_map {
                let current_path = join_path(path, key);
                match live_map.get(key) {
                    None => changes.push(DriftChange {
                        field: current_path,
                        from: Value::Null,
                        to: desired_value.clone(),
                        change_type: ChangeType::MissingField,
                        severity: Severity::High,
                    }),
                    Some(live_value) => {
                        deep_compare(&current_path, live_value, desired_value, changes)
                    }
                }
            }
        }
        (Value::Array(live_items), Value::Array(desired_items)) => {
            if live_items.len() != desired_items.len() {
                changes.push(DriftChange {
                    field: path.to_string(),
                    from: Value::from(live_items.len()),
                    to: Value::from(desired_items.len()),
                    change_type: ChangeType::ArrayLength,
                    severity: Severity::Medium,
                });
            }

            let max_len = live_items.len().max(desired_items.len());
            for i in 0..max_len {
                let current_path = format!("{}[{}]", path, i);
                match (live_items.get(i), desired_items.get(i)) {
                    (Some(live_item), Some(desired_item)) => {
                        deep_compare(&current_path, live_item, desired_item, changes)
                    }
                    (None, Some(desired_item)) => changes.push(DriftChange {
                        field: current_path,
                        from: Value::Null,
                        to: desired_item.clone(),
                        change_type: ChangeType::MissingElement,
                        severity: Severity::Medium,
                    }),
                    (Some(live_item), None) => changes.push(DriftChange {
                        field: current_path,
                        from: live_item.clone(),
                        to: Value::Null,
                        change_type: ChangeType::ExtraElement,
                        severity: Severity::Low,
                    }),
                    (None, None) => unreachable!("index below max of both lengths"),
                }
            }
        }
        _ => {
            if live != desired {
                let field_lower = path.to_lowercase();
                changes.push(DriftChange {
                    field: path.to_string(),
                    from: live.clone(),
                    to: desired.clone(),
                    change_type: classify_change(&field_lower),
                    severity: assess_severity(&field_lower, live, desired),
                });
            }
        }
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Classifies a scalar change by its field path. First match wins.
fn classify_change(field_lower: &str) -> ChangeType {
    const RULES: &[(&str, ChangeType)] = &[
        ("replicas", ChangeType::Scaling),
        ("image", ChangeType::VersionChange),
        ("resources", ChangeType::ResourceChange),
        ("env", ChangeType::ConfigurationChange),
        ("labels", ChangeType::LabelChange),
        ("annotations", ChangeType::AnnotationChange),
        ("ports", ChangeType::PortChange),
        ("volume", ChangeType::VolumeChange),
        ("secret", ChangeType::SecretChange),
        ("configmap", ChangeType::ConfigMapChange),
    ];

    for (needle, change_type) in RULES {
        if field_lower.contains(needle) {
            return *change_type;
        }
    }
    ChangeType::GenericChange
}

/// Assigns severity to a scalar change.
fn assess_severity(field_lower: &str, live: &Value, desired: &Value) -> Severity {
    if field_lower.contains("image")
        || field_lower.contains("secret")
        || field_lower.contains("resources.limits")
        || (field_lower.contains("replicas") && is_significant_replica_change(live, desired))
    {
        return Severity::High;
    }

    if field_lower.contains("replicas")
        || field_lower.contains("env")
        || field_lower.contains("ports")
        || field_lower.contains("volume")
        || field_lower.contains("resources.requests")
    {
        return Severity::Medium;
    }

    Severity::Low
}

/// A replica change is significant when the magnitude of the delta is at
/// least half the declared count. A declared count of zero with a differing
/// live count diverges and is always significant.
fn is_significant_replica_change(live: &Value, desired: &Value) -> bool {
    let (Some(live_count), Some(desired_count)) = (to_int(live), to_int(desired)) else {
        return false;
    };

    let diff = (live_count - desired_count).abs() as f64;
    let percent = diff / desired_count as f64 * 100.0;
    percent >= 50.0
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
