//! Drift state machine.
//!
//! Pure function from `(prior record, new evaluation, clock)` to the next
//! record state. Keeping it free of store and clock access makes every row
//! of the transition table directly unit-testable.
//!
//! | prior      | detected | next       | effects                                  |
//! |------------|----------|------------|------------------------------------------|
//! | (none)     | false    | `none`     |                                          |
//! | (none)     | true     | `active`   | `first_detected = now`, log detected     |
//! | `none`     | false    | `none`     |                                          |
//! | `none`     | true     | `active`   | `first_detected = now`, log detected     |
//! | `active`   | true     | `active`   | keep `first_detected`; log continued on changed cardinality |
//! | `active`   | false    | `resolved` | `resolved_at = now`, keep `first_detected`, log resolved |
//! | `resolved` | true     | `active`   | `first_detected = now` (new episode), log detected |
//! | `resolved` | false    | `resolved` | no timestamp mutation                    |

use chrono::{DateTime, Utc};

use crate::model::{DriftChange, DriftRecord, DriftResult, DriftStatus};

/// Message stored on a record when a drift episode resolves.
pub const RESOLUTION_MESSAGE: &str = "Drift resolved. Configuration now matches Git.";

/// Which transition happened, for the observability contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    /// Drift newly observed (first pass, from `none`, or a new episode
    /// after `resolved`).
    Detected,
    /// Drift still active with a different number of changes than before.
    Continued,
    /// An active episode ended.
    Resolved,
}

/// Outcome of running the state machine for one resource.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: DriftStatus,
    pub first_detected: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_message: Option<String>,
    /// The change list to persist. Differs from the evaluation's list only
    /// for resolved records, which retain the episode's changes for
    /// forensics.
    pub drift_details: Vec<DriftChange>,
    pub event: Option<TransitionEvent>,
}

/// Decides the next record state from the prior record and a fresh
/// evaluation.
pub fn next_state(
    prior: Option<&DriftRecord>,
    outcome: &DriftResult,
    now: DateTime<Utc>,
) -> Decision {
    match prior {
        None => {
            if outcome.detected {
                Decision {
                    status: DriftStatus::Active,
                    first_detected: Some(now),
                    resolved_at: None,
                    resolution_message: None,
                    drift_details: outcome.changes.clone(),
                    event: Some(TransitionEvent::Detected),
                }
            } else {
                Decision {
                    status: DriftStatus::None,
                    first_detected: None,
                    resolved_at: None,
                    resolution_message: None,
                    drift_details: Vec::new(),
                    event: None,
                }
            }
        }
        Some(prior) => match (prior.drift_status, outcome.detected) {
            (DriftStatus::Active, false) => Decision {
                status: DriftStatus::Resolved,
                first_detected: prior.first_detected,
                resolved_at: Some(now),
                resolution_message: Some(RESOLUTION_MESSAGE.to_string()),
                drift_details: prior.drift_details.clone(),
                event: Some(TransitionEvent::Resolved),
            },
            (DriftStatus::Active, true) => {
                let event = if outcome.changes.len() != prior.drift_details.len() {
                    Some(TransitionEvent::Continued)
                } else {
                    None
                };
                Decision {
                    status: DriftStatus::Active,
                    first_detected: prior.first_detected,
                    resolved_at: prior.resolved_at,
                    resolution_message: None,
                    drift_details: outcome.changes.clone(),
                    event,
                }
            }
            (DriftStatus::Resolved, true) | (DriftStatus::None, true) => Decision {
                status: DriftStatus::Active,
                first_detected: Some(now),
                resolved_at: prior.resolved_at,
                resolution_message: None,
                drift_details: outcome.changes.clone(),
                event: Some(TransitionEvent::Detected),
            },
            (DriftStatus::Resolved, false) => Decision {
                status: DriftStatus::Resolved,
                first_detected: prior.first_detected,
                resolved_at: prior.resolved_at,
                resolution_message: prior.resolution_message.clone(),
                drift_details: prior.drift_details.clone(),
                event: None,
            },
            (DriftStatus::None, false) => Decision {
                status: DriftStatus::None,
                first_detected: None,
                resolved_at: None,
                resolution_message: None,
                drift_details: Vec::new(),
                event: None,
            },
        },
    }
}
