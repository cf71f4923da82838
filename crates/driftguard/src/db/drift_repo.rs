//! Drift record repository — upsert and query operations for the
//! `drift_records` table.
//!
//! All writes go through `upsert`, keyed on the unique `resource_id`.
//! `id` and `created_at` are assigned on first insert and never change.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::{DriftChange, DriftRecord, DriftStatus};

/// Query filter parameters for drift record listing.
#[derive(Debug, Default, Clone)]
pub struct DriftFilter {
    pub namespace: Option<String>,
    pub drift_detected: Option<bool>,
    pub drift_status: Option<DriftStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl DriftFilter {
    pub fn by_status(status: DriftStatus) -> Self {
        Self {
            drift_status: Some(status),
            ..Default::default()
        }
    }
}

/// Aggregate counters served by the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DriftStatistics {
    pub total: u64,
    pub active: u64,
    pub resolved: u64,
    pub none: u64,
    pub active_last_24h: u64,
    pub resolved_last_24h: u64,
    pub active_pct: f64,
    pub resolved_pct: f64,
}

/// Inserts or updates the record for its `resource_id`. The stored `id`
/// and `created_at` of an existing row are preserved.
pub fn upsert(db: &Database, record: &DriftRecord) -> Result<(), DatabaseError> {
    let drift_details = to_json_text(&record.drift_details)?;
    let desired_state = record
        .desired_state
        .as_ref()
        .map(|v| to_json_text(v))
        .transpose()?;
    let live_state = to_json_text(&record.live_state)?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO drift_records (id, resource_id, kind, namespace, name,
                 drift_detected, drift_status, drift_details, desired_state, live_state,
                 last_known_good_hash, first_detected, resolved_at, resolution_message,
                 last_updated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(resource_id) DO UPDATE SET
                 drift_detected = excluded.drift_detected,
                 drift_status = excluded.drift_status,
                 drift_details = excluded.drift_details,
                 desired_state = excluded.desired_state,
                 live_state = excluded.live_state,
                 last_known_good_hash = excluded.last_known_good_hash,
                 first_detected = excluded.first_detected,
                 resolved_at = excluded.resolved_at,
                 resolution_message = excluded.resolution_message,
                 last_updated = excluded.last_updated",
            params![
                record.id,
                record.resource_id,
                record.kind,
                record.namespace,
                record.name,
                record.drift_detected as i64,
                record.drift_status.as_str(),
                drift_details,
                desired_state,
                live_state,
                record.last_known_good_hash,
                record.first_detected.map(fmt_time),
                record.resolved_at.map(fmt_time),
                record.resolution_message,
                fmt_time(record.last_updated),
                fmt_time(record.created_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a record by its resource identity.
pub fn find_by_resource_id(
    db: &Database,
    resource_id: &str,
) -> Result<Option<DriftRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM drift_records WHERE resource_id = ?1")?;
        let mut rows = stmt.query_map(params![resource_id], record_from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries records with filters, returning `(rows, total_count)`.
pub fn query(
    db: &Database,
    filter: &DriftFilter,
) -> Result<(Vec<DriftRecord>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref namespace) = filter.namespace {
            conditions.push(format!("namespace = ?{}", param_values.len() + 1));
            param_values.push(Box::new(namespace.clone()));
        }
        if let Some(detected) = filter.drift_detected {
            conditions.push(format!("drift_detected = ?{}", param_values.len() + 1));
            param_values.push(Box::new(detected as i64));
        }
        if let Some(status) = filter.drift_status {
            conditions.push(format!("drift_status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM drift_records {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM drift_records {} ORDER BY last_updated DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<DriftRecord> = stmt
            .query_map(params_ref.as_slice(), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Computes the aggregate counters. `now` anchors the 24-hour windows:
/// `last_updated` for active records, `resolved_at` for resolved ones.
pub fn statistics(db: &Database, now: DateTime<Utc>) -> Result<DriftStatistics, DatabaseError> {
    let cutoff = fmt_time(now - Duration::hours(24));

    db.with_conn(|conn| {
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM drift_records", [], |r| r.get(0))?;

        let count_status = |status: DriftStatus| -> Result<u64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM drift_records WHERE drift_status = ?1",
                params![status.as_str()],
                |r| r.get(0),
            )
        };
        let active = count_status(DriftStatus::Active)?;
        let resolved = count_status(DriftStatus::Resolved)?;
        let none = count_status(DriftStatus::None)?;

        let active_last_24h: u64 = conn.query_row(
            "SELECT COUNT(*) FROM drift_records
             WHERE drift_status = 'active' AND last_updated >= ?1",
            params![cutoff],
            |r| r.get(0),
        )?;
        let resolved_last_24h: u64 = conn.query_row(
            "SELECT COUNT(*) FROM drift_records
             WHERE drift_status = 'resolved' AND resolved_at >= ?1",
            params![cutoff],
            |r| r.get(0),
        )?;

        Ok(DriftStatistics {
            total,
            active,
            resolved,
            none,
            active_last_24h,
            resolved_last_24h,
            active_pct: percentage(active, total),
            resolved_pct: percentage(resolved, total),
        })
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Timestamps are stored as RFC 3339 with fixed-width microseconds so that
/// string comparison in SQL matches chronological order.
fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json_text<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialize(e.to_string()))
}

fn record_from_row(row: &Row<'_>) -> Result<DriftRecord, rusqlite::Error> {
    let drift_details: String = row.get("drift_details")?;
    let desired_state: Option<String> = row.get("desired_state")?;
    let live_state: String = row.get("live_state")?;
    let status: String = row.get("drift_status")?;

    Ok(DriftRecord {
        id: row.get("id")?,
        resource_id: row.get("resource_id")?,
        kind: row.get("kind")?,
        namespace: row.get("namespace")?,
        name: row.get("name")?,
        drift_detected: row.get::<_, i64>("drift_detected")? != 0,
        drift_status: DriftStatus::parse(&status).ok_or_else(|| {
            column_error(format!("unknown drift_status '{}'", status))
        })?,
        drift_details: parse_json_column::<Vec<DriftChange>>(&drift_details)?,
        desired_state: desired_state
            .as_deref()
            .map(parse_json_column::<serde_json::Value>)
            .transpose()?,
        live_state: parse_json_column(&live_state)?,
        last_known_good_hash: row.get("last_known_good_hash")?,
        first_detected: row
            .get::<_, Option<String>>("first_detected")?
            .as_deref()
            .map(parse_time_column)
            .transpose()?,
        resolved_at: row
            .get::<_, Option<String>>("resolved_at")?
            .as_deref()
            .map(parse_time_column)
            .transpose()?,
        resolution_message: row.get("resolution_message")?,
        last_updated: parse_time_column(&row.get::<_, String>("last_updated")?)?,
        created_at: parse_time_column(&row.get::<_, String>("created_at")?)?,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, rusqlite::Error> {
    serde_json::from_str(text).map_err(|e| column_error(e.to_string()))
}

fn parse_time_column(text: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| column_error(e.to_string()))
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
