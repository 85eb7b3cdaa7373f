//! Partition bucket derivation.
//!
//! Bucketed tables carry a derived partition-key column (today: the year of
//! a date field) so a tenant's partitions stay bounded. This module is the
//! plug-point for bucketing strategies; year-from-date is the only one
//! implemented.

use chrono::{DateTime, Datelike, Local, NaiveDate};

use crate::config::TenantConfig;
use crate::error::EngineError;
use crate::value::{Record, Value};

/// Date field names recognised on incoming records, searched in order.
/// The first key present wins.
const DATE_FIELDS: [&str; 5] = ["period_date", "date", "timestamp", "report_date", "event_date"];

/// Derives the bucket value for a record.
///
/// Returns `Ok(None)` when the config has no bucket column or the record
/// carries no recognised date field. The latter is deliberate: some tenants
/// supply the bucket value directly, and the engine must not reject those
/// records here.
pub fn calculate_bucket(
    config: &TenantConfig,
    record: &Record,
) -> Result<Option<Value>, EngineError> {
    if !config.has_bucket() {
        return Ok(None);
    }

    let Some((field, value)) = find_date_field(record) else {
        return Ok(None);
    };

    extract_year(field, value).map(|year| Some(Value::Int(year)))
}

fn find_date_field<'a>(record: &'a Record) -> Option<(&'static str, &'a Value)> {
    for field in DATE_FIELDS {
        if let Some(value) = record.get(field) {
            return Some((field, value));
        }
    }
    None
}

/// Year of a date-bearing value. Instants and epoch milliseconds are read
/// in the system's local zone, matching how callers stamp their records.
fn extract_year(field: &'static str, value: &Value) -> Result<i32, EngineError> {
    match value {
        Value::Date(date) => Ok(date.year()),
        Value::Timestamp(ts) => Ok(ts.with_timezone(&Local).year()),
        Value::Int(ms) => epoch_millis_year(field, i64::from(*ms)),
        Value::BigInt(ms) => epoch_millis_year(field, *ms),
        Value::Text(text) => match text.parse::<NaiveDate>() {
            Ok(date) => Ok(date.year()),
            Err(_) => Err(EngineError::BucketType {
                field: field.to_string(),
                kind: "unparseable text",
            }),
        },
        other => Err(EngineError::BucketType {
            field: field.to_string(),
            kind: other.kind(),
        }),
    }
}

fn epoch_millis_year(field: &'static str, ms: i64) -> Result<i32, EngineError> {
    match DateTime::from_timestamp_millis(ms) {
        Some(ts) => Ok(ts.with_timezone(&Local).year()),
        None => Err(EngineError::BucketType {
            field: field.to_string(),
            kind: "out-of-range epoch millis",
        }),
    }
}

/// All years covered by `[start, end]`, inclusive on both ends. The query
/// path issues one SELECT per returned year.
pub fn year_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<i32>, EngineError> {
    if start > end {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok((start.year()..=end.year()).collect())
}
