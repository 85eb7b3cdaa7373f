//! Bidirectional mapping between record maps and driver UDT values.
//!
//! Both directions recurse through nested UDTs. The write direction coerces
//! record variants onto what the UDT schema stores; the read direction
//! passes driver values through unchanged so query output mirrors storage.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::store::{StoreSession, UdtValue};
use crate::value::{Record, Value};

/// Converts a record to a UDT value using the session's keyspace metadata.
///
/// `udt_name` is by convention the column (or, when recursing, field) name:
/// the codec cannot see the declared CQL type of the target without a
/// second metadata lookup, so the UDT is assumed to be named after the slot
/// it fills.
pub fn to_udt(
    session: &dyn StoreSession,
    keyspace: &str,
    udt_name: &str,
    record: &Record,
) -> Result<UdtValue, EngineError> {
    let def = session
        .udt(keyspace, udt_name)
        .ok_or_else(|| EngineError::UdtMetadataMissing {
            keyspace: keyspace.to_string(),
            udt: udt_name.to_string(),
        })?;

    let mut udt = UdtValue::unset(&def);

    for (field, value) in record {
        if value.is_null() {
            // Left unset; the driver writes null.
            continue;
        }
        let coerced = match coerce_field(session, keyspace, field, value)? {
            Some(coerced) => coerced,
            None => continue,
        };
        if !udt.set(field, coerced) {
            tracing::warn!(
                udt = %udt_name,
                field = %field,
                "record field not declared on UDT, leaving unset"
            );
        }
    }

    Ok(udt)
}

/// Coerces one record value onto its stored form. `Ok(None)` means the
/// field stays unset.
fn coerce_field(
    session: &dyn StoreSession,
    keyspace: &str,
    field: &str,
    value: &Value,
) -> Result<Option<Value>, EngineError> {
    let coerced = match value {
        Value::Decimal(d) => Value::Decimal(d.clone()),
        // Numeric UDT fields are declared as decimal; promote.
        Value::Double(d) => match format!("{d}").parse() {
            Ok(decimal) => Value::Decimal(decimal),
            Err(_) => {
                tracing::warn!(field = %field, value = %d, "non-finite double, leaving unset");
                return Ok(None);
            }
        },
        Value::Int(i) => Value::Decimal((*i).into()),
        Value::BigInt(i) => Value::Decimal((*i).into()),
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        Value::Text(s) => coerce_text(field, s),
        Value::Record(nested) => {
            // Nested UDT: the field name doubles as the nested type name.
            Value::Udt(to_udt(session, keyspace, field, nested)?)
        }
        other => {
            tracing::warn!(
                field = %field,
                kind = other.kind(),
                "unsupported UDT field variant, leaving unset"
            );
            return Ok(None);
        }
    };
    Ok(Some(coerced))
}

/// Callers frequently submit timestamps as JSON strings, and the codec has
/// no view of the declared field type. A field whose name contains "time"
/// is attempted as an ISO-8601 instant; on parse failure the text is kept
/// as-is.
fn coerce_text(field: &str, text: &str) -> Value {
    if field.to_ascii_lowercase().contains("time") {
        match DateTime::parse_from_rfc3339(text) {
            Ok(ts) => return Value::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => {
                tracing::warn!(field = %field, text = %text, "failed to parse timestamp text");
            }
        }
    }
    Value::Text(text.to_string())
}

/// Converts a UDT value back to a record, recursing through nested UDTs.
/// Field order in the output equals the UDT's declared order, so downstream
/// serialisation is deterministic.
pub fn to_record(udt: &UdtValue) -> Record {
    let mut record = Record::new();
    for (field, value) in &udt.fields {
        let emitted = match value {
            Value::Udt(nested) => Value::Record(to_record(nested)),
            other => other.clone(),
        };
        record.insert(field.clone(), emitted);
    }
    record
}
