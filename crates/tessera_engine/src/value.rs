//! Record value model shared by the ingest and query paths.
//!
//! Every column value that crosses the engine boundary is one of the
//! variants of [`Value`]. Dispatching on a closed sum type (instead of
//! downcasting opaque objects) keeps coercion rules exhaustive: a variant a
//! code path does not handle is a visible `match` arm, not a silent skip.

use std::fmt;
use std::hash::{Hash, Hasher};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::store::UdtValue;

/// Column name → value mapping. Insertion order is preserved so query
/// results serialize deterministically.
pub type Record = IndexMap<String, Value>;

/// One column value in a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// UTF-8 text.
    Text(String),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    /// Double-precision float. Promoted to decimal on UDT writes.
    Double(f64),
    /// Calendar date without a time component.
    Date(NaiveDate),
    /// UTC instant.
    Timestamp(DateTime<Utc>),
    /// Driver-native UDT value, produced by the codec on the write path.
    Udt(UdtValue),
    /// Nested record, the pre-codec form of a UDT column.
    Record(Record),
    Null,
}

// Partition keys and cache keys need `Eq`. `Double` values with NaN payloads
// never reach those paths; the partial impl over `f64` is acceptable there.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Text(s) => {
                state.write_u8(0);
                s.hash(state);
            }
            Value::Int(v) => {
                state.write_u8(1);
                state.write_i32(*v);
            }
            Value::BigInt(v) => {
                state.write_u8(2);
                state.write_i64(*v);
            }
            Value::Decimal(d) => {
                state.write_u8(3);
                // Normalize so 1.50 and 1.5 (equal under PartialEq) agree.
                d.normalized().to_string().hash(state);
            }
            Value::Double(v) => {
                state.write_u8(4);
                state.write_u64(v.to_bits());
            }
            Value::Date(d) => {
                state.write_u8(5);
                d.hash(state);
            }
            Value::Timestamp(t) => {
                state.write_u8(6);
                t.hash(state);
            }
            Value::Udt(u) => {
                state.write_u8(7);
                u.type_name.hash(state);
                for (name, value) in &u.fields {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Value::Record(r) => {
                state.write_u8(8);
                for (name, value) in r {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Value::Null => state.write_u8(9),
        }
    }
}

impl Value {
    /// Short variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Decimal(_) => "decimal",
            Value::Double(_) => "double",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Udt(_) => "udt",
            Value::Record(_) => "record",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reads this value as a calendar date if it is one, or parses ISO-8601
    /// text. Callers routinely submit dates as JSON strings.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => s.parse::<NaiveDate>().ok(),
            _ => None,
        }
    }

    /// Maps a JSON value onto the closed variant set. Integral numbers that
    /// fit an `i32` become `Int`, wider integers `BigInt`, everything else
    /// numeric `Double`. Arrays have no admissible variant and collapse to
    /// null with a warning.
    pub fn from_json(raw: &serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(_) => {
                tracing::warn!("dropping JSON boolean value: no admissible column variant");
                Value::Null
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::BigInt(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(_) => {
                tracing::warn!("dropping JSON array value: no admissible column variant");
                Value::Null
            }
            serde_json::Value::Object(fields) => {
                let mut record = Record::new();
                for (name, value) in fields {
                    record.insert(name.clone(), Value::from_json(value));
                }
                Value::Record(record)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            Value::Udt(u) => write!(f, "<udt {}>", u.type_name),
            Value::Record(r) => write!(f, "<record {} fields>", r.len()),
            Value::Null => f.write_str("null"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::BigInt(v) => serializer.serialize_i64(*v),
            // Decimals, dates, and timestamps serialize as text so no
            // precision is lost crossing the JSON boundary.
            Value::Decimal(d) => serializer.serialize_str(&d.to_string()),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Date(d) => serializer.serialize_str(&d.to_string()),
            Value::Timestamp(t) => serializer.serialize_str(&t.to_rfc3339()),
            Value::Udt(u) => {
                let mut map = serializer.serialize_map(Some(u.fields.len()))?;
                for (name, value) in &u.fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Record(r) => {
                let mut map = serializer.serialize_map(Some(r.len()))?;
                for (name, value) in r {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&raw))
    }
}

/// Ordered tuple of scalar values grouping rows that share a storage
/// partition. Positions correspond to a tenant config's `partition_keys`.
/// In-memory only; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PartitionKey(Vec<Value>);

impl PartitionKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}
