//! Shared helpers for integration tests.
//!
//! The demo schema mirrors a typical multi-tenant time-series layout: a
//! composite partition key bucketed by year, a date clustering column, and
//! a UDT column named after the type it stores (the engine resolves UDT
//! metadata by column name).

#![allow(dead_code)]

use std::sync::Arc;

use tessera_engine::mem::MemorySession;
use tessera_engine::store::UdtDef;
use tessera_engine::{EngineConfig, Engines, Record, TenantConfig, Value};

pub const KEYSPACE: &str = "test_keyspace";
pub const TABLE: &str = "DailyNumeric";

/// In-memory session with the demo keyspace, UDT, and table created.
pub fn memory_session() -> Arc<MemorySession> {
    let session = MemorySession::new();
    session.create_keyspace(KEYSPACE);
    session.create_udt(KEYSPACE, UdtDef::new("data", &["value", "report_time"]));
    session.create_table(
        KEYSPACE,
        TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        &["period_date", "field_id"],
    );
    Arc::new(session)
}

/// Engines wired to `session`, with the IBM daily-numeric tenant registered.
pub fn engines(session: Arc<MemorySession>) -> Engines {
    let engines = Engines::new(session, EngineConfig::default());
    engines
        .registry
        .register("IBM", "DAILY", "NUMERIC", daily_numeric_config())
        .expect("register IBM");
    engines
}

pub fn daily_numeric_config() -> TenantConfig {
    TenantConfig::with_bucket(
        KEYSPACE,
        TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        "period_year",
        &["data"],
    )
}

/// A row shaped the way it arrives over the ingest API: dates and report
/// times as text, the UDT column as a nested object.
pub fn stock_row(tenant: &str, instrument: &str, date: &str, field: &str, value: f64) -> Record {
    record(serde_json::json!({
        "tenant_id": tenant,
        "instrument_id": instrument,
        "period_date": date,
        "field_id": field,
        "data": {
            "value": value,
            "report_time": format!("{date}T16:00:00Z"),
        },
    }))
}

/// Query criteria covering `[start, end]` for one instrument.
pub fn range_criteria(instrument: &str, start: &str, end: &str) -> Record {
    record(serde_json::json!({
        "instrument_id": instrument,
        "start_date": start,
        "end_date": end,
    }))
}

pub fn record(raw: serde_json::Value) -> Record {
    serde_json::from_value(raw).expect("record from json")
}

/// Year carried in a returned record's bucket column.
pub fn period_year(record: &Record) -> i32 {
    match record.get("period_year") {
        Some(Value::Int(year)) => *year,
        other => panic!("expected period_year int, got {other:?}"),
    }
}
