//! Polymorphic routing: one tenant, multiple physical tables.

mod common;

use tessera_engine::{IngestBatchRequest, TenantConfig};

use common::{engines, memory_session, record, KEYSPACE};

const STRING_TABLE: &str = "DailyString";

fn string_row(value: &str) -> tessera_engine::Record {
    record(serde_json::json!({
        "tenant_id": "IBM",
        "instrument_id": "IBM_STOCK",
        "period_date": "2024-01-10",
        "field_id": "rating",
        "data": { "value": value },
    }))
}

#[tokio::test]
async fn data_type_families_route_to_distinct_tables() -> anyhow::Result<()> {
    let session = memory_session();
    session.create_table(
        KEYSPACE,
        STRING_TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        &["period_date", "field_id"],
    );

    let engines = engines(session.clone());
    engines.registry.register(
        "IBM",
        "DAILY",
        "STRING",
        TenantConfig::with_bucket(
            KEYSPACE,
            STRING_TABLE,
            &["tenant_id", "instrument_id", "period_year"],
            "period_year",
            &["data"],
        ),
    )?;

    // The two routing keys resolve to distinct configs.
    let numeric = engines.registry.lookup("IBM", "DAILY", "NUMERIC")?;
    let string = engines.registry.lookup("IBM", "DAILY", "STRING")?;
    assert_eq!(numeric.table, common::TABLE);
    assert_eq!(string.table, STRING_TABLE);

    // A batch whose exemplar value is text lands in the STRING table.
    engines
        .ingest
        .ingest_batch(IngestBatchRequest {
            tenant_id: "IBM".into(),
            periodicity: "DAILY".into(),
            data_type: None,
            data: vec![string_row("BUY")],
        })
        .await?;

    assert_eq!(session.row_count(KEYSPACE, STRING_TABLE), 1);
    assert_eq!(session.row_count(KEYSPACE, common::TABLE), 0);
    Ok(())
}

#[tokio::test]
async fn explicit_data_type_overrides_exemplar_inference() -> anyhow::Result<()> {
    let session = memory_session();
    session.create_table(
        KEYSPACE,
        STRING_TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        &["period_date", "field_id"],
    );

    let engines = engines(session.clone());
    engines.registry.register(
        "IBM",
        "DAILY",
        "STRING",
        TenantConfig::with_bucket(
            KEYSPACE,
            STRING_TABLE,
            &["tenant_id", "instrument_id", "period_year"],
            "period_year",
            &["data"],
        ),
    )?;

    // The exemplar value is numeric, so inference alone would route to
    // DailyNumeric; the explicit annotation must win.
    engines
        .ingest
        .ingest_batch(IngestBatchRequest {
            tenant_id: "IBM".into(),
            periodicity: "DAILY".into(),
            data_type: Some("STRING".into()),
            data: vec![record(serde_json::json!({
                "tenant_id": "IBM",
                "instrument_id": "IBM_STOCK",
                "period_date": "2024-01-11",
                "field_id": "close",
                "data": { "value": 150.0 },
            }))],
        })
        .await?;

    assert_eq!(session.row_count(KEYSPACE, STRING_TABLE), 1);
    assert_eq!(session.row_count(KEYSPACE, common::TABLE), 0);
    Ok(())
}

#[tokio::test]
async fn unregistered_data_type_fails_with_known_keys() {
    let session = memory_session();
    let engines = engines(session.clone());

    // Only NUMERIC is registered; a string exemplar routes to STRING.
    let err = engines
        .ingest
        .ingest_batch(IngestBatchRequest {
            tenant_id: "IBM".into(),
            periodicity: "DAILY".into(),
            data_type: None,
            data: vec![string_row("SELL")],
        })
        .await
        .expect_err("must fail");

    let message = err.to_string();
    assert!(message.contains("(IBM, DAILY, STRING)"));
    assert!(message.contains("(IBM, DAILY, NUMERIC)"));
}
