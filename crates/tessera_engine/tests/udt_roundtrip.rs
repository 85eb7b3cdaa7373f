//! Nested-UDT round trips through the full ingest/query pipeline.

mod common;

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use tessera_engine::store::UdtDef;
use tessera_engine::Value;

use common::{engines, memory_session, range_criteria, record, KEYSPACE};

#[tokio::test]
async fn nested_udt_round_trips_with_coerced_types() -> anyhow::Result<()> {
    let session = memory_session();
    // `data` wraps a nested `inner` UDT; both are named after the slot
    // they fill, which is how the codec resolves their metadata.
    session.create_udt(KEYSPACE, UdtDef::new("data", &["inner"]));
    session.create_udt(KEYSPACE, UdtDef::new("inner", &["value", "report_time"]));

    let engines = engines(session.clone());

    engines
        .ingest
        .ingest_row(
            "IBM",
            record(serde_json::json!({
                "tenant_id": "IBM",
                "instrument_id": "IBM_STOCK",
                "period_date": "2024-01-01",
                "field_id": "quote",
                "data": {
                    "inner": {
                        "value": 1.5,
                        "report_time": "2024-01-01T00:00:00Z",
                    },
                },
            })),
        )
        .await?;

    let results = engines
        .query
        .retrieve("IBM", range_criteria("IBM_STOCK", "2024-01-01", "2024-01-01"))
        .await?;
    assert_eq!(results.len(), 1);

    let Some(Value::Record(data)) = results[0].get("data") else {
        panic!("expected decoded data record");
    };
    let Some(Value::Record(inner)) = data.get("inner") else {
        panic!("expected decoded inner record");
    };

    assert_eq!(
        inner.get("value"),
        Some(&Value::Decimal("1.5".parse::<BigDecimal>()?))
    );
    let expected = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("timestamp");
    assert_eq!(inner.get("report_time"), Some(&Value::Timestamp(expected)));
    Ok(())
}

#[tokio::test]
async fn declared_but_unset_udt_fields_come_back_null() -> anyhow::Result<()> {
    let session = memory_session();
    let engines = engines(session.clone());

    engines
        .ingest
        .ingest_row(
            "IBM",
            record(serde_json::json!({
                "tenant_id": "IBM",
                "instrument_id": "IBM_STOCK",
                "period_date": "2024-01-01",
                "field_id": "close",
                "data": { "value": 150.0 },
            })),
        )
        .await?;

    let results = engines
        .query
        .retrieve("IBM", range_criteria("IBM_STOCK", "2024-01-01", "2024-01-01"))
        .await?;
    let Some(Value::Record(data)) = results[0].get("data") else {
        panic!("expected decoded data record");
    };
    // Field order equals the UDT's declared order, nulls included.
    let fields: Vec<&String> = data.keys().collect();
    assert_eq!(fields, ["value", "report_time"]);
    assert_eq!(data.get("report_time"), Some(&Value::Null));
    Ok(())
}

#[tokio::test]
async fn missing_udt_metadata_fails_the_ingest() {
    let session = memory_session();
    let engines = engines(session.clone());

    // A tenant whose UDT column has no matching type in the keyspace.
    session.create_table(
        KEYSPACE,
        "DailyExtra",
        &["tenant_id", "instrument_id", "period_year"],
        &["period_date", "field_id"],
    );
    engines
        .registry
        .register(
            "IBM",
            "MONTHLY",
            "NUMERIC",
            tessera_engine::TenantConfig::with_bucket(
                KEYSPACE,
                "DailyExtra",
                &["tenant_id", "instrument_id", "period_year"],
                "period_year",
                &["extra"],
            ),
        )
        .expect("register");

    let err = engines
        .ingest
        .ingest_batch(tessera_engine::IngestBatchRequest {
            tenant_id: "IBM".into(),
            periodicity: "MONTHLY".into(),
            data_type: None,
            data: vec![record(serde_json::json!({
                "tenant_id": "IBM",
                "instrument_id": "IBM_STOCK",
                "period_date": "2024-01-01",
                "field_id": "close",
                "extra": { "value": 1.0 },
            }))],
        })
        .await
        .expect_err("missing UDT metadata must fail");

    assert!(matches!(
        err,
        tessera_engine::EngineError::UdtMetadataMissing { .. }
    ));
}
