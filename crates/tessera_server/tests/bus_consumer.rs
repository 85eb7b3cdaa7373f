//! Acknowledgement semantics of the ingest bus consumer.

use std::sync::Arc;

use tessera_engine::mem::MemorySession;
use tessera_engine::{EngineConfig, Engines, IngestBatchRequest, Record, Value};
use tessera_server::consumer::{self, Delivery};
use tessera_server::bootstrap;

const KEYSPACE: &str = "test_keyspace";

fn engines() -> (Arc<MemorySession>, Arc<Engines>) {
    let session = Arc::new(MemorySession::new());
    bootstrap::apply_demo_schema(&session, KEYSPACE);
    let engines = Arc::new(Engines::new(session.clone(), EngineConfig::default()));
    bootstrap::register_defaults(&engines.registry, KEYSPACE).expect("defaults");
    (session, engines)
}

fn row(tenant: &str, date: &str) -> Record {
    serde_json::from_value(serde_json::json!({
        "tenant_id": tenant,
        "instrument_id": format!("{tenant}_STOCK"),
        "period_date": date,
        "field_id": "CLOSE",
        "data": { "value": 100.0 },
    }))
    .expect("record")
}

fn batch(tenant: &str, date: &str) -> IngestBatchRequest {
    IngestBatchRequest {
        tenant_id: tenant.to_string(),
        periodicity: "DAILY".to_string(),
        data_type: None,
        data: vec![row(tenant, date)],
    }
}

#[tokio::test]
async fn successful_delivery_is_acknowledged() -> anyhow::Result<()> {
    let (session, engines) = engines();
    let bus = consumer::spawn(engines, 8);

    let (delivery, acked) = Delivery::new(batch("IBM", "2024-01-10"));
    bus.send(delivery).await?;

    acked.await.expect("delivery must be acked");
    assert_eq!(session.row_count(KEYSPACE, bootstrap::DEMO_TABLE), 1);
    Ok(())
}

#[tokio::test]
async fn failed_delivery_is_left_unacknowledged() -> anyhow::Result<()> {
    let (session, engines) = engines();
    let bus = consumer::spawn(engines, 8);

    // Unregistered tenant: the engine rejects the batch, the consumer
    // drops the ack, and the producer would redeliver.
    let (delivery, acked) = Delivery::new(batch("UNKNOWN", "2024-01-10"));
    bus.send(delivery).await?;

    assert!(acked.await.is_err());
    assert_eq!(session.row_count(KEYSPACE, bootstrap::DEMO_TABLE), 0);
    Ok(())
}

#[tokio::test]
async fn store_fault_then_redelivery_succeeds() -> anyhow::Result<()> {
    let (session, engines) = engines();
    let bus = consumer::spawn(engines, 8);

    session.fail_partition(
        KEYSPACE,
        bootstrap::DEMO_TABLE,
        vec![
            Value::Text("IBM".into()),
            Value::Text("IBM_STOCK".into()),
            Value::Int(2024),
        ],
    );

    let (delivery, acked) = Delivery::new(batch("IBM", "2024-01-10"));
    bus.send(delivery).await?;
    assert!(acked.await.is_err());

    // The fault clears and the producer redelivers the same message.
    session.clear_failures();
    let (delivery, acked) = Delivery::new(batch("IBM", "2024-01-10"));
    bus.send(delivery).await?;
    acked.await.expect("redelivery must be acked");
    assert_eq!(session.row_count(KEYSPACE, bootstrap::DEMO_TABLE), 1);
    Ok(())
}

#[tokio::test]
async fn deliveries_process_in_arrival_order() -> anyhow::Result<()> {
    let (session, engines) = engines();
    let bus = consumer::spawn(engines, 8);

    let mut acks = Vec::new();
    for day in 10..15 {
        let (delivery, acked) = Delivery::new(batch("IBM", &format!("2024-01-{day}")));
        bus.send(delivery).await?;
        acks.push(acked);
    }
    for acked in acks {
        acked.await.expect("acked");
    }
    assert_eq!(session.row_count(KEYSPACE, bootstrap::DEMO_TABLE), 5);
    Ok(())
}
