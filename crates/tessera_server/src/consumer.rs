//! Ingest bus consumer.
//!
//! Deliveries arrive over an in-process channel fed by whatever transport
//! adapter fronts the deployment (Kafka, SQS, a replay tool). The consumer
//! acknowledges a delivery only after the engine future resolves
//! successfully; a failed delivery is never acked, so the producer
//! redelivers it. Deliveries process in arrival order, matching the
//! per-partition ordering a message bus provides.

use std::sync::Arc;

use tessera_engine::{Engines, IngestBatchRequest};
use tokio::sync::{mpsc, oneshot};

/// One message from the ingest topic.
pub struct Delivery {
    pub request: IngestBatchRequest,
    /// Sent exactly once on success. Dropping it un-acked tells the
    /// producer to redeliver.
    pub ack: oneshot::Sender<()>,
}

impl Delivery {
    /// Pairs a request with a fresh ack handle.
    pub fn new(request: IngestBatchRequest) -> (Self, oneshot::Receiver<()>) {
        let (ack, acked) = oneshot::channel();
        (Self { request, ack }, acked)
    }
}

/// Spawns the consumer loop and returns the sender half of its queue.
pub fn spawn(engines: Arc<Engines>, queue_depth: usize) -> mpsc::Sender<Delivery> {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    tokio::spawn(run(engines, rx));
    tx
}

/// Consumes deliveries until the channel closes.
pub async fn run(engines: Arc<Engines>, mut deliveries: mpsc::Receiver<Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        let tenant = delivery.request.tenant_id.clone();
        let rows = delivery.request.data.len();
        tracing::info!(tenant = %tenant, rows, "received ingest delivery");

        match engines.ingest.ingest_batch(delivery.request).await {
            Ok(()) => {
                let _ = delivery.ack.send(());
                tracing::info!(tenant = %tenant, rows, "delivery processed and acknowledged");
            }
            Err(err) => {
                // No ack: the message will be redelivered.
                tracing::error!(
                    tenant = %tenant,
                    error = %err,
                    "delivery failed; leaving unacknowledged"
                );
            }
        }
    }
}
