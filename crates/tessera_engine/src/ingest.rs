//! Partition-aware batched ingestion.
//!
//! A heterogeneous batch is enriched (bucket derivation, UDT conversion),
//! grouped by partition key, and written as one logged batch per partition.
//! Batches execute concurrently behind the shared fan-out semaphore; the
//! store guarantees atomicity within a partition, nothing across them.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::bucket;
use crate::config::TenantConfig;
use crate::error::{EngineError, StoreError};
use crate::registry::TenantRegistry;
use crate::statement::StatementCache;
use crate::store::{BoundStatement, StoreSession};
use crate::udt;
use crate::value::{PartitionKey, Record, Value};

/// Default periodicity for the single-row path, which predates the batch
/// envelope and never carried one.
const DEFAULT_PERIODICITY: &str = "DAILY";

/// Envelope for a batch of records bound for one tenant table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestBatchRequest {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    pub periodicity: String,
    /// Explicit data-type family (NUMERIC, STRING, …). When absent, the
    /// engine classifies by exemplar from the first record.
    #[serde(default, alias = "dataType")]
    pub data_type: Option<String>,
    pub data: Vec<Record>,
}

impl IngestBatchRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tenant_id.trim().is_empty() {
            return Err(EngineError::invalid_request("tenant_id cannot be empty"));
        }
        if self.periodicity.trim().is_empty() {
            return Err(EngineError::invalid_request("periodicity cannot be empty"));
        }
        if self.data.is_empty() {
            return Err(EngineError::invalid_request("data cannot be empty"));
        }
        Ok(())
    }
}

pub struct IngestEngine {
    session: Arc<dyn StoreSession>,
    registry: Arc<TenantRegistry>,
    statements: Arc<StatementCache>,
    fanout: Arc<Semaphore>,
}

impl IngestEngine {
    pub fn new(
        session: Arc<dyn StoreSession>,
        registry: Arc<TenantRegistry>,
        statements: Arc<StatementCache>,
        fanout: Arc<Semaphore>,
    ) -> Self {
        Self {
            session,
            registry,
            statements,
            fanout,
        }
    }

    /// Ingests a single record as a one-element DAILY batch.
    pub async fn ingest_row(&self, tenant_id: &str, record: Record) -> Result<(), EngineError> {
        self.ingest_batch(IngestBatchRequest {
            tenant_id: tenant_id.to_string(),
            periodicity: DEFAULT_PERIODICITY.to_string(),
            data_type: None,
            data: vec![record],
        })
        .await
    }

    /// Ingests a batch: one logged batch per partition, all partitions
    /// concurrently. Completes when every batch has settled; if any failed,
    /// the error enumerates the failed partitions. Committed partitions are
    /// not rolled back.
    pub async fn ingest_batch(&self, request: IngestBatchRequest) -> Result<(), EngineError> {
        request.validate()?;

        tracing::info!(
            tenant = %request.tenant_id,
            periodicity = %request.periodicity,
            rows = request.data.len(),
            "processing ingest batch"
        );

        let data_type = match request.data_type.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => infer_data_type(&request.data[0]).to_string(),
        };

        let config =
            self.registry
                .lookup(&request.tenant_id, &request.periodicity, &data_type)?;

        let groups = self.group_by_partition(&config, request.data).await?;
        let total = groups.len();
        tracing::debug!(
            tenant = %request.tenant_id,
            partitions = total,
            "grouped batch by partition"
        );

        let mut inflight = FuturesUnordered::new();
        for (key, statements) in groups {
            let session = self.session.clone();
            let fanout = self.fanout.clone();
            inflight.push(async move {
                let result = match fanout.acquire_owned().await {
                    Ok(_permit) => session.execute_logged_batch(statements).await,
                    Err(_) => Err(StoreError::new("fan-out semaphore closed")),
                };
                (key, result)
            });
        }

        let mut failed = Vec::new();
        while let Some((key, result)) = inflight.next().await {
            if let Err(err) = result {
                tracing::warn!(partition = %key, error = %err, "partition batch failed");
                failed.push((key, err));
            }
        }

        if !failed.is_empty() {
            return Err(EngineError::PartialBatchFailure { failed, total });
        }

        tracing::info!(tenant = %request.tenant_id, partitions = total, "batch ingestion complete");
        Ok(())
    }

    /// Enriches every record and groups the resulting bound INSERTs by
    /// partition key. Statements keep record order within a group; the
    /// store applies them in submission order.
    async fn group_by_partition(
        &self,
        config: &TenantConfig,
        data: Vec<Record>,
    ) -> Result<HashMap<PartitionKey, Vec<BoundStatement>>, EngineError> {
        let mut groups: HashMap<PartitionKey, Vec<BoundStatement>> = HashMap::new();

        for record in data {
            let record = self.enrich(config, record)?;
            let key = partition_key(config, &record)?;

            let columns: Vec<String> = record.keys().cloned().collect();
            let statement = self.statements.insert_statement(config, &columns).await?;
            let bound = BoundStatement {
                statement,
                values: record.into_iter().collect(),
            };

            groups.entry(key).or_default().push(bound);
        }

        Ok(groups)
    }

    /// Injects the derived bucket value and converts nested records in UDT
    /// columns to driver UDT values.
    fn enrich(&self, config: &TenantConfig, mut record: Record) -> Result<Record, EngineError> {
        let bucket_value = bucket::calculate_bucket(config, &record)?;
        if let (Some(column), Some(value)) = (&config.bucket_column, bucket_value) {
            record.insert(column.clone(), value);
        }

        for column in &config.udt_columns {
            let Some(Value::Record(nested)) = record.get(column) else {
                continue;
            };
            let converted = udt::to_udt(self.session.as_ref(), &config.keyspace, column, nested)?;
            record.insert(column.clone(), Value::Udt(converted));
        }

        Ok(record)
    }
}

/// Partition-key tuple projected from an enriched record. Every component
/// must be present and non-null before any store I/O happens.
fn partition_key(config: &TenantConfig, record: &Record) -> Result<PartitionKey, EngineError> {
    let mut values = Vec::with_capacity(config.partition_keys.len());
    for column in &config.partition_keys {
        match record.get(column) {
            Some(value) if !value.is_null() => values.push(value.clone()),
            _ => {
                return Err(EngineError::InvalidRequest(format!(
                    "record is missing partition key column {column} for table {}.{}",
                    config.keyspace, config.table
                )))
            }
        }
    }
    Ok(PartitionKey::new(values))
}

/// Classifies a batch by exemplar: the `value` field of the first record's
/// `data` column. Callers do not annotate, so the first record speaks for
/// the batch; an unrepresentative first record routes the batch wrong,
/// which is why the request also accepts an explicit data type.
fn infer_data_type(record: &Record) -> &'static str {
    if let Some(Value::Record(data)) = record.get("data") {
        match data.get("value") {
            Some(Value::Int(_) | Value::BigInt(_) | Value::Double(_) | Value::Decimal(_)) => {
                return "NUMERIC"
            }
            Some(Value::Text(_)) => return "STRING",
            _ => {}
        }
    }
    "NUMERIC"
}
