//! Scatter-gather retrieval over bucketed tables.
//!
//! A date-range query against a bucketed table decomposes into one SELECT
//! per year bucket, fanned out concurrently and merged without loss. Result
//! order is unspecified; callers sort if they need ordering.

use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::bucket;
use crate::config::TenantConfig;
use crate::error::{EngineError, StoreError};
use crate::registry::TenantRegistry;
use crate::statement::{StatementCache, END_BIND, START_BIND};
use crate::store::{BoundStatement, Row, StoreSession};
use crate::udt;
use crate::value::{Record, Value};

/// Routing defaults until callers annotate queries the way ingest requests
/// are annotated. Periodicity can be supplied per call; data-type cannot.
const DEFAULT_PERIODICITY: &str = "DAILY";
const DEFAULT_DATA_TYPE: &str = "NUMERIC";

pub struct QueryEngine {
    session: Arc<dyn StoreSession>,
    registry: Arc<TenantRegistry>,
    statements: Arc<StatementCache>,
    fanout: Arc<Semaphore>,
}

impl QueryEngine {
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

    /// Retrieves records matching `criteria` with the default periodicity.
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        criteria: Record,
    ) -> Result<Vec<Record>, EngineError> {
        self.retrieve_with(tenant_id, DEFAULT_PERIODICITY, criteria).await
    }

    /// Retrieves records matching `criteria`, which must contain
    /// `start_date` and `end_date` and should supply a value for every
    /// partition-key column except the bucket column.
    pub async fn retrieve_with(
        &self,
        tenant_id: &str,
        periodicity: &str,
        mut criteria: Record,
    ) -> Result<Vec<Record>, EngineError> {
        let start = required_date(&criteria, START_BIND)?;
        let end = required_date(&criteria, END_BIND)?;
        if start > end {
            return Err(EngineError::InvalidRequest(format!(
                "start_date {start} is after end_date {end}"
            )));
        }

        let config = self
            .registry
            .lookup(tenant_id, periodicity, DEFAULT_DATA_TYPE)?;

        // The tenant id is itself a partition-key value.
        criteria.insert("tenant_id".to_string(), Value::Text(tenant_id.to_string()));

        let Some(bucket_column) = config.bucket_column.clone() else {
            let rows = self.bucket_select(&config, &criteria, start, end).await?;
            return Ok(rows.into_iter().map(|row| map_row(&config, row)).collect());
        };

        let years = bucket::year_range(start, end)?;
        tracing::info!(
            tenant = %tenant_id,
            start = %start,
            end = %end,
            buckets = years.len(),
            "scatter-gather query"
        );

        let mut inflight = FuturesUnordered::new();
        for year in years {
            let mut bucket_criteria = criteria.clone();
            bucket_criteria.insert(bucket_column.clone(), Value::Int(year));
            let fanout = self.fanout.clone();
            let config = config.clone();
            inflight.push(async move {
                let result = match fanout.acquire_owned().await {
                    Ok(_permit) => self.bucket_select(&config, &bucket_criteria, start, end).await,
                    Err(_) => Err(EngineError::Store(StoreError::new("fan-out semaphore closed"))),
                };
                (year, result)
            });
        }

        let mut rows = Vec::new();
        let mut failures: Vec<(i32, StoreError)> = Vec::new();
        while let Some((year, result)) = inflight.next().await {
            match result {
                Ok(bucket_rows) => rows.extend(bucket_rows),
                Err(err) => {
                    tracing::warn!(year, error = %err, "bucket SELECT failed");
                    failures.push((year, into_store_error(err)));
                }
            }
        }

        // Partial results silently mislead callers; any bucket failure
        // fails the whole retrieve.
        if !failures.is_empty() {
            failures.sort_by_key(|(year, _)| *year);
            return Err(EngineError::ScatterGatherFailure { failures });
        }

        tracing::info!(tenant = %tenant_id, rows = rows.len(), "gathered query results");
        Ok(rows.into_iter().map(|row| map_row(&config, row)).collect())
    }

    /// One SELECT bounded by the date range, with equality on every
    /// partition-key column the criteria supplies.
    async fn bucket_select(
        &self,
        config: &TenantConfig,
        criteria: &Record,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>, EngineError> {
        let eq_columns: Vec<String> = config
            .partition_keys
            .iter()
            .filter(|column| criteria.get(*column).is_some_and(|v| !v.is_null()))
            .cloned()
            .collect();

        let statement = self.statements.select_statement(config, &eq_columns).await?;

        let mut values: Vec<(String, Value)> = Vec::with_capacity(eq_columns.len() + 2);
        for column in &eq_columns {
            if let Some(value) = criteria.get(column) {
                values.push((column.clone(), value.clone()));
            }
        }
        values.push((START_BIND.to_string(), Value::Date(start)));
        values.push((END_BIND.to_string(), Value::Date(end)));

        let rows = self
            .session
            .execute(BoundStatement { statement, values })
            .await?;
        Ok(rows)
    }
}

/// Converts a store row to a record, decoding UDT columns back to nested
/// records. Column order follows the driver's ordering.
fn map_row(config: &TenantConfig, row: Row) -> Record {
    let mut record = Record::new();
    for (column, value) in row.columns {
        let emitted = match value {
            Value::Udt(ref u) if config.is_udt_column(&column) => Value::Record(udt::to_record(u)),
            other => other,
        };
        record.insert(column, emitted);
    }
    record
}

fn required_date(criteria: &Record, key: &str) -> Result<NaiveDate, EngineError> {
    match criteria.get(key) {
        Some(value) => value.as_date().ok_or_else(|| {
            EngineError::InvalidRequest(format!("{key} is not a date: {value}"))
        }),
        None => Err(EngineError::InvalidRequest(format!("{key} is required"))),
    }
}

fn into_store_error(err: EngineError) -> StoreError {
    match err {
        EngineError::Store(store) => store,
        other => StoreError::new(other.to_string()),
    }
}
