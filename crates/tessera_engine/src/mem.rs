//! In-memory store session.
//!
//! Implements [`StoreSession`] against process-local tables with the store
//! semantics the engine relies on: primary-key upsert, per-call atomic
//! logged batches, equality plus date-range SELECT evaluation, and UDT
//! metadata. Used by the integration tests and by the standalone server
//! mode; a CQL wire driver adapter is the production counterpart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{
    BoundStatement, PreparedStatement, Row, StatementShape, StatementSpec, StoreSession, UdtDef,
};
use crate::value::Value;

#[derive(Default)]
struct KeyspaceState {
    udts: HashMap<String, UdtDef>,
    tables: HashMap<String, TableState>,
}

struct TableState {
    partition_keys: Vec<String>,
    clustering_keys: Vec<String>,
    /// Primary key tuple → row columns. Upsert semantics, like the store.
    rows: HashMap<Vec<Value>, Vec<(String, Value)>>,
}

/// Write fault injected for a specific partition, for failure-path tests.
struct FailRule {
    keyspace: String,
    table: String,
    partition: Vec<Value>,
}

#[derive(Default)]
pub struct SessionCounters {
    pub prepares: u64,
    pub selects: u64,
    pub batches: u64,
}

#[derive(Default)]
pub struct MemorySession {
    keyspaces: RwLock<HashMap<String, KeyspaceState>>,
    fail_rules: RwLock<Vec<FailRule>>,
    next_statement_id: AtomicU64,
    prepares: AtomicU64,
    selects: AtomicU64,
    batches: AtomicU64,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_keyspace(&self, name: &str) {
        if let Ok(mut guard) = self.keyspaces.write() {
            guard.entry(name.to_string()).or_default();
        }
    }

    pub fn create_udt(&self, keyspace: &str, def: UdtDef) {
        if let Ok(mut guard) = self.keyspaces.write() {
            let ks = guard.entry(keyspace.to_string()).or_default();
            ks.udts.insert(def.name.clone(), def);
        }
    }

    pub fn create_table(
        &self,
        keyspace: &str,
        table: &str,
        partition_keys: &[&str],
        clustering_keys: &[&str],
    ) {
        if let Ok(mut guard) = self.keyspaces.write() {
            let ks = guard.entry(keyspace.to_string()).or_default();
            ks.tables.insert(
                table.to_string(),
                TableState {
                    partition_keys: partition_keys.iter().map(|c| c.to_string()).collect(),
                    clustering_keys: clustering_keys.iter().map(|c| c.to_string()).collect(),
                    rows: HashMap::new(),
                },
            );
        }
    }

    /// Rejects every batch that writes to the given partition. Mirrors a
    /// store that has lost the replicas owning one token range.
    pub fn fail_partition(&self, keyspace: &str, table: &str, partition: Vec<Value>) {
        if let Ok(mut rules) = self.fail_rules.write() {
            rules.push(FailRule {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
                partition,
            });
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut rules) = self.fail_rules.write() {
            rules.clear();
        }
    }

    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            prepares: self.prepares.load(Ordering::Relaxed),
            selects: self.selects.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }

    pub fn row_count(&self, keyspace: &str, table: &str) -> usize {
        let Ok(guard) = self.keyspaces.read() else {
            return 0;
        };
        guard
            .get(keyspace)
            .and_then(|ks| ks.tables.get(table))
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn apply_insert(
        ks: &mut KeyspaceState,
        keyspace: &str,
        table: &str,
        values: &[(String, Value)],
    ) -> Result<(), StoreError> {
        let state = ks.tables.get_mut(table).ok_or_else(|| {
            StoreError::new(format!("unknown table {keyspace}.{table}"))
        })?;

        let mut key = Vec::with_capacity(state.partition_keys.len() + state.clustering_keys.len());
        for column in state.partition_keys.iter().chain(&state.clustering_keys) {
            let value = values
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null);
            key.push(value);
        }
        state.rows.insert(key, values.to_vec());
        Ok(())
    }

    fn lock_poisoned() -> StoreError {
        StoreError::new("session state lock poisoned")
    }

    fn rejected_partition(
        &self,
        keyspace: &str,
        table: &str,
        partition_keys: &[String],
        values: &[(String, Value)],
    ) -> Option<Vec<Value>> {
        let rules = self.fail_rules.read().ok()?;
        if rules.is_empty() {
            return None;
        }
        let partition: Vec<Value> = partition_keys
            .iter()
            .map(|column| {
                values
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| value.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();
        rules
            .iter()
            .any(|rule| {
                rule.keyspace == keyspace && rule.table == table && rule.partition == partition
            })
            .then_some(partition)
    }

    fn run_select(&self, bound: &BoundStatement) -> Result<Vec<Row>, StoreError> {
        let StatementShape::Select {
            keyspace,
            table,
            eq_columns,
            range_column,
        } = &bound.statement.spec.shape
        else {
            return Err(StoreError::new("execute expects a SELECT statement"));
        };

        let start = bound
            .value("start_date")
            .and_then(Value::as_date)
            .ok_or_else(|| StoreError::new("SELECT is missing start_date bind"))?;
        let end = bound
            .value("end_date")
            .and_then(Value::as_date)
            .ok_or_else(|| StoreError::new("SELECT is missing end_date bind"))?;

        let guard = self.keyspaces.read().map_err(|_| Self::lock_poisoned())?;
        let state = guard
            .get(keyspace)
            .and_then(|ks| ks.tables.get(table))
            .ok_or_else(|| StoreError::new(format!("unknown table {keyspace}.{table}")))?;

        let mut rows = Vec::new();
        'rows: for columns in state.rows.values() {
            for eq in eq_columns {
                let bound_value = bound
                    .value(eq)
                    .ok_or_else(|| StoreError::new(format!("SELECT is missing bind for {eq}")))?;
                let row_value = columns.iter().find(|(name, _)| name == eq);
                match row_value {
                    Some((_, value)) if value == bound_value => {}
                    _ => continue 'rows,
                }
            }

            // Callers may have written the range column as ISO text; the
            // store compares it as a date either way.
            let in_range = columns
                .iter()
                .find(|(name, _)| name == range_column)
                .and_then(|(_, value)| value.as_date())
                .map(|date| date >= start && date <= end)
                .unwrap_or(false);
            if in_range {
                rows.push(Row {
                    columns: columns.clone(),
                });
            }
        }

        self.selects.fetch_add(1, Ordering::Relaxed);
        Ok(rows)
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn prepare(&self, spec: StatementSpec) -> Result<Arc<PreparedStatement>, StoreError> {
        // Validate the target exists, like a driver round-trip would.
        let (keyspace, table) = match &spec.shape {
            StatementShape::Insert { keyspace, table, .. }
            | StatementShape::Select { keyspace, table, .. } => (keyspace, table),
        };
        let guard = self.keyspaces.read().map_err(|_| Self::lock_poisoned())?;
        if guard.get(keyspace).map(|ks| ks.tables.contains_key(table)) != Some(true) {
            return Err(StoreError::new(format!(
                "prepare failed: unknown table {keyspace}.{table}"
            )));
        }
        drop(guard);

        self.prepares.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(PreparedStatement {
            id: self.next_statement_id.fetch_add(1, Ordering::Relaxed),
            spec,
        }))
    }

    async fn execute(&self, bound: BoundStatement) -> Result<Vec<Row>, StoreError> {
        match &bound.statement.spec.shape {
            StatementShape::Select { .. } => self.run_select(&bound),
            StatementShape::Insert { keyspace, table, .. } => {
                let keyspace = keyspace.clone();
                let table = table.clone();
                let mut guard = self.keyspaces.write().map_err(|_| Self::lock_poisoned())?;
                let ks = guard
                    .get_mut(&keyspace)
                    .ok_or_else(|| StoreError::new(format!("unknown keyspace {keyspace}")))?;
                Self::apply_insert(ks, &keyspace, &table, &bound.values)?;
                Ok(Vec::new())
            }
        }
    }

    async fn execute_logged_batch(
        &self,
        statements: Vec<BoundStatement>,
    ) -> Result<(), StoreError> {
        // Validate everything up front so the batch applies atomically.
        for bound in &statements {
            let StatementShape::Insert { keyspace, table, .. } = &bound.statement.spec.shape
            else {
                return Err(StoreError::new("logged batches accept only INSERT statements"));
            };

            let partition_keys = {
                let guard = self.keyspaces.read().map_err(|_| Self::lock_poisoned())?;
                guard
                    .get(keyspace)
                    .and_then(|ks| ks.tables.get(table))
                    .map(|t| t.partition_keys.clone())
                    .ok_or_else(|| {
                        StoreError::new(format!("unknown table {keyspace}.{table}"))
                    })?
            };

            if let Some(partition) =
                self.rejected_partition(keyspace, table, &partition_keys, &bound.values)
            {
                return Err(StoreError::new(format!(
                    "injected write failure for partition {partition:?}"
                )));
            }
        }

        let mut guard = self.keyspaces.write().map_err(|_| Self::lock_poisoned())?;
        for bound in &statements {
            let StatementShape::Insert { keyspace, table, .. } = &bound.statement.spec.shape
            else {
                unreachable!("validated above");
            };
            let keyspace = keyspace.clone();
            let table = table.clone();
            let ks = guard
                .get_mut(&keyspace)
                .ok_or_else(|| StoreError::new(format!("unknown keyspace {keyspace}")))?;
            Self::apply_insert(ks, &keyspace, &table, &bound.values)?;
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn udt(&self, keyspace: &str, name: &str) -> Option<UdtDef> {
        let guard = self.keyspaces.read().ok()?;
        guard.get(keyspace).and_then(|ks| ks.udts.get(name)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement;
    use crate::config::TenantConfig;

    fn config() -> TenantConfig {
        TenantConfig::with_bucket(
            "ks",
            "daily",
            &["tenant_id", "period_year"],
            "period_year",
            &[],
        )
    }

    fn session() -> MemorySession {
        let s = MemorySession::new();
        s.create_keyspace("ks");
        s.create_table("ks", "daily", &["tenant_id", "period_year"], &["period_date"]);
        s
    }

    async fn insert(
        session: &MemorySession,
        tenant: &str,
        year: i32,
        date: &str,
    ) -> anyhow::Result<()> {
        let columns = vec![
            "period_date".to_string(),
            "period_year".to_string(),
            "tenant_id".to_string(),
        ];
        let spec = statement::insert_spec(&config(), &columns);
        let stmt = session.prepare(spec).await?;
        session
            .execute(BoundStatement {
                statement: stmt,
                values: vec![
                    ("period_date".into(), Value::Text(date.into())),
                    ("period_year".into(), Value::Int(year)),
                    ("tenant_id".into(), Value::Text(tenant.into())),
                ],
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn select_filters_by_equality_and_date_range() -> anyhow::Result<()> {
        let session = session();
        insert(&session, "IBM", 2023, "2023-12-10").await?;
        insert(&session, "IBM", 2024, "2024-01-10").await?;
        insert(&session, "AAPL", 2024, "2024-01-11").await?;

        let spec = statement::select_spec(
            &config(),
            &["period_year".to_string(), "tenant_id".to_string()],
        );
        let stmt = session.prepare(spec).await?;
        let rows = session
            .execute(BoundStatement {
                statement: stmt,
                values: vec![
                    ("period_year".into(), Value::Int(2024)),
                    ("tenant_id".into(), Value::Text("IBM".into())),
                    ("start_date".into(), Value::Text("2024-01-01".into())),
                    ("end_date".into(), Value::Text("2024-02-01".into())),
                ],
            })
            .await?;

        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_row_with_same_primary_key() -> anyhow::Result<()> {
        let session = session();
        insert(&session, "IBM", 2024, "2024-01-10").await?;
        insert(&session, "IBM", 2024, "2024-01-10").await?;
        assert_eq!(session.row_count("ks", "daily"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn prepare_rejects_unknown_table() {
        let session = MemorySession::new();
        session.create_keyspace("ks");
        let spec = statement::insert_spec(&config(), &["tenant_id".to_string()]);
        assert!(session.prepare(spec).await.is_err());
    }
}
