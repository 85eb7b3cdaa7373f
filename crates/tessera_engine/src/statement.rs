//! CQL statement shapes and the prepared-statement cache.
//!
//! Preparing on every request would round-trip the store per row; shapes
//! are memoised by `(keyspace, table, column set, operation)` in a bounded
//! LRU. Concurrent first use of a shape is single-flighted: one preparation
//! per key in flight, everyone else awaits the same result.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::sync::OnceCell;

use crate::config::TenantConfig;
use crate::error::{EngineError, StoreError};
use crate::store::{PreparedStatement, StatementShape, StatementSpec, StoreSession};

/// Clustering column every table served by this engine carries; the query
/// path ranges over it.
pub const RANGE_COLUMN: &str = "period_date";

/// Bind marker names for the date range bounds.
pub const START_BIND: &str = "start_date";
pub const END_BIND: &str = "end_date";

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// INSERT over the given column set, markers named after the columns.
/// Columns are sorted so every record with the same column set shares one
/// prepared statement.
pub fn insert_spec(config: &TenantConfig, columns: &[String]) -> StatementSpec {
    let mut columns = columns.to_vec();
    columns.sort();

    let column_list = columns.join(", ");
    let marker_list = columns
        .iter()
        .map(|c| format!(":{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let cql = format!(
        "INSERT INTO {}.{} ({column_list}) VALUES ({marker_list})",
        config.keyspace, config.table
    );

    StatementSpec {
        cql,
        shape: StatementShape::Insert {
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
            columns,
        },
    }
}

/// `SELECT *` with equality on the supplied partition-key columns plus the
/// inclusive date range over [`RANGE_COLUMN`].
pub fn select_spec(config: &TenantConfig, eq_columns: &[String]) -> StatementSpec {
    let mut eq_columns = eq_columns.to_vec();
    eq_columns.sort();

    let mut predicates = eq_columns
        .iter()
        .map(|c| format!("{c} = :{c}"))
        .collect::<Vec<_>>();
    predicates.push(format!("{RANGE_COLUMN} >= :{START_BIND}"));
    predicates.push(format!("{RANGE_COLUMN} <= :{END_BIND}"));
    let cql = format!(
        "SELECT * FROM {}.{} WHERE {}",
        config.keyspace,
        config.table,
        predicates.join(" AND ")
    );

    StatementSpec {
        cql,
        shape: StatementShape::Select {
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
            eq_columns,
            range_column: RANGE_COLUMN.to_string(),
        },
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Op {
    Insert,
    Select,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    keyspace: String,
    table: String,
    /// Sorted column names: insert columns or select equality columns.
    columns: Vec<String>,
    op: Op,
}

type Slot = Arc<OnceCell<Arc<PreparedStatement>>>;

/// Bounded prepared-statement cache shared by the ingest and query engines.
pub struct StatementCache {
    session: Arc<dyn StoreSession>,
    entries: Mutex<LruCache<CacheKey, Slot>>,
}

impl StatementCache {
    pub fn new(session: Arc<dyn StoreSession>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            session,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn insert_statement(
        &self,
        config: &TenantConfig,
        columns: &[String],
    ) -> Result<Arc<PreparedStatement>, EngineError> {
        let spec = insert_spec(config, columns);
        let StatementShape::Insert { columns, .. } = &spec.shape else {
            unreachable!("insert_spec builds Insert shapes");
        };
        let key = CacheKey {
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
            columns: columns.clone(),
            op: Op::Insert,
        };
        self.get_or_prepare(key, spec).await
    }

    pub async fn select_statement(
        &self,
        config: &TenantConfig,
        eq_columns: &[String],
    ) -> Result<Arc<PreparedStatement>, EngineError> {
        let spec = select_spec(config, eq_columns);
        let StatementShape::Select { eq_columns, .. } = &spec.shape else {
            unreachable!("select_spec builds Select shapes");
        };
        let key = CacheKey {
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
            columns: eq_columns.clone(),
            op: Op::Select,
        };
        self.get_or_prepare(key, spec).await
    }

    async fn get_or_prepare(
        &self,
        key: CacheKey,
        spec: StatementSpec,
    ) -> Result<Arc<PreparedStatement>, EngineError> {
        let slot = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| StoreError::new("statement cache lock poisoned"))?;
            if let Some(slot) = entries.get(&key) {
                slot.clone()
            } else {
                let slot: Slot = Arc::new(OnceCell::new());
                if let Some((evicted_key, evicted)) = entries.push(key.clone(), slot.clone()) {
                    // `push` returns the displaced LRU entry (or the old
                    // value under the same key, which there isn't here).
                    if evicted_key != key {
                        if let Some(stmt) = evicted.get() {
                            self.session.release(stmt);
                            tracing::debug!(cql = %stmt.spec.cql, "released evicted prepared statement");
                        }
                    }
                }
                slot
            }
        };
        // The lock is released before preparing; only waiters on this
        // particular key serialize behind the cell.
        let prepared = slot
            .get_or_try_init(|| async { self.session.prepare(spec).await })
            .await?;
        Ok(prepared.clone())
    }
}
