//! Dynamic multi-tenant data access engine for wide-column stores.
//!
//! Tenants and their physical table shapes are declared at runtime; the
//! engine translates uniform record-oriented ingest and query requests into
//! partition-aware logged batches and scatter-gather reads. Adding a tenant
//! with a different keyspace, table, partition-key list, bucketing strategy,
//! or UDT columns is a configuration registration, never a code change.
//!
//! The store itself sits behind [`store::StoreSession`]; the crate ships an
//! in-memory implementation ([`mem::MemorySession`]) used by tests and the
//! standalone server mode.

pub mod bucket;
pub mod config;
pub mod error;
pub mod ingest;
pub mod mem;
pub mod query;
pub mod registry;
pub mod statement;
pub mod store;
pub mod udt;
pub mod value;

use std::sync::Arc;

use tokio::sync::Semaphore;

pub use config::TenantConfig;
pub use error::{EngineError, StoreError};
pub use ingest::{IngestBatchRequest, IngestEngine};
pub use query::QueryEngine;
pub use registry::TenantRegistry;
pub use statement::StatementCache;
pub use store::StoreSession;
pub use value::{PartitionKey, Record, Value};

/// Engine tunables. Everything else about a deployment lives in tenant
/// configs or the session.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on concurrently executing partition batches and bucket
    /// SELECTs, shared across both engines.
    pub fanout: usize,
    /// Prepared-statement cache capacity.
    pub statement_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fanout: default_fanout(),
            statement_cache_capacity: statement::DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Twice the hardware parallelism: wide enough to keep the store busy while
/// statements await replies, narrow enough to avoid coordinator overload.
fn default_fanout() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(8)
}

/// Composition root: the shared services plus both engines, wired the same
/// way for the server binary and for tests.
pub struct Engines {
    pub registry: Arc<TenantRegistry>,
    pub ingest: IngestEngine,
    pub query: QueryEngine,
}

impl Engines {
    pub fn new(session: Arc<dyn StoreSession>, config: EngineConfig) -> Self {
        let registry = Arc::new(TenantRegistry::new());
        let statements = Arc::new(StatementCache::new(
            session.clone(),
            config.statement_cache_capacity,
        ));
        let fanout = Arc::new(Semaphore::new(config.fanout.max(1)));

        let ingest = IngestEngine::new(
            session.clone(),
            registry.clone(),
            statements.clone(),
            fanout.clone(),
        );
        let query = QueryEngine::new(session, registry.clone(), statements, fanout);

        Self {
            registry,
            ingest,
            query,
        }
    }
}
