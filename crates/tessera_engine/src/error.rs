//! Error taxonomy for the engine.
//!
//! The engine performs no recovery: the first root cause propagates to the
//! boundary collaborator, which decides between client-error and
//! server-error surfacing (HTTP status, bus non-acknowledgement).

use thiserror::Error;

use crate::value::PartitionKey;

/// Driver-reported failure from the underlying store session.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// All failures the engine surfaces to its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Client input is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Date range with start after end.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// No tenant configuration registered for the routing key. The message
    /// lists known keys so an operator can spot typos immediately.
    #[error("no configuration found for {key}; available configs: [{}]", .known.join(", "))]
    ConfigNotFound { key: String, known: Vec<String> },

    /// A recognised date field was present but held an unusable variant.
    #[error("unsupported date type for bucket calculation: field {field} is {kind}")]
    BucketType { field: String, kind: &'static str },

    /// Tenant configuration rejected at registration time.
    #[error("invalid tenant config: {0}")]
    InvalidConfig(String),

    /// The store's schema metadata has no such keyspace or UDT.
    #[error("UDT metadata missing: {keyspace}.{udt}")]
    UdtMetadataMissing { keyspace: String, udt: String },

    /// Prepare or execute failure reported by the driver.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One or more partition batches failed. Committed partitions stay
    /// committed; the store has no cross-partition rollback.
    #[error("partial batch failure: {} of {total} partition batches failed: {}", .failed.len(), render_partitions(.failed))]
    PartialBatchFailure {
        failed: Vec<(PartitionKey, StoreError)>,
        total: usize,
    },

    /// One or more bucket SELECTs failed; no partial results are returned.
    #[error("scatter-gather failure for buckets [{}]", render_years(.failures))]
    ScatterGatherFailure { failures: Vec<(i32, StoreError)> },
}

impl EngineError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        EngineError::InvalidRequest(message.into())
    }

    /// Whether the failure was caused by the caller (surfaced as 400) as
    /// opposed to the store or its schema (surfaced as 500).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidRequest(_)
                | EngineError::InvalidRange { .. }
                | EngineError::ConfigNotFound { .. }
                | EngineError::BucketType { .. }
                | EngineError::InvalidConfig(_)
        )
    }
}

fn render_partitions(failed: &[(PartitionKey, StoreError)]) -> String {
    failed
        .iter()
        .map(|(key, err)| format!("{key}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_years(failures: &[(i32, StoreError)]) -> String {
    failures
        .iter()
        .map(|(year, err)| format!("{year}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
