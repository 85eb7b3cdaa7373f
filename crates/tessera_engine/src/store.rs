//! Store session abstraction.
//!
//! The engine is driver-agnostic: everything it needs from the wide-column
//! store is expressed by [`StoreSession`]: async prepared-statement
//! execution, logged batches, and keyspace/UDT metadata introspection.
//! Concrete implementations can wrap a CQL wire driver or an in-memory
//! store for tests and standalone operation (see [`crate::mem`]).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::value::Value;

/// Declared shape of a user-defined type, from keyspace metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdtDef {
    pub name: String,
    /// Field names in declaration order.
    pub field_names: Vec<String>,
}

impl UdtDef {
    pub fn new(name: impl Into<String>, field_names: &[&str]) -> Self {
        Self {
            name: name.into(),
            field_names: field_names.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A UDT column value in wire form: every declared field in declaration
/// order, unset fields carried as [`Value::Null`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdtValue {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl UdtValue {
    /// New value with all fields of `def` unset.
    pub fn unset(def: &UdtDef) -> Self {
        Self {
            type_name: def.name.clone(),
            fields: def
                .field_names
                .iter()
                .map(|name| (name.clone(), Value::Null))
                .collect(),
        }
    }

    pub fn set(&mut self, field: &str, value: Value) -> bool {
        for (name, slot) in &mut self.fields {
            if name == field {
                *slot = value;
                return true;
            }
        }
        false
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

/// Structured form of a statement, carried alongside the rendered CQL so
/// session implementations do not need to parse query text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatementShape {
    /// `INSERT INTO ks.tbl (cols…) VALUES (:col…)`.
    Insert {
        keyspace: String,
        table: String,
        columns: Vec<String>,
    },
    /// `SELECT * FROM ks.tbl WHERE eq-cols… AND range_column BETWEEN
    /// :start_date AND :end_date` (inclusive bounds, named markers).
    Select {
        keyspace: String,
        table: String,
        eq_columns: Vec<String>,
        range_column: String,
    },
}

/// What gets handed to [`StoreSession::prepare`].
#[derive(Clone, Debug)]
pub struct StatementSpec {
    /// Rendered CQL text, what a wire driver would send to the store.
    pub cql: String,
    pub shape: StatementShape,
}

/// A statement prepared by the session. Held behind `Arc` by the statement
/// cache and by every bound statement created from it.
#[derive(Debug)]
pub struct PreparedStatement {
    pub id: u64,
    pub spec: StatementSpec,
}

/// A prepared statement plus named bind values.
#[derive(Clone, Debug)]
pub struct BoundStatement {
    pub statement: Arc<PreparedStatement>,
    pub values: Vec<(String, Value)>,
}

impl BoundStatement {
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }
}

/// One result row, columns in the order the store returned them.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

/// Async session against the wide-column store.
///
/// Implementations must be safe to share freely across tasks; the engine
/// holds exactly one session per process.
#[async_trait]
pub trait StoreSession: Send + Sync + 'static {
    /// Prepare a statement. Preparation is idempotent per spec; callers are
    /// expected to memoise through [`crate::statement::StatementCache`].
    async fn prepare(&self, spec: StatementSpec) -> Result<Arc<PreparedStatement>, StoreError>;

    /// Execute a single prepared statement.
    async fn execute(&self, bound: BoundStatement) -> Result<Vec<Row>, StoreError>;

    /// Execute a logged batch: all statements land atomically or none do.
    /// Statements apply in submission order.
    async fn execute_logged_batch(&self, statements: Vec<BoundStatement>) -> Result<(), StoreError>;

    /// Look up a UDT definition in keyspace metadata. Synchronous because
    /// drivers cache schema metadata locally.
    fn udt(&self, keyspace: &str, name: &str) -> Option<UdtDef>;

    /// Release a prepared statement evicted from the cache. Default no-op
    /// for sessions without server-side prepared state.
    fn release(&self, statement: &PreparedStatement) {
        let _ = statement;
    }
}
