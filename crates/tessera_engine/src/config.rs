//! Tenant table-shape configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Immutable description of one tenant table: where rows live, how they
/// partition, and which columns hold UDT values. Everything the engine
/// needs to build statements for a tenant at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub keyspace: String,
    pub table: String,
    /// Partition key columns, in schema order. The bucket column, when
    /// configured, is by convention the last of these.
    pub partition_keys: Vec<String>,
    /// Column whose value is derived from a date field to cap partition
    /// size. Absent for unbucketed tables.
    #[serde(default)]
    pub bucket_column: Option<String>,
    /// Columns stored as user-defined types.
    #[serde(default)]
    pub udt_columns: BTreeSet<String>,
}

impl TenantConfig {
    pub fn with_bucket(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_keys: &[&str],
        bucket_column: impl Into<String>,
        udt_columns: &[&str],
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_keys: partition_keys.iter().map(|c| c.to_string()).collect(),
            bucket_column: Some(bucket_column.into()),
            udt_columns: udt_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn without_bucket(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_keys: &[&str],
        udt_columns: &[&str],
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_keys: partition_keys.iter().map(|c| c.to_string()).collect(),
            bucket_column: None,
            udt_columns: udt_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn has_bucket(&self) -> bool {
        self.bucket_column.is_some()
    }

    pub fn is_udt_column(&self, column: &str) -> bool {
        self.udt_columns.contains(column)
    }

    /// Validates shape invariants before the config becomes visible to
    /// request routing. A bucket column that is not a partition key would
    /// produce writes the query path can never prune to.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.keyspace.trim().is_empty() {
            return Err(EngineError::InvalidConfig("keyspace is empty".into()));
        }
        if self.table.trim().is_empty() {
            return Err(EngineError::InvalidConfig("table is empty".into()));
        }
        if self.partition_keys.is_empty() {
            return Err(EngineError::InvalidConfig(format!(
                "table {}.{} declares no partition keys",
                self.keyspace, self.table
            )));
        }
        let unique: BTreeSet<&String> = self.partition_keys.iter().collect();
        if unique.len() != self.partition_keys.len() {
            return Err(EngineError::InvalidConfig(format!(
                "table {}.{} has duplicate partition keys: {:?}",
                self.keyspace, self.table, self.partition_keys
            )));
        }
        if let Some(bucket) = &self.bucket_column {
            if !self.partition_keys.contains(bucket) {
                return Err(EngineError::InvalidConfig(format!(
                    "bucket column {bucket} is not a partition key of {}.{}",
                    self.keyspace, self.table
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_column_must_be_a_partition_key() {
        let config = TenantConfig::with_bucket(
            "ks",
            "daily",
            &["tenant_id", "period_year"],
            "period_month",
            &[],
        );
        let err = config.validate().expect_err("expected rejection");
        assert!(err.to_string().contains("period_month"));
    }

    #[test]
    fn duplicate_partition_keys_rejected() {
        let config =
            TenantConfig::without_bucket("ks", "daily", &["tenant_id", "tenant_id"], &[]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_bucketed_config_accepted() {
        let config = TenantConfig::with_bucket(
            "ks",
            "daily",
            &["tenant_id", "instrument_id", "period_year"],
            "period_year",
            &["data"],
        );
        config.validate().expect("valid config");
        assert!(config.has_bucket());
        assert!(config.is_udt_column("data"));
        assert!(!config.is_udt_column("tenant_id"));
    }
}
