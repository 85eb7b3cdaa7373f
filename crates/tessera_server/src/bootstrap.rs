//! Startup registration of tenants and, in standalone mode, demo schema.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tessera_engine::mem::MemorySession;
use tessera_engine::store::UdtDef;
use tessera_engine::{TenantConfig, TenantRegistry};

/// Demo table registered for the built-in tenants.
pub const DEMO_TABLE: &str = "DailyNumeric";

/// Built-in tenants registered when no tenants file is supplied: IBM plus
/// the MAG 7, all daily numeric.
const DEFAULT_TENANTS: [&str; 8] = [
    "IBM", "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA",
];

/// One row of the tenants file.
#[derive(Debug, Deserialize)]
pub struct TenantEntry {
    pub tenant_id: String,
    pub periodicity: String,
    pub data_type: String,
    pub config: TenantConfig,
}

#[derive(Debug, Deserialize)]
pub struct TenantsFile {
    pub tenants: Vec<TenantEntry>,
}

/// Loads and registers tenants from a JSON file. Returns how many were
/// registered.
pub fn register_from_file(registry: &TenantRegistry, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read tenants file {}", path.display()))?;
    let file: TenantsFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse tenants file {}", path.display()))?;

    for entry in &file.tenants {
        registry
            .register(
                &entry.tenant_id,
                &entry.periodicity,
                &entry.data_type,
                entry.config.clone(),
            )
            .with_context(|| format!("register tenant {}", entry.tenant_id))?;
    }
    Ok(file.tenants.len())
}

/// Registers the built-in demo tenants against `keyspace`.
pub fn register_defaults(registry: &TenantRegistry, keyspace: &str) -> anyhow::Result<()> {
    let config = TenantConfig::with_bucket(
        keyspace,
        DEMO_TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        "period_year",
        &["data"],
    );
    for tenant in DEFAULT_TENANTS {
        registry
            .register(tenant, "DAILY", "NUMERIC", config.clone())
            .with_context(|| format!("register default tenant {tenant}"))?;
    }
    tracing::info!(keyspace = %keyspace, "registered default tenants (IBM, MAG 7)");
    Ok(())
}

/// Applies the demo schema to the embedded memory store so the binary is
/// queryable out of the box. Against a real cluster, schema DDL is applied
/// by the operator before the server starts.
pub fn apply_demo_schema(session: &MemorySession, keyspace: &str) {
    session.create_keyspace(keyspace);
    session.create_udt(keyspace, UdtDef::new("data", &["value", "report_time"]));
    session.create_table(
        keyspace,
        DEMO_TABLE,
        &["tenant_id", "instrument_id", "period_year"],
        &["period_date", "field_id"],
    );
    tracing::info!(keyspace = %keyspace, table = DEMO_TABLE, "applied demo schema");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_register_ibm_and_mag7() {
        let registry = TenantRegistry::new();
        register_defaults(&registry, "test_keyspace").expect("defaults");
        assert_eq!(registry.len(), 8);
        assert!(registry.exists("IBM", "DAILY", "NUMERIC"));
        assert!(registry.exists("NVDA", "DAILY", "NUMERIC"));
    }

    #[test]
    fn tenants_file_round_trips() {
        let raw = serde_json::json!({
            "tenants": [{
                "tenant_id": "ACME",
                "periodicity": "MONTHLY",
                "data_type": "STRING",
                "config": {
                    "keyspace": "acme_ks",
                    "table": "MonthlyString",
                    "partition_keys": ["tenant_id", "period_year"],
                    "bucket_column": "period_year",
                    "udt_columns": ["data"]
                }
            }]
        });
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{raw}").expect("write");

        let registry = TenantRegistry::new();
        let count = register_from_file(&registry, file.path()).expect("load");
        assert_eq!(count, 1);

        let config = registry
            .lookup("ACME", "MONTHLY", "STRING")
            .expect("lookup");
        assert_eq!(config.table, "MonthlyString");
    }

    #[test]
    fn invalid_config_in_file_is_rejected() {
        let raw = serde_json::json!({
            "tenants": [{
                "tenant_id": "ACME",
                "periodicity": "DAILY",
                "data_type": "NUMERIC",
                "config": {
                    "keyspace": "acme_ks",
                    "table": "Daily",
                    "partition_keys": ["tenant_id"],
                    "bucket_column": "period_year"
                }
            }]
        });
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{raw}").expect("write");

        let registry = TenantRegistry::new();
        assert!(register_from_file(&registry, file.path()).is_err());
        assert!(registry.is_empty());
    }
}
