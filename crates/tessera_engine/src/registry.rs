//! Tenant configuration registry with polymorphic routing.
//!
//! One logical tenant may own several physical tables differentiated by
//! periodicity (DAILY, MONTHLY, …) and data-type family (NUMERIC, STRING,
//! …); the `(tenant, periodicity, data_type)` triple routes to exactly one
//! [`TenantConfig`].

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::TenantConfig;
use crate::error::EngineError;

/// Routing key. All components are short ASCII strings supplied by the
/// configuration loader.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub tenant_id: String,
    pub periodicity: String,
    pub data_type: String,
}

impl RegistryKey {
    pub fn new(
        tenant_id: impl Into<String>,
        periodicity: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            periodicity: periodicity.into(),
            data_type: data_type.into(),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.tenant_id, self.periodicity, self.data_type
        )
    }
}

/// Concurrent routing table. Reads are lock-free and never blocked by
/// writers; registration is rare and serialized per shard by the map.
#[derive(Default)]
pub struct TenantRegistry {
    configs: DashMap<RegistryKey, Arc<TenantConfig>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tenant configuration after validating its shape
    /// invariants. Overwrites silently so operators can hot-reconfigure a
    /// live tenant.
    pub fn register(
        &self,
        tenant_id: &str,
        periodicity: &str,
        data_type: &str,
        config: TenantConfig,
    ) -> Result<(), EngineError> {
        config.validate()?;
        let key = RegistryKey::new(tenant_id, periodicity, data_type);
        tracing::info!(
            key = %key,
            keyspace = %config.keyspace,
            table = %config.table,
            "registered tenant config"
        );
        self.configs.insert(key, Arc::new(config));
        Ok(())
    }

    /// Looks up the config for a routing key. The error lists every
    /// registered key for operator diagnosis.
    pub fn lookup(
        &self,
        tenant_id: &str,
        periodicity: &str,
        data_type: &str,
    ) -> Result<Arc<TenantConfig>, EngineError> {
        let key = RegistryKey::new(tenant_id, periodicity, data_type);
        match self.configs.get(&key) {
            Some(entry) => Ok(entry.value().clone()),
            None => {
                let mut known: Vec<String> =
                    self.configs.iter().map(|e| e.key().to_string()).collect();
                known.sort();
                Err(EngineError::ConfigNotFound {
                    key: key.to_string(),
                    known,
                })
            }
        }
    }

    pub fn exists(&self, tenant_id: &str, periodicity: &str, data_type: &str) -> bool {
        self.configs
            .contains_key(&RegistryKey::new(tenant_id, periodicity, data_type))
    }

    /// Removes a configuration. Callers must externally synchronise with
    /// in-flight requests that may still hold the config.
    pub fn unregister(&self, tenant_id: &str, periodicity: &str, data_type: &str) {
        let key = RegistryKey::new(tenant_id, periodicity, data_type);
        self.configs.remove(&key);
        tracing::info!(key = %key, "unregistered tenant config");
    }

    pub fn clear(&self) {
        self.configs.clear();
        tracing::info!("cleared all tenant configs");
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
