//! Tenant registry and isolation handles

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::TenantBackend;
use super::config::{IsolationMode, TenantConfig, TenantManagerConfig};
use super::error::{TenantError, TenantResult};
use super::handle::{TenantHandle, TenantScope};
use super::schema::schema_name_for;
use crate::constants::TENANT_ID_COLUMN;
use crate::observability;

#[derive(Debug, Default)]
struct TenantRegistry {
    tenants: HashMap<String, Arc<TenantConfig>>,
    /// Sanitized schema name to the tenant holding it, registered or in flight
    schema_owners: HashMap<String, String>,
    /// Tenant IDs with a registration in flight
    reserved: HashSet<String>,
}

impl TenantRegistry {
    fn release_schema(&mut self, schema: &str, id: &str) {
        if self.schema_owners.get(schema).is_some_and(|owner| owner == id) {
            self.schema_owners.remove(schema);
        }
    }
}

/// Holds a tenant ID, and its schema if any, reserved until registration commits
///
/// Dropping an uncommitted reservation releases both, including when the
/// registering future is cancelled mid-provisioning.
struct Reservation<'a> {
    state: &'a RwLock<TenantRegistry>,
    id: String,
    schema: Option<String>,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, tenant: Arc<TenantConfig>) {
        let mut state = self.state.write();
        state.reserved.remove(&self.id);
        state.tenants.insert(self.id.clone(), tenant);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.state.write();
            state.reserved.remove(&self.id);
            if let Some(schema) = &self.schema {
                state.release_schema(schema, &self.id);
            }
        }
    }
}

/// Registers tenants and hands out tenant-scoped storage handles
///
/// The registry is authoritative and lives in memory; schema creation and
/// removal go through the configured [`TenantBackend`]. Backend calls never
/// run under the registry lock.
#[derive(Debug)]
pub struct TenantManager {
    backend: Arc<dyn TenantBackend>,
    config: TenantManagerConfig,
    state: RwLock<TenantRegistry>,
}

impl TenantManager {
    #[must_use]
    pub fn new(backend: Arc<dyn TenantBackend>, config: TenantManagerConfig) -> Self {
        Self {
            backend,
            config,
            state: RwLock::new(TenantRegistry::default()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TenantManagerConfig {
        &self.config
    }

    /// Register a tenant, provisioning its schema under schema isolation
    ///
    /// Unset isolation mode and realm ID are filled from the manager's
    /// defaults. If provisioning fails nothing is registered.
    pub async fn register_tenant(&self, tenant: TenantConfig) -> TenantResult<Arc<TenantConfig>> {
        if tenant.id.trim().is_empty() {
            return Err(TenantError::InvalidTenant("tenant ID is empty".into()));
        }
        if tenant.name.trim().is_empty() {
            return Err(TenantError::InvalidTenant(format!(
                "tenant {} has an empty name",
                tenant.id
            )));
        }

        let mut tenant = self.with_defaults(tenant);
        let schema =
            (tenant.isolation() == IsolationMode::Schema).then(|| schema_name_for(&tenant));
        let reservation = self.reserve(&tenant.id, schema.as_deref())?;

        if let Some(schema) = schema {
            if let Err(e) = self.backend.create_schema(&schema).await {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    schema = %schema,
                    error = %e,
                    "Tenant schema provisioning failed"
                );
                observability::record_tenant_provisioning_failure();
                return Err(e);
            }
            tenant.schema_name = Some(schema);
        }

        let tenant = Arc::new(tenant);
        reservation.commit(Arc::clone(&tenant));

        tracing::info!(
            tenant_id = %tenant.id,
            realm_id = %tenant.realm_id,
            isolation = %tenant.isolation(),
            "Tenant registered"
        );
        Ok(tenant)
    }

    /// Remove a tenant, dropping its schema first
    ///
    /// A failed drop aborts the deletion and the tenant stays registered.
    pub async fn delete_tenant(&self, id: &str) -> TenantResult<()> {
        let (tenant, owned_schema) = {
            let state = self.state.read();
            let tenant = state
                .tenants
                .get(id)
                .cloned()
                .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
            let owned_schema = (tenant.isolation() == IsolationMode::Schema)
                .then(|| schema_name_for(&tenant))
                .filter(|schema| state.schema_owners.get(schema).is_some_and(|o| o == id));
            (tenant, owned_schema)
        };

        if let Some(schema) = &owned_schema {
            self.backend.drop_schema(schema).await.inspect_err(|e| {
                tracing::warn!(
                    tenant_id = %id,
                    schema = %schema,
                    error = %e,
                    "Tenant schema drop failed, tenant kept"
                );
            })?;
        }

        let mut state = self.state.write();
        state.tenants.remove(id);
        if let Some(schema) = &owned_schema {
            state.release_schema(schema, id);
        }
        drop(state);

        tracing::info!(tenant_id = %id, realm_id = %tenant.realm_id, "Tenant deleted");
        Ok(())
    }

    pub fn get_tenant(&self, id: &str) -> TenantResult<Arc<TenantConfig>> {
        self.state
            .read()
            .tenants
            .get(id)
            .cloned()
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    /// Snapshot of all tenants, sorted by ID
    #[must_use]
    pub fn list_tenants(&self) -> Vec<Arc<TenantConfig>> {
        let mut tenants: Vec<_> = self.state.read().tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        tenants
    }

    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.state.read().tenants.len()
    }

    /// Storage handle confined to one tenant
    pub fn with_tenant(&self, id: &str) -> TenantResult<TenantHandle> {
        let tenant = self.get_tenant(id)?;
        if !tenant.enabled {
            return Err(TenantError::Disabled(id.to_string()));
        }

        let scope = match tenant.isolation() {
            IsolationMode::Row => TenantScope::Row {
                column: TENANT_ID_COLUMN.to_string(),
                value: tenant.id.clone(),
            },
            IsolationMode::Schema => TenantScope::Schema {
                schema: schema_name_for(&tenant),
            },
            IsolationMode::Database => {
                return Err(TenantError::NotImplemented(
                    IsolationMode::Database.to_string(),
                ));
            }
        };

        Ok(TenantHandle::new(tenant, scope))
    }

    fn with_defaults(&self, mut tenant: TenantConfig) -> TenantConfig {
        if tenant.isolation_mode.is_none() {
            tenant.isolation_mode = Some(self.config.isolation_mode);
        }
        if tenant.realm_id.is_empty() {
            tenant.realm_id.clone_from(&self.config.default_realm_id);
        }
        tenant
    }

    /// Reserve a tenant ID and, under schema isolation, its schema name
    ///
    /// Distinct IDs can sanitize to the same schema; the second one is refused
    /// so one tenant's deletion never drops another tenant's storage.
    fn reserve(&self, id: &str, schema: Option<&str>) -> TenantResult<Reservation<'_>> {
        let mut state = self.state.write();
        if state.tenants.contains_key(id) || state.reserved.contains(id) {
            return Err(TenantError::Duplicate(id.to_string()));
        }
        if let Some(schema) = schema {
            if let Some(owner) = state.schema_owners.get(schema) {
                return Err(TenantError::SchemaInUse {
                    schema: schema.to_string(),
                    owner: owner.clone(),
                });
            }
            state.schema_owners.insert(schema.to_string(), id.to_string());
        }
        state.reserved.insert(id.to_string());

        Ok(Reservation {
            state: &self.state,
            id: id.to_string(),
            schema: schema.map(str::to_string),
            committed: false,
        })
    }
}
