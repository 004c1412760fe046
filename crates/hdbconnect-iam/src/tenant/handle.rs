//! Tenant-scoped storage handle

use std::sync::Arc;

use super::config::TenantConfig;
use super::context::TenantContext;
use super::schema::quote_identifier;

/// How statements issued through a handle are confined to one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Statements run with the schema search path switched
    Schema { schema: String },
    /// Statements filter shared tables on `column = value`
    Row { column: String, value: String },
}

/// Storage handle bound to one tenant
#[derive(Debug, Clone)]
pub struct TenantHandle {
    tenant: Arc<TenantConfig>,
    scope: TenantScope,
}

impl TenantHandle {
    pub(crate) const fn new(tenant: Arc<TenantConfig>, scope: TenantScope) -> Self {
        Self { tenant, scope }
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantConfig {
        &self.tenant
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    #[must_use]
    pub const fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Schema of a schema-scoped handle
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        match &self.scope {
            TenantScope::Schema { schema } => Some(schema),
            TenantScope::Row { .. } => None,
        }
    }

    /// Table reference valid under this handle's scope
    ///
    /// Schema scope prefixes the quoted tenant schema; row scope leaves the
    /// shared table name as is.
    #[must_use]
    pub fn qualify(&self, table: &str) -> String {
        match &self.scope {
            TenantScope::Schema { schema } => format!("{}.{table}", quote_identifier(schema)),
            TenantScope::Row { .. } => table.to_string(),
        }
    }

    /// `(column, value)` equality filter of a row-scoped handle
    #[must_use]
    pub fn row_filter(&self) -> Option<(&str, &str)> {
        match &self.scope {
            TenantScope::Row { column, value } => Some((column, value)),
            TenantScope::Schema { .. } => None,
        }
    }

    /// SQL predicate and its bound parameter for a row-scoped handle
    #[must_use]
    pub fn scope_predicate(&self) -> Option<(String, String)> {
        self.row_filter()
            .map(|(column, value)| (format!("{} = ?", quote_identifier(column)), value.to_string()))
    }

    /// Context to attach to work done for this tenant
    #[must_use]
    pub fn context(&self) -> TenantContext {
        TenantContext::new(&self.tenant.id, &self.tenant.name, &self.tenant.realm_id)
    }
}
