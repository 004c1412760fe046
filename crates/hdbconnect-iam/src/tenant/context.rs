//! Task-scoped tenant context

use std::future::Future;

use super::error::{TenantError, TenantResult};

tokio::task_local! {
    static CURRENT_TENANT: TenantContext;
}

/// Identity of the tenant a request runs for
///
/// Attached to a task with [`scope`](Self::scope) and readable from anywhere
/// inside it. The value cannot be changed once attached; nest a new scope to
/// run work for another tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: String,
    tenant_name: String,
    realm_id: String,
}

impl TenantContext {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        tenant_name: impl Into<String>,
        realm_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_name: tenant_name.into(),
            realm_id: realm_id.into(),
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[must_use]
    pub fn tenant_name(&self) -> &str {
        &self.tenant_name
    }

    #[must_use]
    pub fn realm_id(&self) -> &str {
        &self.realm_id
    }

    /// Run `fut` with this context attached
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_TENANT.scope(self, fut).await
    }

    /// Context attached to the current task, if any
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT_TENANT.try_with(Clone::clone).ok()
    }

    pub fn require() -> TenantResult<Self> {
        Self::current().ok_or(TenantError::NoContext)
    }
}
