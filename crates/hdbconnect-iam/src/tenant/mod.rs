//! Tenant registration and storage isolation
//!
//! Tenants are isolated by schema (one schema per tenant), by row (shared
//! tables filtered on `TENANT_ID`), or by database (recognised but not
//! implemented). A [`TenantConnection`] applies the isolation to every
//! statement it runs.

mod backend;
mod config;
mod context;
mod error;
mod handle;
mod manager;
mod schema;
mod statement;

pub use backend::{HanaTenantBackend, InMemoryTenantBackend, TenantBackend, TenantConnection};
pub use config::{IsolationMode, TenantConfig, TenantManagerConfig};
pub use context::TenantContext;
pub use error::{TenantError, TenantResult};
pub use handle::{TenantHandle, TenantScope};
pub use manager::TenantManager;
pub use schema::{quote_identifier, sanitize_schema_name, schema_name_for};
pub use statement::{ScopedStatement, scope_statement};
