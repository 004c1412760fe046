//! Realm authentication, identity federation and tenant isolation on SAP HANA
//!
//! - [`Authenticator`] serves realms declared in `realms.toml`.
//! - [`RealmRepository`] offers the same authentication contract over users
//!   persisted through a [`store::UserStore`].
//! - [`FederationManager`] registers external OIDC providers and maps their
//!   token claims to tenants.
//! - [`TenantManager`] registers tenants and hands out storage handles
//!   confined to one tenant.
//! - [`RateLimiter`] throttles callers with per-key token buckets.

pub mod config;
mod constants;
mod error;
pub mod federation;
pub mod observability;
pub mod password;
mod pool;
pub mod ratelimit;
pub mod realm;
pub mod store;
pub mod tenant;

pub use config::{Config, ConfigBuilder, TelemetryConfig, TenancyConfig};
pub use error::{Error, Result};
pub use federation::{FederatedProvider, FederationConfig, FederationManager, TenantMapping};
pub use password::{PasswordPolicy, hash_password, verify_password};
pub use pool::{Pool, PooledConnection, create_pool, get_connection};
pub use ratelimit::{RateLimiter, RateLimiterConfig};
pub use realm::{AuthErrorCode, AuthResult, Authenticator, RealmsConfig};
pub use store::{DurableUser, HanaUserStore, InMemoryUserStore, NewUser, RealmRepository};
pub use tenant::{
    HanaTenantBackend, InMemoryTenantBackend, IsolationMode, TenantConfig, TenantContext,
    TenantConnection, TenantHandle, TenantManager,
};
