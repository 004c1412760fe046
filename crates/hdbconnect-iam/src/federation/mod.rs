//! Identity federation with external OIDC providers
//!
//! [`FederationManager`] keeps the provider registry, caches discovery
//! documents per provider ID, maps token claims to tenant IDs and checks
//! audiences. Token signature validation is left to the caller, which obtains
//! the key set location through [`FederationManager::get_jwks_url`].

mod discovery;
mod error;
mod manager;
mod provider;

pub use discovery::{OidcDiscoveryDocument, discovery_url};
pub use error::{FederationError, Result};
pub use manager::{
    DEFAULT_DISCOVERY_TTL, DEFAULT_HTTP_TIMEOUT, FederationConfig, FederationManager,
};
pub use provider::{FederatedProvider, ProviderType, TenantMapping};
