use thiserror::Error;

use crate::federation::FederationError;
use crate::password::PasswordError;
use crate::realm::RealmError;
use crate::store::StoreError;
use crate::tenant::TenantError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] hdbconnect::HdbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Realm(#[from] RealmError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error(transparent)]
    Tenant(#[from] TenantError),
}

impl Error {
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }

    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether the error reports a missing entity rather than a failure
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_not_found(),
            Self::Federation(e) => e.is_not_found(),
            Self::Tenant(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_predicate() {
        let err = Error::Config("invalid config".to_string());
        assert!(err.is_config());
        assert!(!err.is_pool_exhausted());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_pool_exhausted_predicate() {
        let err = Error::PoolExhausted;
        assert!(err.is_pool_exhausted());
        assert!(!err.is_config());
        assert!(!err.is_connection());
    }

    #[test]
    fn test_not_found_propagates_from_module_errors() {
        let err: Error = StoreError::NotFound("user u1".to_string()).into();
        assert!(err.is_not_found());

        let err: Error = TenantError::NotFound("t1".to_string()).into();
        assert!(err.is_not_found());

        let err: Error = FederationError::ProviderNotFound("p1".to_string()).into();
        assert!(err.is_not_found());

        let err: Error = StoreError::storage("count users", "socket closed").into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Config("missing URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing URL");

        let err: Error = TenantError::NotFound("acme".to_string()).into();
        assert!(err.to_string().contains("acme"));
    }
}
