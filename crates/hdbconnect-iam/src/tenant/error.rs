//! Tenant management error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("tenant already exists: {0}")]
    Duplicate(String),

    #[error("schema {schema} already belongs to tenant {owner}")]
    SchemaInUse { schema: String, owner: String },

    #[error("tenant not found: {0}")]
    NotFound(String),

    #[error("tenant is disabled: {0}")]
    Disabled(String),

    #[error("{0} isolation not implemented")]
    NotImplemented(String),

    #[error("failed to create schema {schema}: {message}")]
    SchemaCreate { schema: String, message: String },

    #[error("failed to drop schema {schema}: {message}")]
    SchemaDrop { schema: String, message: String },

    #[error("tenant storage error during {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error("statement cannot be confined to one tenant: {0}")]
    UnscopedStatement(String),

    #[error("no tenant context attached to the current task")]
    NoContext,
}

impl TenantError {
    pub fn backend(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }

    /// Infrastructure failure while managing tenant storage
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::SchemaCreate { .. } | Self::SchemaDrop { .. } | Self::Backend { .. }
        )
    }
}

pub type TenantResult<T> = std::result::Result<T, TenantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_messages() {
        let err = TenantError::SchemaCreate {
            schema: "acme".into(),
            message: "insufficient privilege".into(),
        };
        assert!(err.to_string().contains("failed to create schema acme"));
        assert!(err.is_storage());

        let err = TenantError::SchemaDrop {
            schema: "acme".into(),
            message: "locked".into(),
        };
        assert!(err.to_string().contains("failed to drop schema"));
    }

    #[test]
    fn test_schema_in_use_message() {
        let err = TenantError::SchemaInUse {
            schema: "acme_1".into(),
            owner: "acme-1".into(),
        };
        assert_eq!(err.to_string(), "schema acme_1 already belongs to tenant acme-1");
        assert!(!err.is_storage());
    }

    #[test]
    fn test_not_implemented() {
        let err = TenantError::NotImplemented("database".into());
        assert_eq!(err.to_string(), "database isolation not implemented");
        assert!(err.is_not_implemented());
        assert!(!err.is_storage());
    }
}
