//! Federation error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    #[error("unsupported provider type: {0}")]
    UnsupportedProviderType(String),

    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider is disabled: {0}")]
    ProviderDisabled(String),

    #[error("provider {0} is not OIDC type")]
    NotOidc(String),

    #[error("failed to fetch discovery document for {provider}: {message}")]
    DiscoveryRequest { provider: String, message: String },

    #[error("discovery endpoint for {provider} returned status {status}")]
    DiscoveryStatus { provider: String, status: u16 },

    #[error("failed to read discovery document for {provider}: {message}")]
    DiscoveryBody { provider: String, message: String },

    #[error("failed to parse discovery document for {provider}: {message}")]
    DiscoveryParse { provider: String, message: String },

    #[error("failed to discover JWKS URL for {provider}: {source}")]
    JwksUrl {
        provider: String,
        #[source]
        source: Box<FederationError>,
    },

    #[error("provider {0} has no tenant mappings")]
    NoTenantMappings(String),

    #[error("no matching tenant mapping found for provider {0}")]
    NoMatchingTenant(String),

    #[error("audience not allowed by provider {0}")]
    AudienceNotAllowed(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl FederationError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ProviderNotFound(_))
    }

    /// Failure talking to, or understanding, a remote discovery endpoint
    #[must_use]
    pub fn is_discovery(&self) -> bool {
        match self {
            Self::DiscoveryRequest { .. }
            | Self::DiscoveryStatus { .. }
            | Self::DiscoveryBody { .. }
            | Self::DiscoveryParse { .. } => true,
            Self::JwksUrl { source, .. } => source.is_discovery(),
            _ => false,
        }
    }

    /// Rejected at registration time
    #[must_use]
    pub const fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::InvalidProvider(_) | Self::UnsupportedProviderType(_) | Self::DuplicateProvider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FederationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        let err = FederationError::DiscoveryStatus {
            provider: "okta".into(),
            status: 500,
        };
        assert!(err.to_string().contains("returned status 500"));
        assert!(err.is_discovery());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_jwks_error_wraps_discovery() {
        let err = FederationError::JwksUrl {
            provider: "okta".into(),
            source: Box::new(FederationError::DiscoveryParse {
                provider: "okta".into(),
                message: "expected value".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to discover JWKS URL"));
        assert!(msg.contains("failed to parse discovery document"));
        assert!(err.is_discovery());
    }

    #[test]
    fn test_registration_predicate() {
        assert!(FederationError::DuplicateProvider("p".into()).is_registration());
        assert!(!FederationError::ProviderNotFound("p".into()).is_registration());
        assert!(FederationError::ProviderNotFound("p".into()).is_not_found());
        assert!(!FederationError::ProviderDisabled("p".into()).is_not_found());
    }
}
