//! Federated provider registry and discovery cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use super::discovery::{CachedDiscovery, OidcDiscoveryDocument, build_client, fetch_discovery};
use super::error::{FederationError, Result};
use super::provider::{FederatedProvider, ProviderType};
use crate::observability;

/// Default lifetime of a cached discovery document
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(3600);

/// Default timeout of a discovery request
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime settings of [`FederationManager`]
#[derive(Debug, Clone)]
pub struct FederationConfig {
    pub discovery_ttl: Duration,
    pub http_timeout: Duration,
    /// Providers registered at construction
    pub providers: Vec<FederatedProvider>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            discovery_ttl: DEFAULT_DISCOVERY_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            providers: Vec::new(),
        }
    }
}

/// Registry of external identity providers
///
/// Discovery fetches run with no lock held; the cache lock is taken only to
/// read or store an entry, so a slow provider never blocks other lookups.
pub struct FederationManager {
    providers: RwLock<HashMap<String, Arc<FederatedProvider>>>,
    discovery: RwLock<HashMap<String, CachedDiscovery>>,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    ttl: Duration,
}

impl std::fmt::Debug for FederationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationManager")
            .field("providers", &self.providers.read().len())
            .field("cached_documents", &self.discovery.read().len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl FederationManager {
    pub fn new(config: &FederationConfig) -> Result<Self> {
        let manager = Self {
            providers: RwLock::new(HashMap::new()),
            discovery: RwLock::new(HashMap::new()),
            client: build_client(config.http_timeout, false)?,
            insecure_client: build_client(config.http_timeout, true)?,
            ttl: config.discovery_ttl,
        };

        for provider in &config.providers {
            manager.register_provider(provider.clone())?;
        }

        Ok(manager)
    }

    pub fn register_provider(&self, provider: FederatedProvider) -> Result<()> {
        if provider.id.is_empty() {
            return Err(FederationError::InvalidProvider(
                "provider ID is required".into(),
            ));
        }
        if provider.issuer_url.is_empty() {
            return Err(FederationError::InvalidProvider(format!(
                "issuer URL is required for provider {}",
                provider.id
            )));
        }
        if let Err(e) = url::Url::parse(&provider.issuer_url) {
            return Err(FederationError::InvalidProvider(format!(
                "invalid issuer URL for provider {}: {e}",
                provider.id
            )));
        }
        if provider.provider_type != ProviderType::Oidc {
            return Err(FederationError::UnsupportedProviderType(
                provider.provider_type.to_string(),
            ));
        }

        let mut providers = self.providers.write();
        if providers.contains_key(&provider.id) {
            return Err(FederationError::DuplicateProvider(provider.id));
        }

        tracing::info!(
            provider_id = %provider.id,
            issuer = %provider.issuer_url,
            mappings = provider.tenant_mappings.len(),
            "Federated provider registered"
        );
        providers.insert(provider.id.clone(), Arc::new(provider));
        Ok(())
    }

    /// Remove a provider and every cached document it owns
    pub fn unregister_provider(&self, provider_id: &str) -> Result<()> {
        if self.providers.write().remove(provider_id).is_none() {
            return Err(FederationError::ProviderNotFound(provider_id.to_string()));
        }
        self.discovery.write().remove(provider_id);
        tracing::info!(provider_id, "Federated provider unregistered");
        Ok(())
    }

    pub fn get_provider(&self, provider_id: &str) -> Result<Arc<FederatedProvider>> {
        self.providers
            .read()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| FederationError::ProviderNotFound(provider_id.to_string()))
    }

    /// Enabled provider by ID; disabled providers are refused
    fn active_provider(&self, provider_id: &str) -> Result<Arc<FederatedProvider>> {
        let provider = self.get_provider(provider_id)?;
        if !provider.enabled {
            return Err(FederationError::ProviderDisabled(provider_id.to_string()));
        }
        Ok(provider)
    }

    /// Look up an enabled provider by issuer; a trailing slash on either side
    /// is ignored
    pub fn get_provider_by_issuer(&self, issuer: &str) -> Result<Arc<FederatedProvider>> {
        let wanted = issuer.trim_end_matches('/');
        self.providers
            .read()
            .values()
            .find(|p| p.enabled && p.normalized_issuer() == wanted)
            .cloned()
            .ok_or_else(|| FederationError::ProviderNotFound(issuer.to_string()))
    }

    /// Snapshot of all providers sorted by ID
    #[must_use]
    pub fn list_providers(&self) -> Vec<Arc<FederatedProvider>> {
        let mut providers: Vec<_> = self.providers.read().values().cloned().collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    /// Discovery document of a provider, served from cache until it expires
    pub async fn discover_oidc(&self, provider_id: &str) -> Result<Arc<OidcDiscoveryDocument>> {
        let provider = self.active_provider(provider_id)?;
        if provider.provider_type != ProviderType::Oidc {
            return Err(FederationError::NotOidc(provider_id.to_string()));
        }

        if let Some(document) = self.cached(provider_id) {
            observability::record_discovery("cache_hit");
            return Ok(document);
        }

        let client = if provider.trust_self_signed {
            &self.insecure_client
        } else {
            &self.client
        };

        let document = match fetch_discovery(client, provider_id, &provider.issuer_url).await {
            Ok(document) => document,
            Err(e) => {
                observability::record_discovery("error");
                tracing::warn!(provider_id, error = %e, "OIDC discovery failed");
                return Err(e);
            }
        };
        observability::record_discovery("fetched");

        let entry = CachedDiscovery::new(document, self.ttl);
        let document = Arc::clone(&entry.document);

        // The provider may have been unregistered while the fetch was in flight.
        if self.providers.read().contains_key(provider_id) {
            self.discovery.write().insert(provider_id.to_string(), entry);
        }

        Ok(document)
    }

    fn cached(&self, provider_id: &str) -> Option<Arc<OidcDiscoveryDocument>> {
        self.discovery
            .read()
            .get(provider_id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| Arc::clone(&entry.document))
    }

    /// Tenant ID for a set of token claims
    ///
    /// Mappings are evaluated in ascending priority; the first match wins.
    pub fn map_tenant_from_claims(
        &self,
        provider_id: &str,
        claims: &serde_json::Map<String, Value>,
    ) -> Result<String> {
        let provider = self.active_provider(provider_id)?;
        if provider.tenant_mappings.is_empty() {
            return Err(FederationError::NoTenantMappings(provider_id.to_string()));
        }

        provider
            .sorted_mappings()
            .into_iter()
            .find(|mapping| {
                claims
                    .get(&mapping.claim_name)
                    .is_some_and(|claim| mapping.matches(claim))
            })
            .map(|mapping| mapping.tenant_id.clone())
            .ok_or_else(|| FederationError::NoMatchingTenant(provider_id.to_string()))
    }

    /// Check presented audiences against the provider's allow-list
    ///
    /// An empty allow-list accepts any audience.
    pub fn validate_audience(&self, provider_id: &str, audiences: &[String]) -> Result<()> {
        let provider = self.active_provider(provider_id)?;
        if provider.allowed_audiences.is_empty()
            || audiences
                .iter()
                .any(|aud| provider.allowed_audiences.contains(aud))
        {
            return Ok(());
        }
        Err(FederationError::AudienceNotAllowed(provider_id.to_string()))
    }

    /// Configured JWKS URL, or the one announced by discovery
    pub async fn get_jwks_url(&self, provider_id: &str) -> Result<String> {
        let provider = self.active_provider(provider_id)?;
        if let Some(url) = provider.jwks_url.as_ref().filter(|u| !u.is_empty()) {
            return Ok(url.clone());
        }

        let document = self
            .discover_oidc(provider_id)
            .await
            .map_err(|e| FederationError::JwksUrl {
                provider: provider_id.to_string(),
                source: Box::new(e),
            })?;

        if document.jwks_uri.is_empty() {
            return Err(FederationError::JwksUrl {
                provider: provider_id.to_string(),
                source: Box::new(FederationError::DiscoveryParse {
                    provider: provider_id.to_string(),
                    message: "document has no jwks_uri".into(),
                }),
            });
        }
        Ok(document.jwks_uri.clone())
    }

    #[must_use]
    pub fn cached_document_count(&self) -> usize {
        self.discovery.read().len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::federation::TenantMapping;

    fn manager() -> FederationManager {
        FederationManager::new(&FederationConfig::default()).unwrap()
    }

    fn claims(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("claims must be an object"),
        }
    }

    async fn discovery_server(expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/keys", server.uri()),
            })))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_register_validation() {
        let m = manager();
        assert!(matches!(
            m.register_provider(FederatedProvider::oidc("", "https://idp")),
            Err(FederationError::InvalidProvider(_))
        ));
        assert!(matches!(
            m.register_provider(FederatedProvider::oidc("p", "")),
            Err(FederationError::InvalidProvider(_))
        ));
        assert!(matches!(
            m.register_provider(FederatedProvider::oidc("p", "not a url")),
            Err(FederationError::InvalidProvider(_))
        ));

        let mut saml = FederatedProvider::oidc("s", "https://idp.example.com");
        saml.provider_type = ProviderType::Saml;
        assert!(matches!(
            m.register_provider(saml),
            Err(FederationError::UnsupportedProviderType(t)) if t == "saml"
        ));

        m.register_provider(FederatedProvider::oidc("p", "https://idp.example.com"))
            .unwrap();
        let err = m
            .register_provider(FederatedProvider::oidc("p", "https://other.example.com"))
            .unwrap_err();
        assert!(matches!(err, FederationError::DuplicateProvider(_)));
    }

    #[test]
    fn test_lookups() {
        let m = manager();
        m.register_provider(FederatedProvider::oidc("b", "https://b.example.com/"))
            .unwrap();
        m.register_provider(FederatedProvider::oidc("a", "https://a.example.com"))
            .unwrap();

        assert_eq!(m.get_provider("a").unwrap().issuer_url, "https://a.example.com");
        assert!(m.get_provider("zzz").unwrap_err().is_not_found());
        assert_eq!(m.get_provider_by_issuer("https://b.example.com").unwrap().id, "b");
        assert_eq!(m.get_provider_by_issuer("https://a.example.com/").unwrap().id, "a");
        assert!(m.get_provider_by_issuer("https://c.example.com").is_err());

        let ids: Vec<String> = m.list_providers().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_disabled_provider_is_refused() {
        let server = discovery_server(0).await;
        let m = manager();
        let mut provider = FederatedProvider::oidc("idp", server.uri())
            .with_mapping(TenantMapping::new("org", "acme", "T1", 0))
            .with_audiences(["api://orders"]);
        provider.enabled = false;
        m.register_provider(provider).unwrap();

        assert!(!m.get_provider("idp").unwrap().enabled);
        assert!(m.get_provider_by_issuer(&server.uri()).unwrap_err().is_not_found());

        let disabled = |err: FederationError| {
            matches!(err, FederationError::ProviderDisabled(id) if id == "idp")
        };
        assert!(disabled(m.discover_oidc("idp").await.unwrap_err()));
        assert!(disabled(m.get_jwks_url("idp").await.unwrap_err()));
        assert!(disabled(
            m.map_tenant_from_claims("idp", &claims(json!({"org": "acme"})))
                .unwrap_err()
        ));
        assert!(disabled(
            m.validate_audience("idp", &["api://orders".into()]).unwrap_err()
        ));
        assert_eq!(m.cached_document_count(), 0);
    }

    #[test]
    fn test_providers_from_config() {
        let config = FederationConfig {
            providers: vec![
                FederatedProvider::oidc("one", "https://one.example.com"),
                FederatedProvider::oidc("two", "https://two.example.com"),
            ],
            ..FederationConfig::default()
        };
        let m = FederationManager::new(&config).unwrap();
        assert_eq!(m.list_providers().len(), 2);
    }

    #[test]
    fn test_map_tenant_lower_priority_wins() {
        let m = manager();
        m.register_provider(
            FederatedProvider::oidc("idp", "https://idp.example.com")
                .with_mapping(TenantMapping::new("org", "acme", "T1", 10))
                .with_mapping(TenantMapping::new("groups", "admin", "T2", 5)),
        )
        .unwrap();

        let tenant = m
            .map_tenant_from_claims("idp", &claims(json!({"org": "acme", "groups": ["admin"]})))
            .unwrap();
        assert_eq!(tenant, "T2");

        let tenant = m
            .map_tenant_from_claims("idp", &claims(json!({"org": "acme", "groups": ["users"]})))
            .unwrap();
        assert_eq!(tenant, "T1");
    }

    #[test]
    fn test_map_tenant_failures() {
        let m = manager();
        m.register_provider(FederatedProvider::oidc("bare", "https://idp.example.com"))
            .unwrap();
        m.register_provider(
            FederatedProvider::oidc("mapped", "https://idp2.example.com")
                .with_mapping(TenantMapping::new("org", "acme", "T1", 0)),
        )
        .unwrap();

        assert!(matches!(
            m.map_tenant_from_claims("bare", &claims(json!({"org": "acme"}))),
            Err(FederationError::NoTenantMappings(_))
        ));
        let err = m
            .map_tenant_from_claims("mapped", &claims(json!({"org": "globex"})))
            .unwrap_err();
        assert!(err.to_string().contains("no matching tenant mapping found"));
        assert!(m
            .map_tenant_from_claims("ghost", &claims(json!({})))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_map_tenant_numeric_claim() {
        let m = manager();
        m.register_provider(
            FederatedProvider::oidc("idp", "https://idp.example.com")
                .with_mapping(TenantMapping::new("org_id", "42", "T42", 0)),
        )
        .unwrap();
        let tenant = m
            .map_tenant_from_claims("idp", &claims(json!({"org_id": 42})))
            .unwrap();
        assert_eq!(tenant, "T42");
    }

    #[test]
    fn test_validate_audience() {
        let m = manager();
        m.register_provider(FederatedProvider::oidc("open", "https://a.example.com"))
            .unwrap();
        m.register_provider(
            FederatedProvider::oidc("strict", "https://b.example.com")
                .with_audiences(["api://orders", "api://billing"]),
        )
        .unwrap();

        assert!(m.validate_audience("open", &["anything".into()]).is_ok());
        assert!(m.validate_audience("open", &[]).is_ok());
        assert!(m
            .validate_audience("strict", &["x".into(), "api://billing".into()])
            .is_ok());
        assert!(matches!(
            m.validate_audience("strict", &["api://other".into()]),
            Err(FederationError::AudienceNotAllowed(_))
        ));
        assert!(m.validate_audience("strict", &[]).is_err());
    }

    #[tokio::test]
    async fn test_discovery_is_cached() {
        let server = discovery_server(1).await;
        let m = manager();
        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();

        let first = m.discover_oidc("idp").await.unwrap();
        let second = m.discover_oidc("idp").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(m.cached_document_count(), 1);
        // expect(1) is verified when the server drops
    }

    #[tokio::test]
    async fn test_expired_document_is_refetched() {
        let server = discovery_server(2).await;
        let m = FederationManager::new(&FederationConfig {
            discovery_ttl: Duration::ZERO,
            ..FederationConfig::default()
        })
        .unwrap();
        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();

        m.discover_oidc("idp").await.unwrap();
        m.discover_oidc("idp").await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_purges_cache() {
        let server = discovery_server(2).await;
        let m = manager();
        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();
        m.discover_oidc("idp").await.unwrap();
        assert_eq!(m.cached_document_count(), 1);

        m.unregister_provider("idp").unwrap();
        assert_eq!(m.cached_document_count(), 0);
        assert!(m.unregister_provider("idp").unwrap_err().is_not_found());

        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();
        m.discover_oidc("idp").await.unwrap();
    }

    #[tokio::test]
    async fn test_jwks_url_prefers_configuration() {
        let server = discovery_server(0).await;
        let m = manager();
        m.register_provider(
            FederatedProvider::oidc("idp", server.uri()).with_jwks_url("https://keys.example.com"),
        )
        .unwrap();
        assert_eq!(
            m.get_jwks_url("idp").await.unwrap(),
            "https://keys.example.com"
        );
    }

    #[tokio::test]
    async fn test_jwks_url_from_discovery() {
        let server = discovery_server(1).await;
        let m = manager();
        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();
        assert_eq!(
            m.get_jwks_url("idp").await.unwrap(),
            format!("{}/keys", server.uri())
        );
    }

    #[tokio::test]
    async fn test_jwks_url_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let m = manager();
        m.register_provider(FederatedProvider::oidc("idp", server.uri()))
            .unwrap();

        let err = m.get_jwks_url("idp").await.unwrap_err();
        assert!(err.to_string().contains("failed to discover JWKS URL"));
        assert!(err.is_discovery());
        assert_eq!(m.cached_document_count(), 0);
    }
}
