//! OIDC discovery document fetching

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::{FederationError, Result};
use crate::constants::OIDC_DISCOVERY_PATH;

/// Subset of the OpenID Provider Metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Discovery document with its expiry
#[derive(Debug, Clone)]
pub(crate) struct CachedDiscovery {
    pub document: Arc<OidcDiscoveryDocument>,
    pub expires_at: Instant,
}

impl CachedDiscovery {
    pub fn new(document: OidcDiscoveryDocument, ttl: Duration) -> Self {
        Self {
            document: Arc::new(document),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// `{issuer}/.well-known/openid-configuration`, ignoring a trailing slash
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{OIDC_DISCOVERY_PATH}", issuer.trim_end_matches('/'))
}

/// Build the outbound HTTP client used for discovery
pub(crate) fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| FederationError::HttpClient(e.to_string()))
}

/// GET and decode the discovery document of `issuer`
pub(crate) async fn fetch_discovery(
    client: &reqwest::Client,
    provider_id: &str,
    issuer: &str,
) -> Result<OidcDiscoveryDocument> {
    let url = discovery_url(issuer);
    tracing::debug!(provider_id, url = %url, "Fetching OIDC discovery document");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| FederationError::DiscoveryRequest {
            provider: provider_id.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FederationError::DiscoveryStatus {
            provider: provider_id.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FederationError::DiscoveryBody {
            provider: provider_id.to_string(),
            message: e.to_string(),
        })?;

    serde_json::from_slice(&body).map_err(|e| FederationError::DiscoveryParse {
        provider: provider_id.to_string(),
        message: e.to_string(),
    })
}
