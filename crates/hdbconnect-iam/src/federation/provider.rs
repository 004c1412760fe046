//! Federated identity provider definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol spoken by a federated provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Oidc,
    Saml,
}

impl ProviderType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Oidc => "oidc",
            Self::Saml => "saml",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oidc" => Ok(Self::Oidc),
            "saml" => Ok(Self::Saml),
            other => Err(format!("unknown provider type: {other}")),
        }
    }
}

/// Rule translating a claim value into a tenant ID
///
/// Lower `priority` wins when several mappings match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMapping {
    pub claim_name: String,
    pub claim_value: String,
    pub tenant_id: String,
    #[serde(default)]
    pub priority: i32,
}

impl TenantMapping {
    #[must_use]
    pub fn new(
        claim_name: impl Into<String>,
        claim_value: impl Into<String>,
        tenant_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            claim_name: claim_name.into(),
            claim_value: claim_value.into(),
            tenant_id: tenant_id.into(),
            priority,
        }
    }

    /// Whether `claim` carries this mapping's value
    ///
    /// Strings compare exactly, arrays by membership of a string element;
    /// any other JSON value is compared through its textual form.
    #[must_use]
    pub fn matches(&self, claim: &Value) -> bool {
        match claim {
            Value::String(s) => *s == self.claim_value,
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|item| item == self.claim_value),
            other => other.to_string() == self.claim_value,
        }
    }
}

/// External identity provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedProvider {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    pub issuer_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub tenant_mappings: Vec<TenantMapping>,
    #[serde(default)]
    pub allowed_audiences: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub trust_self_signed: bool,
}

impl fmt::Debug for FederatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("issuer_url", &self.issuer_url)
            .field("jwks_url", &self.jwks_url)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("tenant_mappings", &self.tenant_mappings.len())
            .field("allowed_audiences", &self.allowed_audiences)
            .field("enabled", &self.enabled)
            .field("trust_self_signed", &self.trust_self_signed)
            .finish()
    }
}

impl FederatedProvider {
    #[must_use]
    pub fn oidc(id: impl Into<String>, issuer_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_type: ProviderType::Oidc,
            issuer_url: issuer_url.into(),
            jwks_url: None,
            client_id: String::new(),
            client_secret: None,
            tenant_mappings: Vec::new(),
            allowed_audiences: Vec::new(),
            enabled: true,
            trust_self_signed: false,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>, secret: Option<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = secret;
        self
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: TenantMapping) -> Self {
        self.tenant_mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn with_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn trusting_self_signed(mut self) -> Self {
        self.trust_self_signed = true;
        self
    }

    /// Issuer with any trailing slash removed
    #[must_use]
    pub fn normalized_issuer(&self) -> &str {
        self.issuer_url.trim_end_matches('/')
    }

    /// Mappings in evaluation order (ascending priority, stable)
    #[must_use]
    pub fn sorted_mappings(&self) -> Vec<&TenantMapping> {
        let mut mappings: Vec<&TenantMapping> = self.tenant_mappings.iter().collect();
        mappings.sort_by_key(|m| m.priority);
        mappings
    }
}

const fn default_true() -> bool {
    true
}
