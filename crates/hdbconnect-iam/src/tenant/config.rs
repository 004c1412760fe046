//! Tenant definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How one tenant's data is kept apart from another's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// One schema per tenant
    #[default]
    Schema,
    /// Shared tables filtered by a tenant ID column
    Row,
    /// One database per tenant (recognised, not implemented)
    Database,
}

impl IsolationMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Row => "row",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schema" => Ok(Self::Schema),
            "row" => Ok(Self::Row),
            "database" => Ok(Self::Database),
            other => Err(format!("unknown isolation mode: {other}")),
        }
    }
}

/// A registered tenant
///
/// `isolation_mode` and `realm_id` may be left unset on registration; the
/// manager fills them from its defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub realm_id: String,
    #[serde(default)]
    pub isolation_mode: Option<IsolationMode>,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TenantConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            realm_id: String::new(),
            isolation_mode: None,
            schema_name: None,
            enabled: true,
        }
    }

    #[must_use]
    pub const fn with_isolation(mut self, mode: IsolationMode) -> Self {
        self.isolation_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_realm(mut self, realm_id: impl Into<String>) -> Self {
        self.realm_id = realm_id.into();
        self
    }

    #[must_use]
    pub fn with_schema_name(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Effective isolation mode
    #[must_use]
    pub fn isolation(&self) -> IsolationMode {
        self.isolation_mode.unwrap_or_default()
    }
}

/// Defaults applied by [`TenantManager`](super::TenantManager)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantManagerConfig {
    pub isolation_mode: IsolationMode,
    pub default_realm_id: String,
}

const fn default_true() -> bool {
    true
}
