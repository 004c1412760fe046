//! In-memory realm authenticator

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use serde::Serialize;

use super::config::{RealmConfig, RealmType, RealmsConfig, UserConfig, load_realms};
use super::error::Result;
use super::roles::RoleGraph;
use crate::observability;
use crate::password::{PasswordError, PasswordPolicy, verify_password};

/// Machine-readable reason of an authentication outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorCode {
    #[default]
    None,
    InvalidCreds,
    UserDisabled,
    RealmDisabled,
    RealmNotFound,
    UserNotFound,
    InvalidHashFmt,
    PasswordMismatch,
}

impl AuthErrorCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InvalidCreds => "invalid_creds",
            Self::UserDisabled => "user_disabled",
            Self::RealmDisabled => "realm_disabled",
            Self::RealmNotFound => "realm_not_found",
            Self::UserNotFound => "user_not_found",
            Self::InvalidHashFmt => "invalid_hash_fmt",
            Self::PasswordMismatch => "password_mismatch",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&PasswordError> for AuthErrorCode {
    fn from(err: &PasswordError) -> Self {
        if err.is_mismatch() {
            Self::PasswordMismatch
        } else {
            Self::InvalidHashFmt
        }
    }
}

/// Outcome of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub authenticated: bool,
    pub user_id: String,
    pub username: String,
    pub realm_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub error: Option<String>,
    pub error_code: AuthErrorCode,
    pub timestamp: SystemTime,
}

impl AuthResult {
    #[must_use]
    pub fn success(
        realm_id: &str,
        user_id: &str,
        username: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            authenticated: true,
            user_id: user_id.to_string(),
            username: username.to_string(),
            realm_id: realm_id.to_string(),
            roles,
            permissions,
            error: None,
            error_code: AuthErrorCode::None,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn failure(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user_id: String::new(),
            username: String::new(),
            realm_id: String::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
            error: Some(message.into()),
            error_code: code,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm_id: &str) -> Self {
        self.realm_id = realm_id.to_string();
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Immutable snapshot of the loaded realms
#[derive(Debug, Default)]
struct RealmIndex {
    realms: HashMap<String, Arc<RealmConfig>>,
    names: HashMap<String, String>,
    users: HashMap<(String, String), UserConfig>,
    roles: HashMap<String, RoleGraph>,
    defaults: PasswordPolicy,
}

impl RealmIndex {
    fn build(config: &RealmsConfig) -> Self {
        let mut index = Self {
            defaults: config.defaults.password_policy.clone(),
            ..Self::default()
        };

        for realm in &config.realms {
            index.names.insert(realm.name.clone(), realm.id.clone());
            index
                .roles
                .insert(realm.id.clone(), RoleGraph::new(&realm.roles));

            if realm.realm_type == RealmType::File {
                for user in &realm.users {
                    index
                        .users
                        .insert((realm.id.clone(), user.username.clone()), user.clone());
                }
            }

            index
                .realms
                .insert(realm.id.clone(), Arc::new(realm.clone()));
        }

        index
    }
}

/// Authenticates users of file realms from an in-memory index
///
/// The index is swapped atomically on [`reload`](Self::reload); in-flight
/// authentications keep the snapshot they started with.
pub struct Authenticator {
    index: ArcSwap<RealmIndex>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index.load();
        f.debug_struct("Authenticator")
            .field("realms", &index.realms.len())
            .field("users", &index.users.len())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build from an already validated configuration
    #[must_use]
    pub fn new(config: &RealmsConfig) -> Self {
        Self {
            index: ArcSwap::from_pointee(RealmIndex::build(config)),
        }
    }

    /// Load and validate `realms.toml` from `config_dir`
    pub fn from_dir(config_dir: &Path) -> Result<Self> {
        Ok(Self::new(&load_realms(config_dir)?))
    }

    /// Re-read configuration from disk and swap the index
    ///
    /// On failure the previous index stays active.
    pub fn reload(&self, config_dir: &Path) -> Result<()> {
        let config = load_realms(config_dir).inspect_err(|e| {
            tracing::warn!(error = %e, "Realm reload failed, keeping previous configuration");
        })?;

        let index = RealmIndex::build(&config);
        tracing::info!(
            realms = index.realms.len(),
            users = index.users.len(),
            "Realm configuration reloaded"
        );
        self.index.store(Arc::new(index));
        Ok(())
    }

    pub fn authenticate(&self, realm_id: &str, username: &str, password: &str) -> AuthResult {
        let result = self.authenticate_inner(realm_id, username, password);
        observability::record_auth_outcome("file", result.error_code.as_str());
        result
    }

    /// Resolve the realm by name, then authenticate
    pub fn authenticate_by_realm_name(
        &self,
        realm_name: &str,
        username: &str,
        password: &str,
    ) -> AuthResult {
        let realm_id = self.index.load().names.get(realm_name).cloned();
        match realm_id {
            Some(id) => self.authenticate(&id, username, password),
            None => {
                observability::record_auth_outcome("file", AuthErrorCode::RealmNotFound.as_str());
                AuthResult::failure(
                    AuthErrorCode::RealmNotFound,
                    format!("realm not found: {realm_name}"),
                )
                .with_username(username)
            }
        }
    }

    fn authenticate_inner(&self, realm_id: &str, username: &str, password: &str) -> AuthResult {
        if realm_id.is_empty() || username.is_empty() || password.is_empty() {
            return AuthResult::failure(
                AuthErrorCode::InvalidCreds,
                "realm ID, username and password are required",
            );
        }

        let index = self.index.load();

        let Some(realm) = index.realms.get(realm_id) else {
            return AuthResult::failure(
                AuthErrorCode::RealmNotFound,
                format!("realm not found: {realm_id}"),
            )
            .with_username(username);
        };

        if !realm.enabled {
            return AuthResult::failure(
                AuthErrorCode::RealmDisabled,
                format!("realm is disabled: {}", realm.name),
            )
            .with_realm(realm_id)
            .with_username(username);
        }

        match realm.realm_type {
            RealmType::File => Self::authenticate_file(&index, realm, username, password),
            RealmType::Database => AuthResult::failure(
                AuthErrorCode::RealmNotFound,
                "database realm authentication is served by RealmRepository",
            )
            .with_realm(realm_id)
            .with_username(username),
            RealmType::Ldap | RealmType::Oidc => AuthResult::failure(
                AuthErrorCode::RealmNotFound,
                format!("{} realm authentication not implemented", realm.realm_type),
            )
            .with_realm(realm_id)
            .with_username(username),
        }
    }

    fn authenticate_file(
        index: &RealmIndex,
        realm: &RealmConfig,
        username: &str,
        password: &str,
    ) -> AuthResult {
        let key = (realm.id.clone(), username.to_string());
        let Some(user) = index.users.get(&key) else {
            return AuthResult::failure(AuthErrorCode::UserNotFound, "user not found")
                .with_realm(&realm.id)
                .with_username(username);
        };

        if !user.enabled {
            return AuthResult::failure(AuthErrorCode::UserDisabled, "user is disabled")
                .with_realm(&realm.id)
                .with_username(username);
        }

        let policy = realm.effective_policy(&index.defaults);
        if let Err(e) = verify_password(password, &user.password_hash, policy) {
            tracing::debug!(realm_id = %realm.id, username, error = %e, "Password verification failed");
            return AuthResult::failure(AuthErrorCode::from(&e), e.to_string())
                .with_realm(&realm.id)
                .with_username(username);
        }

        let permissions = index
            .roles
            .get(&realm.id)
            .map(|graph| graph.expand(&user.roles))
            .unwrap_or_default();

        tracing::debug!(realm_id = %realm.id, username, "User authenticated");
        AuthResult::success(
            &realm.id,
            &user.id,
            &user.username,
            user.roles.clone(),
            permissions,
        )
    }

    /// Realm by ID
    #[must_use]
    pub fn realm(&self, realm_id: &str) -> Option<Arc<RealmConfig>> {
        self.index.load().realms.get(realm_id).cloned()
    }

    /// Realm by unique name
    #[must_use]
    pub fn realm_by_name(&self, name: &str) -> Option<Arc<RealmConfig>> {
        let index = self.index.load();
        index
            .names
            .get(name)
            .and_then(|id| index.realms.get(id))
            .cloned()
    }

    /// Sorted IDs of all loaded realms
    #[must_use]
    pub fn realm_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.index.load().realms.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Permissions granted by `roles` within a realm
    #[must_use]
    pub fn expand_permissions(&self, realm_id: &str, roles: &[String]) -> Vec<String> {
        self.index
            .load()
            .roles
            .get(realm_id)
            .map(|graph| graph.expand(roles))
            .unwrap_or_default()
    }
}
