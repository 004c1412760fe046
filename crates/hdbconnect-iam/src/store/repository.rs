//! Realm repository over a durable user store

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::{DurableUser, NewUser, StoreError, StoreResult, UserStore, now_millis};
use crate::observability;
use crate::password::{PasswordPolicy, hash_password, verify_password};
use crate::realm::{AuthErrorCode, AuthResult, RealmConfig, RoleGraph};

/// Per-realm settings known to the repository
#[derive(Debug, Clone)]
struct RealmSettings {
    enabled: bool,
    policy: PasswordPolicy,
    roles: RoleGraph,
}

/// User management and authentication for database realms
///
/// Realms registered with [`with_realm`](Self::with_realm) contribute their
/// enabled flag, password policy and role graph. Unregistered realm IDs use
/// the default policy and grant no permissions beyond the stored role names.
#[derive(Debug, Clone)]
pub struct RealmRepository {
    store: Arc<dyn UserStore>,
    default_policy: PasswordPolicy,
    realms: HashMap<String, RealmSettings>,
}

impl RealmRepository {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, default_policy: PasswordPolicy) -> Self {
        Self {
            store,
            default_policy,
            realms: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm: &RealmConfig) -> Self {
        let settings = RealmSettings {
            enabled: realm.enabled,
            policy: realm.effective_policy(&self.default_policy).clone(),
            roles: RoleGraph::new(&realm.roles),
        };
        self.realms.insert(realm.id.clone(), settings);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    fn policy(&self, realm_id: &str) -> &PasswordPolicy {
        self.realms
            .get(realm_id)
            .map_or(&self.default_policy, |r| &r.policy)
    }

    /// Provision the backing table; idempotent
    pub async fn migrate(&self) -> StoreResult<()> {
        self.store.migrate().await
    }

    /// Hash `password` and insert a new user
    ///
    /// Empty realm ID, username or password is rejected before storage is touched.
    pub async fn create_user(&self, user: NewUser, password: &str) -> StoreResult<DurableUser> {
        if user.realm_id.is_empty() {
            return Err(StoreError::invalid("realm ID must not be empty"));
        }
        if user.username.is_empty() {
            return Err(StoreError::invalid("username must not be empty"));
        }
        if password.is_empty() {
            return Err(StoreError::invalid("password must not be empty"));
        }

        let password_hash = self.hash(&user.realm_id, password).await?;
        let now = now_millis();
        let record = DurableUser {
            id: Uuid::now_v7().to_string(),
            realm_id: user.realm_id,
            username: user.username,
            password_hash,
            email: user.email,
            roles: user.roles,
            enabled: user.enabled,
            metadata: user.metadata,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&record).await?;
        tracing::info!(realm_id = %record.realm_id, user_id = %record.id, "User created");
        Ok(record)
    }

    pub async fn get_user(&self, realm_id: &str, user_id: &str) -> StoreResult<DurableUser> {
        self.store.get(realm_id, user_id).await
    }

    pub async fn get_user_by_username(
        &self,
        realm_id: &str,
        username: &str,
    ) -> StoreResult<DurableUser> {
        self.store.get_by_username(realm_id, username).await
    }

    /// Persist profile changes; the password hash is left untouched
    pub async fn update_user(&self, user: &DurableUser) -> StoreResult<DurableUser> {
        if user.username.is_empty() {
            return Err(StoreError::invalid("username must not be empty"));
        }
        let mut updated = user.clone();
        updated.updated_at = now_millis();
        self.store.update(&updated).await?;
        self.store.get(&user.realm_id, &user.id).await
    }

    pub async fn update_password(
        &self,
        realm_id: &str,
        user_id: &str,
        new_password: &str,
    ) -> StoreResult<()> {
        if new_password.is_empty() {
            return Err(StoreError::invalid("password must not be empty"));
        }
        let hash = self.hash(realm_id, new_password).await?;
        self.store
            .set_password_hash(realm_id, user_id, &hash, now_millis())
            .await?;
        tracing::info!(realm_id, user_id, "Password rotated");
        Ok(())
    }

    pub async fn enable_user(&self, realm_id: &str, user_id: &str) -> StoreResult<()> {
        self.store
            .set_enabled(realm_id, user_id, true, now_millis())
            .await
    }

    pub async fn disable_user(&self, realm_id: &str, user_id: &str) -> StoreResult<()> {
        self.store
            .set_enabled(realm_id, user_id, false, now_millis())
            .await
    }

    pub async fn delete_user(&self, realm_id: &str, user_id: &str) -> StoreResult<()> {
        self.store.delete(realm_id, user_id).await?;
        tracing::info!(realm_id, user_id, "User deleted");
        Ok(())
    }

    /// Users ordered by username; `limit = 0` yields an empty page
    pub async fn list_users(
        &self,
        realm_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DurableUser>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store.list(realm_id, limit, offset).await
    }

    pub async fn count_users(&self, realm_id: &str) -> StoreResult<u64> {
        self.store.count(realm_id).await
    }

    /// Authenticate against stored users
    ///
    /// Domain failures are reported through the result's error code; `Err`
    /// is returned only when storage itself fails.
    pub async fn authenticate(
        &self,
        realm_id: &str,
        username: &str,
        password: &str,
    ) -> StoreResult<AuthResult> {
        let result = self.authenticate_inner(realm_id, username, password).await;
        if let Ok(result) = &result {
            observability::record_auth_outcome("database", result.error_code.as_str());
        }
        result
    }

    async fn authenticate_inner(
        &self,
        realm_id: &str,
        username: &str,
        password: &str,
    ) -> StoreResult<AuthResult> {
        if realm_id.is_empty() || username.is_empty() || password.is_empty() {
            return Ok(AuthResult::failure(
                AuthErrorCode::InvalidCreds,
                "realm ID, username and password are required",
            ));
        }

        if self.realms.get(realm_id).is_some_and(|r| !r.enabled) {
            return Ok(AuthResult::failure(
                AuthErrorCode::RealmDisabled,
                format!("realm is disabled: {realm_id}"),
            )
            .with_realm(realm_id)
            .with_username(username));
        }

        let user = match self.store.get_by_username(realm_id, username).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Ok(
                    AuthResult::failure(AuthErrorCode::UserNotFound, "user not found")
                        .with_realm(realm_id)
                        .with_username(username),
                );
            }
            Err(e) => return Err(e),
        };

        if !user.enabled {
            return Ok(
                AuthResult::failure(AuthErrorCode::UserDisabled, "user is disabled")
                    .with_realm(realm_id)
                    .with_username(username),
            );
        }

        let policy = self.policy(realm_id).clone();
        let password = password.to_string();
        let hash = user.password_hash.clone();
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&password, &hash, &policy))
                .await
                .map_err(|e| StoreError::storage("verify password", e))?;

        if let Err(e) = verified {
            tracing::debug!(realm_id, username, error = %e, "Password verification failed");
            return Ok(AuthResult::failure(AuthErrorCode::from(&e), e.to_string())
                .with_realm(realm_id)
                .with_username(username));
        }

        let permissions = self
            .realms
            .get(realm_id)
            .map(|r| r.roles.expand(&user.roles))
            .unwrap_or_default();

        Ok(AuthResult::success(
            realm_id,
            &user.id,
            &user.username,
            user.roles,
            permissions,
        ))
    }

    async fn hash(&self, realm_id: &str, password: &str) -> StoreResult<String> {
        let policy = self.policy(realm_id).clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_password(&password, &policy))
            .await
            .map_err(|e| StoreError::storage("hash password", e))?
            .map_err(StoreError::from)
    }
}
