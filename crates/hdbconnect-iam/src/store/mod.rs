//! Durable user storage for database realms
//!
//! [`UserStore`] is the persistence seam; [`RealmRepository`] layers password
//! hashing, role expansion and the authentication contract on top of any store.
//!
//! # Backends
//!
//! - [`HanaUserStore`]: `IAM_REALM_USERS` table reached through the connection pool
//! - [`InMemoryUserStore`]: process-local map, for tests and embedded use

mod error;
mod hana;
mod memory;
mod repository;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{StoreError, StoreResult};
pub use hana::HanaUserStore;
pub use memory::InMemoryUserStore;
pub use repository::RealmRepository;

/// A user row of a database realm
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableUser {
    pub id: String,
    pub realm_id: String,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub enabled: bool,
    pub metadata: BTreeMap<String, String>,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for DurableUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableUser")
            .field("id", &self.id)
            .field("realm_id", &self.realm_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("enabled", &self.enabled)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Input to [`RealmRepository::create_user`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub realm_id: String,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub enabled: bool,
    pub metadata: BTreeMap<String, String>,
}

impl NewUser {
    #[must_use]
    pub fn new(realm_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            realm_id: realm_id.into(),
            username: username.into(),
            enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Persistence operations for realm users
///
/// Lookups of absent rows return [`StoreError::NotFound`]; infrastructure
/// failures return [`StoreError::Storage`].
#[async_trait]
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Create the backing table if missing; safe to repeat
    async fn migrate(&self) -> StoreResult<()>;

    /// Insert a new row; `(realm_id, username)` collisions yield `Duplicate`
    async fn insert(&self, user: &DurableUser) -> StoreResult<()>;

    async fn get(&self, realm_id: &str, user_id: &str) -> StoreResult<DurableUser>;

    async fn get_by_username(&self, realm_id: &str, username: &str) -> StoreResult<DurableUser>;

    /// Overwrite every mutable column except the password hash
    async fn update(&self, user: &DurableUser) -> StoreResult<()>;

    async fn set_password_hash(
        &self,
        realm_id: &str,
        user_id: &str,
        password_hash: &str,
        updated_at: i64,
    ) -> StoreResult<()>;

    async fn set_enabled(
        &self,
        realm_id: &str,
        user_id: &str,
        enabled: bool,
        updated_at: i64,
    ) -> StoreResult<()>;

    async fn delete(&self, realm_id: &str, user_id: &str) -> StoreResult<()>;

    /// Page of users ordered by username
    async fn list(&self, realm_id: &str, limit: usize, offset: usize)
    -> StoreResult<Vec<DurableUser>>;

    async fn count(&self, realm_id: &str) -> StoreResult<u64>;
}

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_builder() {
        let user = NewUser::new("realm", "alice")
            .with_email("alice@example.com")
            .with_roles(["admin", "reader"]);
        assert!(user.enabled);
        assert_eq!(user.roles, vec!["admin", "reader"]);
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
        assert!(!NewUser::new("realm", "bob").disabled().enabled);
    }

    #[test]
    fn test_durable_user_debug_hides_hash() {
        let user = DurableUser {
            id: "1".into(),
            realm_id: "r".into(),
            username: "alice".into(),
            password_hash: "$pbkdf2-sha256$1$AAAA$BBBB".into(),
            email: None,
            roles: vec![],
            enabled: true,
            metadata: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        };
        assert!(!format!("{user:?}").contains("pbkdf2"));
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
