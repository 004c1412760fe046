//! In-memory user store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{DurableUser, StoreError, StoreResult, UserStore};

/// Thread-safe user store kept in process memory
///
/// Rows are keyed by user ID; the `(realm_id, username)` uniqueness rule is
/// enforced the same way the table's unique index does.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, DurableUser>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(realm_id: &str, user_id: &str) -> StoreError {
        StoreError::NotFound(format!("user {user_id} in realm {realm_id}"))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn migrate(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert(&self, user: &DurableUser) -> StoreResult<()> {
        let mut users = self.users.write();
        let taken = users
            .values()
            .any(|u| u.realm_id == user.realm_id && u.username == user.username);
        if taken || users.contains_key(&user.id) {
            return Err(StoreError::Duplicate(format!(
                "user {} in realm {}",
                user.username, user.realm_id
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get(&self, realm_id: &str, user_id: &str) -> StoreResult<DurableUser> {
        self.users
            .read()
            .get(user_id)
            .filter(|u| u.realm_id == realm_id)
            .cloned()
            .ok_or_else(|| Self::not_found(realm_id, user_id))
    }

    async fn get_by_username(&self, realm_id: &str, username: &str) -> StoreResult<DurableUser> {
        self.users
            .read()
            .values()
            .find(|u| u.realm_id == realm_id && u.username == username)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("user {username} in realm {realm_id}"))
            })
    }

    async fn update(&self, user: &DurableUser) -> StoreResult<()> {
        let mut users = self.users.write();
        let collision = users.values().any(|u| {
            u.id != user.id && u.realm_id == user.realm_id && u.username == user.username
        });
        if collision {
            return Err(StoreError::Duplicate(format!(
                "user {} in realm {}",
                user.username, user.realm_id
            )));
        }

        let existing = users
            .get_mut(&user.id)
            .filter(|u| u.realm_id == user.realm_id)
            .ok_or_else(|| Self::not_found(&user.realm_id, &user.id))?;

        existing.username.clone_from(&user.username);
        existing.email.clone_from(&user.email);
        existing.roles.clone_from(&user.roles);
        existing.enabled = user.enabled;
        existing.metadata.clone_from(&user.metadata);
        existing.updated_at = user.updated_at;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        realm_id: &str,
        user_id: &str,
        password_hash: &str,
        updated_at: i64,
    ) -> StoreResult<()> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .filter(|u| u.realm_id == realm_id)
            .ok_or_else(|| Self::not_found(realm_id, user_id))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = updated_at;
        Ok(())
    }

    async fn set_enabled(
        &self,
        realm_id: &str,
        user_id: &str,
        enabled: bool,
        updated_at: i64,
    ) -> StoreResult<()> {
        let mut users = self.users.write();
        let user = users
            .get_mut(user_id)
            .filter(|u| u.realm_id == realm_id)
            .ok_or_else(|| Self::not_found(realm_id, user_id))?;
        user.enabled = enabled;
        user.updated_at = updated_at;
        Ok(())
    }

    async fn delete(&self, realm_id: &str, user_id: &str) -> StoreResult<()> {
        let mut users = self.users.write();
        match users.get(user_id) {
            Some(u) if u.realm_id == realm_id => {
                users.remove(user_id);
                Ok(())
            }
            _ => Err(Self::not_found(realm_id, user_id)),
        }
    }

    async fn list(
        &self,
        realm_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DurableUser>> {
        let mut page: Vec<DurableUser> = self
            .users
            .read()
            .values()
            .filter(|u| u.realm_id == realm_id)
            .cloned()
            .collect();
        page.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(page.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, realm_id: &str) -> StoreResult<u64> {
        let count = self
            .users
            .read()
            .values()
            .filter(|u| u.realm_id == realm_id)
            .count();
        Ok(count as u64)
    }
}
