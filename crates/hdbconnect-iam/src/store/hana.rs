//! SAP HANA user store

use std::collections::BTreeMap;

use async_trait::async_trait;
use hdbconnect_async::{HdbResponse, HdbValue, Row};
use serde::Serialize;

use super::{DurableUser, StoreError, StoreResult, UserStore};
use crate::constants::{
    COUNT_USERS, CREATE_USERS_INDEX, CREATE_USERS_TABLE, DELETE_USER, INDEX_EXISTS_QUERY,
    INSERT_USER, LIST_USERS_TEMPLATE, SELECT_USER_BY_ID, SELECT_USER_BY_USERNAME,
    TABLE_EXISTS_QUERY, UNIQUE_CONSTRAINT_VIOLATED, UPDATE_ENABLED, UPDATE_PASSWORD_HASH,
    UPDATE_USER, USERS_TABLE, USERS_USERNAME_INDEX,
};
use crate::pool::{Pool, PooledConnection, get_connection};

/// User store backed by the `IAM_REALM_USERS` table
#[derive(Clone)]
pub struct HanaUserStore {
    pool: Pool,
}

impl std::fmt::Debug for HanaUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HanaUserStore")
            .field("table", &USERS_TABLE)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl HanaUserStore {
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self, operation: &str) -> StoreResult<PooledConnection> {
        get_connection(&self.pool)
            .await
            .map_err(|e| StoreError::storage(operation, e))
    }

    async fn query<P: Serialize + Sync>(
        &self,
        operation: &str,
        sql: &str,
        params: &P,
    ) -> StoreResult<Vec<Row>> {
        let conn = self.connection(operation).await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| StoreError::storage(operation, e))?;
        let result_set = stmt
            .execute(params)
            .await
            .and_then(HdbResponse::into_result_set)
            .map_err(|e| StoreError::storage(operation, e))?;
        let rows = result_set
            .into_rows()
            .await
            .map_err(|e| StoreError::storage(operation, e))?;
        Ok(rows.into_iter().collect())
    }

    async fn execute<P: Serialize + Sync>(
        &self,
        operation: &str,
        sql: &str,
        params: &P,
        subject: &str,
    ) -> StoreResult<usize> {
        let conn = self.connection(operation).await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| classify(operation, e, subject))?;
        let affected = stmt
            .execute(params)
            .await
            .and_then(HdbResponse::into_affected_rows)
            .map_err(|e| classify(operation, e, subject))?;
        Ok(affected.iter().sum())
    }

    /// Run a statement that must touch exactly the row `(realm_id, user_id)`
    async fn execute_one<P: Serialize + Sync>(
        &self,
        operation: &str,
        sql: &str,
        params: &P,
        realm_id: &str,
        user_id: &str,
    ) -> StoreResult<()> {
        let subject = format!("user {user_id} in realm {realm_id}");
        match self.execute(operation, sql, params, &subject).await? {
            0 => Err(StoreError::NotFound(subject)),
            _ => Ok(()),
        }
    }

    async fn count_objects(&self, sql: &str, name: &str) -> StoreResult<i64> {
        let rows = self.query("migrate", sql, &(name,)).await?;
        rows.into_iter()
            .next()
            .map_or(Ok(0), |mut row| next_i64(&mut row, "COUNT"))
    }

    async fn fetch_one<P: Serialize + Sync>(
        &self,
        operation: &str,
        sql: &str,
        params: &P,
        missing: impl FnOnce() -> String,
    ) -> StoreResult<DurableUser> {
        let rows = self.query(operation, sql, params).await?;
        match rows.into_iter().next() {
            Some(row) => user_from_row(row),
            None => Err(StoreError::NotFound(missing())),
        }
    }
}

#[async_trait]
impl UserStore for HanaUserStore {
    async fn migrate(&self) -> StoreResult<()> {
        let plan = MigrationPlan::from_counts(
            self.count_objects(TABLE_EXISTS_QUERY, USERS_TABLE).await?,
            self.count_objects(INDEX_EXISTS_QUERY, USERS_USERNAME_INDEX)
                .await?,
        );
        if plan.is_empty() {
            tracing::debug!(table = USERS_TABLE, "Users table up to date");
            return Ok(());
        }

        let conn = self.connection("migrate").await?;
        if plan.create_table {
            conn.exec(CREATE_USERS_TABLE)
                .await
                .map_err(|e| StoreError::storage("create users table", e))?;
            tracing::info!(table = USERS_TABLE, "Created users table");
        }
        if plan.create_index {
            conn.exec(CREATE_USERS_INDEX)
                .await
                .map_err(|e| StoreError::storage("create username index", e))?;
            tracing::info!(index = USERS_USERNAME_INDEX, "Created username index");
        }

        Ok(())
    }

    async fn insert(&self, user: &DurableUser) -> StoreResult<()> {
        let params = (
            user.id.as_str(),
            user.realm_id.as_str(),
            user.username.as_str(),
            user.password_hash.as_str(),
            user.email.as_deref(),
            encode_roles(&user.roles)?,
            user.enabled,
            encode_metadata(&user.metadata)?,
            user.created_at,
            user.updated_at,
        );

        let subject = format!("user {} in realm {}", user.username, user.realm_id);
        self.execute("insert user", INSERT_USER, &params, &subject)
            .await
            .map(drop)
    }

    async fn get(&self, realm_id: &str, user_id: &str) -> StoreResult<DurableUser> {
        self.fetch_one("get user", SELECT_USER_BY_ID, &(realm_id, user_id), || {
            format!("user {user_id} in realm {realm_id}")
        })
        .await
    }

    async fn get_by_username(&self, realm_id: &str, username: &str) -> StoreResult<DurableUser> {
        self.fetch_one(
            "get user by username",
            SELECT_USER_BY_USERNAME,
            &(realm_id, username),
            || format!("user {username} in realm {realm_id}"),
        )
        .await
    }

    async fn update(&self, user: &DurableUser) -> StoreResult<()> {
        let params = (
            user.username.as_str(),
            user.email.as_deref(),
            encode_roles(&user.roles)?,
            user.enabled,
            encode_metadata(&user.metadata)?,
            user.updated_at,
            user.realm_id.as_str(),
            user.id.as_str(),
        );
        self.execute_one("update user", UPDATE_USER, &params, &user.realm_id, &user.id)
            .await
    }

    async fn set_password_hash(
        &self,
        realm_id: &str,
        user_id: &str,
        password_hash: &str,
        updated_at: i64,
    ) -> StoreResult<()> {
        self.execute_one(
            "update password",
            UPDATE_PASSWORD_HASH,
            &(password_hash, updated_at, realm_id, user_id),
            realm_id,
            user_id,
        )
        .await
    }

    async fn set_enabled(
        &self,
        realm_id: &str,
        user_id: &str,
        enabled: bool,
        updated_at: i64,
    ) -> StoreResult<()> {
        self.execute_one(
            "set enabled",
            UPDATE_ENABLED,
            &(enabled, updated_at, realm_id, user_id),
            realm_id,
            user_id,
        )
        .await
    }

    async fn delete(&self, realm_id: &str, user_id: &str) -> StoreResult<()> {
        self.execute_one(
            "delete user",
            DELETE_USER,
            &(realm_id, user_id),
            realm_id,
            user_id,
        )
        .await
    }

    async fn list(
        &self,
        realm_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<DurableUser>> {
        let sql = list_users_sql(limit, offset);
        self.query("list users", &sql, &(realm_id,))
            .await?
            .into_iter()
            .map(user_from_row)
            .collect()
    }

    async fn count(&self, realm_id: &str) -> StoreResult<u64> {
        let rows = self.query("count users", COUNT_USERS, &(realm_id,)).await?;
        let count = rows
            .into_iter()
            .next()
            .map_or(Ok(0), |mut row| next_i64(&mut row, "COUNT"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// DDL still missing from the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MigrationPlan {
    create_table: bool,
    create_index: bool,
}

impl MigrationPlan {
    /// Plan from the catalog counts of the users table and its index
    ///
    /// A fresh table always gets its index, whatever the index count says.
    const fn from_counts(table_count: i64, index_count: i64) -> Self {
        let create_table = table_count == 0;
        Self {
            create_table,
            create_index: create_table || index_count == 0,
        }
    }

    const fn is_empty(self) -> bool {
        !self.create_table && !self.create_index
    }
}

fn list_users_sql(limit: usize, offset: usize) -> String {
    LIST_USERS_TEMPLATE
        .replace("{LIMIT}", &limit.to_string())
        .replace("{OFFSET}", &offset.to_string())
}

fn is_unique_violation(err: &hdbconnect::HdbError) -> bool {
    err.server_error()
        .is_some_and(|e| e.code() == UNIQUE_CONSTRAINT_VIOLATED)
}

/// Unique-key collisions become `Duplicate`; everything else is a storage failure
fn classify(operation: &str, err: hdbconnect::HdbError, subject: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate(subject.to_string())
    } else {
        StoreError::storage(operation, err)
    }
}

fn encode_roles(roles: &[String]) -> StoreResult<String> {
    serde_json::to_string(roles).map_err(|e| StoreError::storage("encode roles", e))
}

fn encode_metadata(metadata: &BTreeMap<String, String>) -> StoreResult<String> {
    serde_json::to_string(metadata).map_err(|e| StoreError::storage("encode metadata", e))
}

fn decode_error(column: &str, value: Option<&HdbValue>) -> StoreError {
    StoreError::storage(
        "decode user row",
        format!("unexpected value for {column}: {value:?}"),
    )
}

fn next_string(row: &mut Row, column: &str) -> StoreResult<String> {
    match row.next_value() {
        Some(HdbValue::STRING(s)) => Ok(s),
        other => Err(decode_error(column, other.as_ref())),
    }
}

fn next_optional_string(row: &mut Row, column: &str) -> StoreResult<Option<String>> {
    match row.next_value() {
        Some(HdbValue::STRING(s)) => Ok(Some(s)),
        Some(HdbValue::NULL) | None => Ok(None),
        other => Err(decode_error(column, other.as_ref())),
    }
}

fn next_bool(row: &mut Row, column: &str) -> StoreResult<bool> {
    match row.next_value() {
        Some(HdbValue::BOOLEAN(b)) => Ok(b),
        Some(HdbValue::TINYINT(v)) => Ok(v != 0),
        other => Err(decode_error(column, other.as_ref())),
    }
}

fn next_i64(row: &mut Row, column: &str) -> StoreResult<i64> {
    match row.next_value() {
        Some(HdbValue::BIGINT(v)) => Ok(v),
        Some(HdbValue::INT(v)) => Ok(i64::from(v)),
        other => Err(decode_error(column, other.as_ref())),
    }
}

fn user_from_row(mut row: Row) -> StoreResult<DurableUser> {
    let id = next_string(&mut row, "ID")?;
    let realm_id = next_string(&mut row, "REALM_ID")?;
    let username = next_string(&mut row, "USERNAME")?;
    let password_hash = next_string(&mut row, "PASSWORD_HASH")?;
    let email = next_optional_string(&mut row, "EMAIL")?;
    let roles = next_string(&mut row, "ROLES")?;
    let enabled = next_bool(&mut row, "ENABLED")?;
    let metadata = next_string(&mut row, "METADATA")?;
    let created_at = next_i64(&mut row, "CREATED_AT")?;
    let updated_at = next_i64(&mut row, "UPDATED_AT")?;

    Ok(DurableUser {
        id,
        realm_id,
        username,
        password_hash,
        email,
        roles: serde_json::from_str(&roles)
            .map_err(|e| StoreError::storage("decode roles", e))?,
        enabled,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StoreError::storage("decode metadata", e))?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_plan_fresh_database() {
        let plan = MigrationPlan::from_counts(0, 0);
        assert!(plan.create_table);
        assert!(plan.create_index);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_migration_plan_missing_index() {
        let plan = MigrationPlan::from_counts(1, 0);
        assert!(!plan.create_table);
        assert!(plan.create_index);
    }

    #[test]
    fn test_migration_plan_is_idempotent() {
        // Counts as the catalog reports them after a completed migration
        let plan = MigrationPlan::from_counts(1, 1);
        assert!(plan.is_empty());
        assert_eq!(plan, MigrationPlan::from_counts(1, 1));
    }

    #[test]
    fn test_migration_plan_orphaned_index_count() {
        let plan = MigrationPlan::from_counts(0, 1);
        assert!(plan.create_table);
        assert!(plan.create_index);
    }

    #[test]
    fn test_list_users_sql() {
        let sql = list_users_sql(25, 50);
        assert!(sql.ends_with("ORDER BY USERNAME LIMIT 25 OFFSET 50"));
        assert!(!sql.contains('{'));
    }

    #[test]
    fn test_json_columns() {
        assert_eq!(
            encode_roles(&["admin".to_string(), "reader".to_string()]).unwrap(),
            r#"["admin","reader"]"#
        );

        let mut metadata = BTreeMap::new();
        metadata.insert("department".to_string(), "finance".to_string());
        assert_eq!(
            encode_metadata(&metadata).unwrap(),
            r#"{"department":"finance"}"#
        );
        assert_eq!(encode_metadata(&BTreeMap::new()).unwrap(), "{}");
    }

    #[test]
    fn test_statements_bind_realm_scope() {
        for sql in [
            SELECT_USER_BY_ID,
            SELECT_USER_BY_USERNAME,
            UPDATE_USER,
            UPDATE_PASSWORD_HASH,
            UPDATE_ENABLED,
            DELETE_USER,
        ] {
            assert!(sql.contains("REALM_ID = ?"), "{sql}");
        }
        assert_eq!(INSERT_USER.matches('?').count(), 10);
    }
}
