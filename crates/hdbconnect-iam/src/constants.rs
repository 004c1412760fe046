//! SQL statements and identifiers

/// Table holding users of database realms
pub const USERS_TABLE: &str = "IAM_REALM_USERS";

/// Unique index over `(REALM_ID, USERNAME)`
pub const USERS_USERNAME_INDEX: &str = "IAM_REALM_USERS_REALM_USERNAME";

/// HANA server error code for a unique constraint violation
pub const UNIQUE_CONSTRAINT_VIOLATED: i32 = 301;

pub const TABLE_EXISTS_QUERY: &str =
    "SELECT COUNT(*) FROM SYS.TABLES WHERE SCHEMA_NAME = CURRENT_SCHEMA AND TABLE_NAME = ?";

pub const INDEX_EXISTS_QUERY: &str =
    "SELECT COUNT(*) FROM SYS.INDEXES WHERE SCHEMA_NAME = CURRENT_SCHEMA AND INDEX_NAME = ?";

pub const CREATE_USERS_TABLE: &str = "CREATE COLUMN TABLE IAM_REALM_USERS (\
    ID NVARCHAR(64) PRIMARY KEY, \
    REALM_ID NVARCHAR(64) NOT NULL, \
    USERNAME NVARCHAR(256) NOT NULL, \
    PASSWORD_HASH NVARCHAR(512) NOT NULL, \
    EMAIL NVARCHAR(320), \
    ROLES NVARCHAR(5000) NOT NULL, \
    ENABLED BOOLEAN NOT NULL, \
    METADATA NVARCHAR(5000) NOT NULL, \
    CREATED_AT BIGINT NOT NULL, \
    UPDATED_AT BIGINT NOT NULL)";

pub const CREATE_USERS_INDEX: &str =
    "CREATE UNIQUE INDEX IAM_REALM_USERS_REALM_USERNAME ON IAM_REALM_USERS (REALM_ID, USERNAME)";

pub const INSERT_USER: &str = "INSERT INTO IAM_REALM_USERS \
    (ID, REALM_ID, USERNAME, PASSWORD_HASH, EMAIL, ROLES, ENABLED, METADATA, CREATED_AT, UPDATED_AT) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub const SELECT_USER_BY_ID: &str = "SELECT \
    ID, REALM_ID, USERNAME, PASSWORD_HASH, EMAIL, ROLES, ENABLED, METADATA, CREATED_AT, UPDATED_AT \
    FROM IAM_REALM_USERS WHERE REALM_ID = ? AND ID = ?";

pub const SELECT_USER_BY_USERNAME: &str = "SELECT \
    ID, REALM_ID, USERNAME, PASSWORD_HASH, EMAIL, ROLES, ENABLED, METADATA, CREATED_AT, UPDATED_AT \
    FROM IAM_REALM_USERS WHERE REALM_ID = ? AND USERNAME = ?";

/// Page query template (use .replace("{LIMIT}", ..).replace("{OFFSET}", ..) with integers)
pub const LIST_USERS_TEMPLATE: &str = "SELECT \
    ID, REALM_ID, USERNAME, PASSWORD_HASH, EMAIL, ROLES, ENABLED, METADATA, CREATED_AT, UPDATED_AT \
    FROM IAM_REALM_USERS WHERE REALM_ID = ? ORDER BY USERNAME LIMIT {LIMIT} OFFSET {OFFSET}";

pub const COUNT_USERS: &str = "SELECT COUNT(*) FROM IAM_REALM_USERS WHERE REALM_ID = ?";

pub const UPDATE_USER: &str = "UPDATE IAM_REALM_USERS \
    SET USERNAME = ?, EMAIL = ?, ROLES = ?, ENABLED = ?, METADATA = ?, UPDATED_AT = ? \
    WHERE REALM_ID = ? AND ID = ?";

pub const UPDATE_PASSWORD_HASH: &str = "UPDATE IAM_REALM_USERS \
    SET PASSWORD_HASH = ?, UPDATED_AT = ? WHERE REALM_ID = ? AND ID = ?";

pub const UPDATE_ENABLED: &str =
    "UPDATE IAM_REALM_USERS SET ENABLED = ?, UPDATED_AT = ? WHERE REALM_ID = ? AND ID = ?";

pub const DELETE_USER: &str = "DELETE FROM IAM_REALM_USERS WHERE REALM_ID = ? AND ID = ?";

pub const SCHEMA_EXISTS_QUERY: &str = "SELECT COUNT(*) FROM SYS.SCHEMAS WHERE SCHEMA_NAME = ?";

/// Column carrying the tenant ID under row isolation
pub const TENANT_ID_COLUMN: &str = "TENANT_ID";

/// Longest schema identifier produced by sanitization
pub const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Well-known path of the OIDC discovery document
pub const OIDC_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
