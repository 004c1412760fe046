//! Authentication realms
//!
//! A realm is an authentication domain with its own users, roles and password
//! policy. Realms are declared in `realms.toml` and served from an in-memory
//! index by [`Authenticator`]. Only `file` realms authenticate here; the other
//! realm types are recognised but report themselves as not implemented.
//!
//! # Role inheritance
//!
//! Roles form a graph through `inherits`. A user's permission set is the
//! transitive closure over that graph. Cycles are rejected when the
//! configuration is validated, so expansion never recurses forever.

mod authenticator;
mod config;
mod error;
mod roles;

pub use authenticator::{AuthErrorCode, AuthResult, Authenticator};
pub use config::{
    REALMS_FILE, RealmConfig, RealmDefaults, RealmType, RealmsConfig, RoleConfig, UserConfig,
    load_realms,
};
pub use error::{RealmError, Result};
pub use roles::RoleGraph;
