//! Realm configuration error types

use std::path::PathBuf;

use thiserror::Error;

use crate::password::PasswordError;

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid realm ID '{0}': must be a UUID")]
    InvalidId(String),

    #[error("duplicate realm ID: {0}")]
    DuplicateId(String),

    #[error("duplicate realm name: {0}")]
    DuplicateName(String),

    #[error("realm {realm}: {message}")]
    Invalid { realm: String, message: String },

    #[error("realm {realm}: role inheritance cycle {}", cycle.join(" -> "))]
    RoleCycle { realm: String, cycle: Vec<String> },

    #[error("realm {realm}: invalid password policy: {source}")]
    Policy {
        realm: String,
        #[source]
        source: PasswordError,
    },
}

impl RealmError {
    pub(crate) fn invalid(realm: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            realm: realm.to_string(),
            message: message.into(),
        }
    }

    /// True for errors raised while reading or parsing the file itself
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, RealmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_cycle_display() {
        let err = RealmError::RoleCycle {
            realm: "corp".to_string(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "realm corp: role inheritance cycle a -> b -> a");
    }

    #[test]
    fn test_read_error_names_file() {
        let err = RealmError::Read {
            path: PathBuf::from("/etc/iam/realms.toml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("failed to read /etc/iam/realms.toml"));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_invalid_helper() {
        let err = RealmError::invalid("corp", "empty name");
        assert_eq!(err.to_string(), "realm corp: empty name");
        assert!(!err.is_load_error());
    }
}
