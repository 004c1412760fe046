//! Realm configuration file (`realms.toml`)

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{RealmError, Result};
use super::roles::RoleGraph;
use crate::password::PasswordPolicy;

/// File name looked up inside the realm configuration directory
pub const REALMS_FILE: &str = "realms.toml";

/// Realm backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealmType {
    File,
    Database,
    Ldap,
    Oidc,
}

impl RealmType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Database => "database",
            Self::Ldap => "ldap",
            Self::Oidc => "oidc",
        }
    }
}

impl fmt::Display for RealmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RealmType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "database" => Ok(Self::Database),
            "ldap" => Ok(Self::Ldap),
            "oidc" => Ok(Self::Oidc),
            other => Err(format!("unknown realm type: {other}")),
        }
    }
}

/// A user of a file realm
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// A named permission bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

/// One realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub realm_type: RealmType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_policy: Option<PasswordPolicy>,
}

impl RealmConfig {
    /// Password policy in force for this realm
    ///
    /// A realm without a policy, or with an empty algorithm, uses `defaults`.
    #[must_use]
    pub fn effective_policy<'a>(&'a self, defaults: &'a PasswordPolicy) -> &'a PasswordPolicy {
        match &self.password_policy {
            Some(policy) if !policy.is_unset() => policy,
            _ => defaults,
        }
    }
}

/// Configuration-wide defaults
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmDefaults {
    pub password_policy: PasswordPolicy,
}

/// Root of `realms.toml`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmsConfig {
    pub version: String,
    pub realms: Vec<RealmConfig>,
    pub defaults: RealmDefaults,
}

impl RealmsConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| RealmError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject malformed IDs, duplicates, bad policies and role cycles
    pub fn validate(&self) -> Result<()> {
        self.defaults
            .password_policy
            .validate()
            .map_err(|source| RealmError::Policy {
                realm: "defaults".to_string(),
                source,
            })?;

        let mut ids = HashSet::new();
        let mut names = HashSet::new();

        for realm in &self.realms {
            if Uuid::parse_str(&realm.id).is_err() {
                return Err(RealmError::InvalidId(realm.id.clone()));
            }
            if !ids.insert(realm.id.to_lowercase()) {
                return Err(RealmError::DuplicateId(realm.id.clone()));
            }
            if realm.name.trim().is_empty() {
                return Err(RealmError::invalid(&realm.id, "realm name must not be empty"));
            }
            if !names.insert(realm.name.as_str()) {
                return Err(RealmError::DuplicateName(realm.name.clone()));
            }

            validate_realm(realm, &self.defaults.password_policy)?;
        }

        Ok(())
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.realms.iter().map(|r| r.users.len()).sum()
    }
}

fn validate_realm(realm: &RealmConfig, defaults: &PasswordPolicy) -> Result<()> {
    realm
        .effective_policy(defaults)
        .validate()
        .map_err(|source| RealmError::Policy {
            realm: realm.name.clone(),
            source,
        })?;

    let mut role_names = HashSet::new();
    for role in &realm.roles {
        if role.name.is_empty() {
            return Err(RealmError::invalid(&realm.name, "role name must not be empty"));
        }
        if !role_names.insert(role.name.as_str()) {
            return Err(RealmError::invalid(
                &realm.name,
                format!("duplicate role name: {}", role.name),
            ));
        }
    }

    if let Some(cycle) = RoleGraph::new(&realm.roles).find_cycle() {
        return Err(RealmError::RoleCycle {
            realm: realm.name.clone(),
            cycle,
        });
    }

    let mut usernames = HashSet::new();
    for user in &realm.users {
        if user.username.is_empty() {
            return Err(RealmError::invalid(&realm.name, "username must not be empty"));
        }
        if !usernames.insert(user.username.as_str()) {
            return Err(RealmError::invalid(
                &realm.name,
                format!("duplicate username: {}", user.username),
            ));
        }
    }

    Ok(())
}

/// Load `realms.toml` from `config_dir`
///
/// A missing file yields an empty configuration with default policy.
pub fn load_realms(config_dir: &Path) -> Result<RealmsConfig> {
    let path = config_dir.join(REALMS_FILE);

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No realm configuration found, using defaults");
            return Ok(RealmsConfig::default());
        }
        Err(source) => return Err(RealmError::Read { path, source }),
    };

    RealmsConfig::from_toml(&content, &path)
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    const REALM_A: &str = "0190f5e4-7a8b-7c3d-9e2f-1a2b3c4d5e6f";
    const REALM_B: &str = "0190f5e4-7a8b-7c3d-9e2f-1a2b3c4d5e70";

    fn parse(content: &str) -> Result<RealmsConfig> {
        RealmsConfig::from_toml(content, &PathBuf::from(REALMS_FILE))
    }

    #[test]
    fn test_parse_full_config() {
        let content = format!(
            r#"
version = "1"

[defaults.password_policy]
algorithm = "pbkdf2-sha256"
iterations = 1000
salt_bytes = 16
hash_bytes = 32

[[realms]]
id = "{REALM_A}"
name = "corp"
type = "file"

[[realms.roles]]
name = "admin"
permissions = ["users:write"]
inherits = ["reader"]

[[realms.roles]]
name = "reader"
permissions = ["users:read"]

[[realms.users]]
id = "u1"
username = "alice"
password_hash = "$pbkdf2-sha256$1000$AAAA$BBBB"
email = "alice@example.com"
roles = ["admin"]

[[realms]]
id = "{REALM_B}"
name = "partners"
type = "database"
enabled = false
"#
        );

        let config = parse(&content).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.realms.len(), 2);
        assert_eq!(config.defaults.password_policy.iterations, 1000);

        let corp = &config.realms[0];
        assert_eq!(corp.realm_type, RealmType::File);
        assert!(corp.enabled);
        assert_eq!(corp.roles.len(), 2);
        assert_eq!(corp.users[0].email.as_deref(), Some("alice@example.com"));
        assert!(corp.users[0].enabled);

        let partners = &config.realms[1];
        assert_eq!(partners.realm_type, RealmType::Database);
        assert!(!partners.enabled);
        assert_eq!(config.user_count(), 1);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse("").unwrap();
        assert!(config.realms.is_empty());
        assert_eq!(config.defaults.password_policy, PasswordPolicy::default());
    }

    #[test]
    fn test_rejects_unknown_realm_type() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"x\"\ntype = \"kerberos\"\n"
        );
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, RealmError::Parse { .. }));
    }

    #[test]
    fn test_rejects_non_uuid_id() {
        let err = parse("[[realms]]\nid = \"realm-1\"\nname = \"x\"\ntype = \"file\"\n")
            .unwrap_err();
        assert!(matches!(err, RealmError::InvalidId(id) if id == "realm-1"));
    }

    #[test]
    fn test_rejects_duplicate_id() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"a\"\ntype = \"file\"\n\
             [[realms]]\nid = \"{REALM_A}\"\nname = \"b\"\ntype = \"file\"\n"
        );
        assert!(matches!(parse(&content), Err(RealmError::DuplicateId(_))));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"same\"\ntype = \"file\"\n\
             [[realms]]\nid = \"{REALM_B}\"\nname = \"same\"\ntype = \"file\"\n"
        );
        assert!(matches!(parse(&content), Err(RealmError::DuplicateName(n)) if n == "same"));
    }

    #[test]
    fn test_rejects_duplicate_username() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"corp\"\ntype = \"file\"\n\
             [[realms.users]]\nid = \"1\"\nusername = \"bob\"\npassword_hash = \"x\"\n\
             [[realms.users]]\nid = \"2\"\nusername = \"bob\"\npassword_hash = \"y\"\n"
        );
        let err = parse(&content).unwrap_err();
        assert!(err.to_string().contains("duplicate username: bob"));
    }

    #[test]
    fn test_same_username_in_different_realms() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"a\"\ntype = \"file\"\n\
             [[realms.users]]\nid = \"1\"\nusername = \"bob\"\npassword_hash = \"x\"\n\
             [[realms]]\nid = \"{REALM_B}\"\nname = \"b\"\ntype = \"file\"\n\
             [[realms.users]]\nid = \"2\"\nusername = \"bob\"\npassword_hash = \"y\"\n"
        );
        assert!(parse(&content).is_ok());
    }

    #[test]
    fn test_rejects_role_cycle() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"corp\"\ntype = \"file\"\n\
             [[realms.roles]]\nname = \"a\"\ninherits = [\"b\"]\n\
             [[realms.roles]]\nname = \"b\"\ninherits = [\"a\"]\n"
        );
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, RealmError::RoleCycle { ref cycle, .. } if cycle == &["a", "b", "a"]));
    }

    #[test]
    fn test_rejects_invalid_realm_policy() {
        let content = format!(
            "[[realms]]\nid = \"{REALM_A}\"\nname = \"corp\"\ntype = \"file\"\n\
             [realms.password_policy]\nalgorithm = \"md5\"\n"
        );
        assert!(matches!(parse(&content), Err(RealmError::Policy { .. })));
    }

    #[test]
    fn test_effective_policy_falls_back_when_algorithm_empty() {
        let defaults = PasswordPolicy::default().with_iterations(42);
        let mut realm = RealmConfig {
            id: REALM_A.to_string(),
            name: "corp".to_string(),
            realm_type: RealmType::File,
            enabled: true,
            users: vec![],
            roles: vec![],
            password_policy: None,
        };
        assert_eq!(realm.effective_policy(&defaults).iterations, 42);

        realm.password_policy = Some(PasswordPolicy::unset().with_iterations(7));
        assert_eq!(realm.effective_policy(&defaults).iterations, 42);

        realm.password_policy = Some(PasswordPolicy::default().with_iterations(7));
        assert_eq!(realm.effective_policy(&defaults).iterations, 7);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = load_realms(dir.path()).unwrap();
        assert_eq!(config, RealmsConfig::default());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        let content = format!("version = \"2\"\n[[realms]]\nid = \"{REALM_A}\"\nname = \"corp\"\ntype = \"file\"\n");
        std::fs::write(dir.path().join(REALMS_FILE), content).unwrap();

        let config = load_realms(dir.path()).unwrap();
        assert_eq!(config.version, "2");
        assert_eq!(config.realms[0].name, "corp");
    }

    #[test]
    fn test_load_unparsable_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(REALMS_FILE), "realms = [[[").unwrap();

        let err = load_realms(dir.path()).unwrap_err();
        assert!(err.is_load_error());
        assert!(err.to_string().contains("realms.toml"));
    }

    #[test]
    fn test_realm_type_from_str() {
        assert_eq!("LDAP".parse::<RealmType>().unwrap(), RealmType::Ldap);
        assert!("saml".parse::<RealmType>().is_err());
        assert_eq!(RealmType::Oidc.to_string(), "oidc");
    }

    #[test]
    fn test_user_debug_hides_hash() {
        let user = UserConfig {
            id: "1".into(),
            username: "alice".into(),
            password_hash: "$pbkdf2-sha256$1$c2FsdA==$aGFzaA==".into(),
            email: None,
            roles: vec![],
            enabled: true,
        };
        assert!(!format!("{user:?}").contains("pbkdf2"));
    }
}
