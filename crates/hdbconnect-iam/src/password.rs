//! PBKDF2 password hashing
//!
//! Hashes are encoded as `$<algorithm>$<iterations>$<base64-salt>$<base64-hash>`
//! using the standard base64 alphabet with padding. The encoding is persisted
//! in realm files and the users table, so it must stay bit-exact.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Default salt length in bytes
pub const DEFAULT_SALT_BYTES: usize = 32;

/// Default derived key length in bytes
pub const DEFAULT_HASH_BYTES: usize = 32;

/// Smallest accepted salt or hash length
const MIN_KEY_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("unsupported password algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid password policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid hash format: expected 5 '$'-delimited fields")]
    InvalidFormat,

    #[error("algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    #[error("invalid iteration count: {0}")]
    InvalidIterations(String),

    #[error("invalid salt encoding")]
    InvalidSaltEncoding,

    #[error("invalid hash encoding")]
    InvalidHashEncoding,

    #[error("password mismatch")]
    Mismatch,
}

impl PasswordError {
    /// True for every failure caused by a malformed stored hash
    #[must_use]
    pub const fn is_malformed_hash(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat
                | Self::AlgorithmMismatch { .. }
                | Self::InvalidIterations(_)
                | Self::InvalidSaltEncoding
                | Self::InvalidHashEncoding
        )
    }

    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch)
    }
}

pub type Result<T> = std::result::Result<T, PasswordError>;

/// PBKDF2 pseudo-random function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Pbkdf2Sha256,
    Pbkdf2Sha384,
    Pbkdf2Sha512,
}

impl Algorithm {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 => "pbkdf2-sha256",
            Self::Pbkdf2Sha384 => "pbkdf2-sha384",
            Self::Pbkdf2Sha512 => "pbkdf2-sha512",
        }
    }

    fn derive(self, password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
        match self {
            Self::Pbkdf2Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, out),
            Self::Pbkdf2Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, salt, iterations, out),
            Self::Pbkdf2Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, out),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = PasswordError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pbkdf2-sha256" => Ok(Self::Pbkdf2Sha256),
            "pbkdf2-sha384" => Ok(Self::Pbkdf2Sha384),
            "pbkdf2-sha512" => Ok(Self::Pbkdf2Sha512),
            _ => Err(PasswordError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Hashing parameters of a realm
///
/// `algorithm` is kept as a string so that a realm can leave it empty and
/// inherit the configuration-wide default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub algorithm: String,
    pub iterations: u32,
    pub salt_bytes: usize,
    pub hash_bytes: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default().as_str().to_string(),
            iterations: DEFAULT_ITERATIONS,
            salt_bytes: DEFAULT_SALT_BYTES,
            hash_bytes: DEFAULT_HASH_BYTES,
        }
    }
}

impl PasswordPolicy {
    /// Policy with every field unset, used as the "inherit defaults" marker
    #[must_use]
    pub const fn unset() -> Self {
        Self {
            algorithm: String::new(),
            iterations: 0,
            salt_bytes: 0,
            hash_bytes: 0,
        }
    }

    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.algorithm.is_empty()
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        self.algorithm.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.algorithm()?;
        if self.iterations == 0 {
            return Err(PasswordError::InvalidPolicy(
                "iterations must be at least 1".into(),
            ));
        }
        if self.salt_bytes < MIN_KEY_BYTES {
            return Err(PasswordError::InvalidPolicy(format!(
                "salt_bytes must be at least {MIN_KEY_BYTES}"
            )));
        }
        if self.hash_bytes < MIN_KEY_BYTES {
            return Err(PasswordError::InvalidPolicy(format!(
                "hash_bytes must be at least {MIN_KEY_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Decoded form of an encoded password hash
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub algorithm: Algorithm,
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHash")
            .field("algorithm", &self.algorithm)
            .field("iterations", &self.iterations)
            .field("salt_len", &self.salt.len())
            .field("hash_len", &self.hash.len())
            .finish()
    }
}

impl PasswordHash {
    /// Parse an encoded hash, checking the algorithm against `expected`
    pub fn parse(encoded: &str, expected: Algorithm) -> Result<Self> {
        let parts: Vec<&str> = encoded.split('$').collect();
        if parts.len() != 5 || !parts[0].is_empty() {
            return Err(PasswordError::InvalidFormat);
        }

        if !parts[1].eq_ignore_ascii_case(expected.as_str()) {
            return Err(PasswordError::AlgorithmMismatch {
                expected: expected.as_str().to_string(),
                actual: parts[1].to_string(),
            });
        }

        let iterations: u32 = parts[2]
            .parse()
            .map_err(|_| PasswordError::InvalidIterations(parts[2].to_string()))?;
        if iterations == 0 {
            return Err(PasswordError::InvalidIterations(parts[2].to_string()));
        }

        let salt = STANDARD
            .decode(parts[3])
            .map_err(|_| PasswordError::InvalidSaltEncoding)?;
        let hash = STANDARD
            .decode(parts[4])
            .map_err(|_| PasswordError::InvalidHashEncoding)?;
        if hash.is_empty() {
            return Err(PasswordError::InvalidHashEncoding);
        }

        Ok(Self {
            algorithm: expected,
            iterations,
            salt,
            hash,
        })
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "${}${}${}${}",
            self.algorithm,
            self.iterations,
            STANDARD.encode(&self.salt),
            STANDARD.encode(&self.hash)
        )
    }
}

/// Hash `password` under `policy` with a fresh random salt
pub fn hash_password(password: &str, policy: &PasswordPolicy) -> Result<String> {
    policy.validate()?;
    let algorithm = policy.algorithm()?;

    let mut salt = vec![0u8; policy.salt_bytes];
    OsRng.fill_bytes(&mut salt);

    let mut hash = vec![0u8; policy.hash_bytes];
    algorithm.derive(password.as_bytes(), &salt, policy.iterations, &mut hash);

    Ok(PasswordHash {
        algorithm,
        iterations: policy.iterations,
        salt,
        hash,
    }
    .encode())
}

/// Verify `password` against an encoded hash
///
/// The derived key uses the iteration count, salt and length stored in the
/// hash; only the algorithm is pinned by the policy. Comparison is constant
/// time.
pub fn verify_password(password: &str, encoded: &str, policy: &PasswordPolicy) -> Result<()> {
    let algorithm = policy.algorithm()?;
    let stored = PasswordHash::parse(encoded, algorithm)?;

    let mut derived = vec![0u8; stored.hash.len()];
    algorithm.derive(
        password.as_bytes(),
        &stored.salt,
        stored.iterations,
        &mut derived,
    );

    if bool::from(derived.ct_eq(&stored.hash)) {
        Ok(())
    } else {
        Err(PasswordError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> PasswordPolicy {
        PasswordPolicy::default().with_iterations(1_000)
    }

    #[test]
    fn test_algorithm_round_trip_names() {
        for alg in [
            Algorithm::Pbkdf2Sha256,
            Algorithm::Pbkdf2Sha384,
            Algorithm::Pbkdf2Sha512,
        ] {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
        }
        assert!("bcrypt".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_default_policy() {
        let policy = PasswordPolicy::default();
        assert_eq!(policy.algorithm, "pbkdf2-sha256");
        assert_eq!(policy.iterations, 600_000);
        assert_eq!(policy.salt_bytes, 32);
        assert_eq!(policy.hash_bytes, 32);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(fast_policy().with_iterations(0).validate().is_err());

        let short_salt = PasswordPolicy {
            salt_bytes: 8,
            ..fast_policy()
        };
        assert!(short_salt.validate().is_err());

        let bad_alg = PasswordPolicy {
            algorithm: "md5".to_string(),
            ..fast_policy()
        };
        assert!(matches!(
            bad_alg.validate(),
            Err(PasswordError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_hash_format() {
        let encoded = hash_password("secret", &fast_policy()).unwrap();
        let parts: Vec<&str> = encoded.split('$').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[0].is_empty());
        assert_eq!(parts[1], "pbkdf2-sha256");
        assert_eq!(parts[2], "1000");
        assert_eq!(STANDARD.decode(parts[3]).unwrap().len(), 32);
        assert_eq!(STANDARD.decode(parts[4]).unwrap().len(), 32);
    }

    #[test]
    fn test_hash_then_verify() {
        let policy = fast_policy();
        let encoded = hash_password("correct horse", &policy).unwrap();
        assert!(verify_password("correct horse", &encoded, &policy).is_ok());

        let err = verify_password("battery staple", &encoded, &policy).unwrap_err();
        assert!(err.is_mismatch());
    }

    #[test]
    fn test_salt_is_random() {
        let policy = fast_policy();
        let a = hash_password("same", &policy).unwrap();
        let b = hash_password("same", &policy).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha512_policy() {
        let policy = PasswordPolicy {
            algorithm: "pbkdf2-sha512".to_string(),
            hash_bytes: 64,
            ..fast_policy()
        };
        let encoded = hash_password("pw", &policy).unwrap();
        assert!(encoded.starts_with("$pbkdf2-sha512$"));
        assert!(verify_password("pw", &encoded, &policy).is_ok());
    }

    #[test]
    fn test_verify_rejects_algorithm_mismatch() {
        let encoded = hash_password("pw", &fast_policy()).unwrap();
        let other = PasswordPolicy {
            algorithm: "pbkdf2-sha384".to_string(),
            ..fast_policy()
        };
        let err = verify_password("pw", &encoded, &other).unwrap_err();
        assert!(matches!(err, PasswordError::AlgorithmMismatch { .. }));
        assert!(err.is_malformed_hash());
    }

    #[test]
    fn test_verify_rejects_malformed_hashes() {
        let policy = fast_policy();
        let salt = STANDARD.encode(b"valid-salt-32-bytes-padding-here");

        let cases = [
            ("no-dollars".to_string(), "format"),
            ("$pbkdf2-sha256$1000$abc".to_string(), "format"),
            (format!("x$pbkdf2-sha256$1000${salt}${salt}"), "format"),
            (format!("$pbkdf2-sha256$abc${salt}${salt}"), "iterations"),
            (format!("$pbkdf2-sha256$0${salt}${salt}"), "iterations"),
            (format!("$pbkdf2-sha256$1000$!!!${salt}"), "salt"),
            (
                format!("$pbkdf2-sha256$600000${salt}$!!!invalid-base64!!!"),
                "hash",
            ),
        ];

        for (encoded, expected) in cases {
            let err = verify_password("password", &encoded, &policy).unwrap_err();
            assert!(err.is_malformed_hash(), "{encoded}: {err}");
            let matched = match expected {
                "format" => matches!(err, PasswordError::InvalidFormat),
                "iterations" => matches!(err, PasswordError::InvalidIterations(_)),
                "salt" => matches!(err, PasswordError::InvalidSaltEncoding),
                "hash" => matches!(err, PasswordError::InvalidHashEncoding),
                _ => false,
            };
            assert!(matched, "{encoded}: unexpected {err:?}");
        }
    }

    #[test]
    fn test_invalid_hash_encoding_message() {
        let salt = STANDARD.encode(b"valid-salt-32-bytes-padding-here");
        let encoded = format!("$pbkdf2-sha256$600000${salt}$!!!invalid-base64!!!");
        let err = verify_password("password", &encoded, &fast_policy()).unwrap_err();
        assert!(err.to_string().contains("invalid hash encoding"));
    }

    #[test]
    fn test_parse_encode_preserves_text() {
        let encoded = hash_password("pw", &fast_policy()).unwrap();
        let parsed = PasswordHash::parse(&encoded, Algorithm::Pbkdf2Sha256).unwrap();
        assert_eq!(parsed.iterations, 1_000);
        assert_eq!(parsed.encode(), encoded);
    }

    #[test]
    fn test_password_hash_debug_hides_material() {
        let encoded = hash_password("pw", &fast_policy()).unwrap();
        let parsed = PasswordHash::parse(&encoded, Algorithm::Pbkdf2Sha256).unwrap();
        let debug = format!("{parsed:?}");
        assert!(debug.contains("salt_len"));
        assert!(!debug.contains(&STANDARD.encode(&parsed.salt)));
    }
}
