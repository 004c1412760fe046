//! Schema identifier sanitization
//!
//! Tenant identifiers are untrusted. Every schema name that reaches a
//! statement goes through [`sanitize_schema_name`] and is then quoted with
//! [`quote_identifier`].

use crate::constants::MAX_SCHEMA_NAME_LEN;

use super::config::TenantConfig;

/// Normalize an arbitrary identifier into a safe schema name
///
/// Characters other than ASCII alphanumerics and `_` become `_`, a leading
/// digit gets a `t_` prefix, and the result is lower-cased and cut to 63
/// characters.
#[must_use]
pub fn sanitize_schema_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "t_");
    }

    name.truncate(MAX_SCHEMA_NAME_LEN);
    name
}

/// Double-quoted SQL identifier
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema a tenant lives in under schema isolation
#[must_use]
pub fn schema_name_for(tenant: &TenantConfig) -> String {
    match tenant.schema_name.as_deref() {
        Some(explicit) if !explicit.is_empty() => sanitize_schema_name(explicit),
        _ => sanitize_schema_name(&tenant.id),
    }
}
