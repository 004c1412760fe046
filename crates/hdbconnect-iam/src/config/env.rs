//! Environment variable loading for configuration

use std::env;
use std::num::NonZeroUsize;

use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::tenant::IsolationMode;

/// Environment variable names
mod vars {
    pub const HANA_URL: &str = "HANA_URL";
    pub const HANA_USER: &str = "HANA_USER";
    pub const HANA_PASSWORD: &str = "HANA_PASSWORD";
    pub const HANA_POOL_SIZE: &str = "HANA_POOL_SIZE";
    pub const IAM_REALMS_DIR: &str = "IAM_REALMS_DIR";
    pub const IAM_ISOLATION_MODE: &str = "IAM_ISOLATION_MODE";
    pub const IAM_DEFAULT_REALM_ID: &str = "IAM_DEFAULT_REALM_ID";
    pub const IAM_RATE_LIMIT_PER_MINUTE: &str = "IAM_RATE_LIMIT_PER_MINUTE";
    pub const IAM_RATE_LIMIT_BURST: &str = "IAM_RATE_LIMIT_BURST";
    pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const IAM_JSON_LOGS: &str = "IAM_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    // Connection URL
    if let Ok(url_str) = env::var(vars::HANA_URL) {
        let mut url = Url::parse(&url_str)
            .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", vars::HANA_URL, e)))?;

        if let Ok(user) = env::var(vars::HANA_USER) {
            url.set_username(&user)
                .map_err(|()| crate::Error::Config("Failed to set username in URL".into()))?;
        }
        if let Ok(password) = env::var(vars::HANA_PASSWORD) {
            url.set_password(Some(&password))
                .map_err(|()| crate::Error::Config("Failed to set password in URL".into()))?;
        }

        builder = builder.connection_url(url);
    }

    if let Ok(size_str) = env::var(vars::HANA_POOL_SIZE)
        && let Ok(size) = size_str.parse::<usize>()
        && let Some(nz) = NonZeroUsize::new(size)
    {
        builder = builder.pool_size(nz);
    }

    if let Ok(dir) = env::var(vars::IAM_REALMS_DIR) {
        builder = builder.realms_dir(dir);
    }

    // Tenancy
    if let Ok(mode) = env::var(vars::IAM_ISOLATION_MODE) {
        let mode: IsolationMode = mode.parse().map_err(|e| {
            crate::Error::Config(format!("Invalid {}: {e}", vars::IAM_ISOLATION_MODE))
        })?;
        builder = builder.isolation_mode(mode);
    }

    if let Ok(realm_id) = env::var(vars::IAM_DEFAULT_REALM_ID) {
        builder = builder.default_realm_id(realm_id);
    }

    // Rate limiting
    if let Ok(rpm_str) = env::var(vars::IAM_RATE_LIMIT_PER_MINUTE)
        && let Ok(rpm) = rpm_str.parse::<u32>()
    {
        builder = builder.rate_limit_per_minute(rpm);
    }

    if let Ok(burst_str) = env::var(vars::IAM_RATE_LIMIT_BURST)
        && let Ok(burst) = burst_str.parse::<u32>()
    {
        builder = builder.rate_limit_burst(burst);
    }

    // Telemetry
    if let Ok(endpoint) = env::var(vars::OTEL_EXPORTER_OTLP_ENDPOINT) {
        builder = builder.otlp_endpoint(Some(endpoint));
    }

    if let Ok(name) = env::var(vars::OTEL_SERVICE_NAME) {
        builder = builder.service_name(name);
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::IAM_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
