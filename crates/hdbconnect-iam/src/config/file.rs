//! TOML configuration file loading

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::federation::FederatedProvider;
use crate::tenant::IsolationMode;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./hdbconnect-iam.toml",
    "~/.config/hdbconnect-iam/config.toml",
    "/etc/hdbconnect-iam/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(conn) = config.connection {
        if let Some(url_str) = conn.url {
            let url = Url::parse(&url_str)
                .map_err(|e| crate::Error::Config(format!("Invalid connection URL: {e}")))?;
            builder = builder.connection_url(url);
        }

        if let Some(size) = conn.pool_size
            && let Some(nz) = NonZeroUsize::new(size)
        {
            builder = builder.pool_size(nz);
        }
    }

    if let Some(dir) = config.realms.and_then(|r| r.dir) {
        builder = builder.realms_dir(dir);
    }

    if let Some(tenancy) = config.tenancy {
        if let Some(mode) = tenancy.isolation_mode {
            let mode: IsolationMode = mode.parse().map_err(crate::Error::Config)?;
            builder = builder.isolation_mode(mode);
        }

        if let Some(realm_id) = tenancy.default_realm_id {
            builder = builder.default_realm_id(realm_id);
        }

        if tenancy.shared_schema.is_some() {
            builder = builder.shared_schema(tenancy.shared_schema);
        }
    }

    if let Some(federation) = config.federation {
        if let Some(secs) = federation.discovery_ttl_secs {
            builder = builder.discovery_ttl(Duration::from_secs(secs));
        }

        if let Some(secs) = federation.http_timeout_secs {
            builder = builder.http_timeout(Duration::from_secs(secs));
        }

        for provider in federation.providers {
            builder = builder.provider(provider);
        }
    }

    if let Some(limits) = config.rate_limit {
        if let Some(rpm) = limits.requests_per_minute {
            builder = builder.rate_limit_per_minute(rpm);
        }

        if let Some(burst) = limits.burst {
            builder = builder.rate_limit_burst(burst);
        }

        if let Some(secs) = limits.sweep_interval_secs {
            builder = builder.rate_limit_sweep_interval(Duration::from_secs(secs));
        }

        if let Some(secs) = limits.stale_after_secs {
            builder = builder.rate_limit_stale_after(Duration::from_secs(secs));
        }
    }

    if let Some(obs) = config.observability {
        if let Some(endpoint) = obs.otlp_endpoint {
            builder = builder.otlp_endpoint(Some(endpoint));
        }

        if let Some(name) = obs.service_name {
            builder = builder.service_name(name);
        }

        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    connection: Option<ConnectionConfig>,
    realms: Option<RealmsFileConfig>,
    tenancy: Option<TenancyFileConfig>,
    federation: Option<FederationFileConfig>,
    rate_limit: Option<RateLimitFileConfig>,
    observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Deserialize)]
struct ConnectionConfig {
    url: Option<String>,
    pool_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RealmsFileConfig {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct TenancyFileConfig {
    isolation_mode: Option<String>,
    default_realm_id: Option<String>,
    shared_schema: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FederationFileConfig {
    discovery_ttl_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
    #[serde(default)]
    providers: Vec<FederatedProvider>,
}

#[derive(Debug, Deserialize)]
struct RateLimitFileConfig {
    requests_per_minute: Option<u32>,
    burst: Option<u32>,
    sweep_interval_secs: Option<u64>,
    stale_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    otlp_endpoint: Option<String>,
    service_name: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}
