//! Logging, tracing and metrics
//!
//! Logs go to stderr so that CLI output on stdout stays machine-readable.
//! With the `metrics` feature disabled the `record_*` helpers compile to
//! no-ops.

#[cfg(feature = "metrics")]
mod metrics;

#[cfg(feature = "telemetry")]
mod telemetry;

#[cfg(feature = "metrics")]
pub use metrics::{
    init_metrics, record_auth_outcome, record_discovery, record_rate_limited,
    record_tenant_provisioning_failure, render_metrics,
};
#[cfg(not(feature = "metrics"))]
pub use noop::{
    record_auth_outcome, record_discovery, record_rate_limited, record_tenant_provisioning_failure,
};
#[cfg(feature = "telemetry")]
pub use telemetry::init_telemetry;

use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use crate::Result;
use crate::config::TelemetryConfig;

/// Initialize the observability stack
pub fn init_observability(config: &TelemetryConfig) -> Result<()> {
    #[cfg(feature = "metrics")]
    {
        init_metrics()?;
    }

    #[cfg(feature = "telemetry")]
    {
        init_telemetry(config)?;
    }

    #[cfg(not(feature = "telemetry"))]
    {
        init_basic_logging(config)?;
    }

    Ok(())
}

/// Initialize logging without OpenTelemetry
#[cfg(not(feature = "telemetry"))]
fn init_basic_logging(config: &TelemetryConfig) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer(config))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Failed to install subscriber: {e}")))
}

/// `RUST_LOG` if set, else the configured level
fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn fmt_layer<S>(config: &TelemetryConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    }
}

/// Shutdown observability stack
#[allow(clippy::missing_const_for_fn)]
pub fn shutdown_observability() {
    #[cfg(feature = "telemetry")]
    {
        telemetry::shutdown_telemetry();
    }
}

#[cfg(not(feature = "metrics"))]
mod noop {
    #[inline]
    pub const fn record_auth_outcome(_realm_kind: &str, _code: &str) {}

    #[inline]
    pub const fn record_rate_limited() {}

    #[inline]
    pub const fn record_discovery(_outcome: &str) {}

    #[inline]
    pub const fn record_tenant_provisioning_failure() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_falls_back_to_config() {
        let config = TelemetryConfig {
            log_level: "debug".to_string(),
            ..TelemetryConfig::default()
        };
        let filter = env_filter(&config);
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(filter.to_string(), "debug");
        }
    }

    #[test]
    fn test_record_helpers_callable() {
        record_auth_outcome("file", "password_mismatch");
        record_discovery("fetched");
        record_rate_limited();
        record_tenant_provisioning_failure();
    }

    #[test]
    fn test_shutdown_observability_no_panic() {
        shutdown_observability();
    }
}
