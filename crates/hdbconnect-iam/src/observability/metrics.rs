//! Prometheus metrics for hdbconnect-iam

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

const METRIC_UPTIME: &str = "hdbconnect_iam_uptime_seconds";
const METRIC_INFO: &str = "hdbconnect_iam_info";

// Authentication
const METRIC_AUTH_TOTAL: &str = "hdbconnect_iam_authentications_total";

// Rate limiting
const METRIC_RATE_LIMITED: &str = "hdbconnect_iam_rate_limited_total";

// Federation
const METRIC_DISCOVERY: &str = "hdbconnect_iam_oidc_discovery_total";

// Tenancy
const METRIC_TENANT_PROVISION_ERRORS: &str = "hdbconnect_iam_tenant_provisioning_errors_total";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Process uptime in seconds");
    describe_gauge!(METRIC_INFO, "Build information (always 1)");
    describe_counter!(
        METRIC_AUTH_TOTAL,
        "Authentication attempts by realm kind and outcome code"
    );
    describe_counter!(METRIC_RATE_LIMITED, "Requests rejected by the rate limiter");
    describe_counter!(
        METRIC_DISCOVERY,
        "OIDC discovery lookups by outcome (cache_hit, fetched, error)"
    );
    describe_counter!(
        METRIC_TENANT_PROVISION_ERRORS,
        "Tenant registrations that failed to provision a schema"
    );

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record an authentication attempt.
pub fn record_auth_outcome(realm_kind: &str, code: &str) {
    counter!(
        METRIC_AUTH_TOTAL,
        "realm_kind" => realm_kind.to_owned(),
        "code" => code.to_owned(),
    )
    .increment(1);
}

/// Record a request rejected by the rate limiter.
pub fn record_rate_limited() {
    counter!(METRIC_RATE_LIMITED).increment(1);
}

/// Record an OIDC discovery lookup.
pub fn record_discovery(outcome: &str) {
    counter!(METRIC_DISCOVERY, "outcome" => outcome.to_owned()).increment(1);
}

/// Record a failed tenant schema provisioning.
pub fn record_tenant_provisioning_failure() {
    counter!(METRIC_TENANT_PROVISION_ERRORS).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics_without_init() {
        let output = render_metrics();
        assert!(output.is_empty());
    }

    #[test]
    fn test_record_without_recorder_is_harmless() {
        record_auth_outcome("file", "none");
        record_rate_limited();
        record_discovery("cache_hit");
        record_tenant_provisioning_failure();
    }
}
