//! Logging and span export for the chassis daemon.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive
//! until exit.
//!
//! # Settings
//!
//! | Source | Effect |
//! |---|---|
//! | [`TelemetryConfig::log_filter`] / `RUST_LOG` | Log filter; `RUST_LOG` wins when set. |
//! | [`TelemetryConfig::json_logs`] / `CHASSISD_LOG_FORMAT=json` | Newline-delimited JSON logs. |
//! | [`TelemetryConfig::otlp_endpoint`] / `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector URL; spans are exported when set. |
//!
//! # Example
//!
//! ```rust,no_run
//! use chassis_runtime::telemetry::{init_tracing, TelemetryConfig};
//!
//! let _guard = init_tracing("chassisd", &TelemetryConfig::default());
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "CHASSISD_LOG_FORMAT";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// `[telemetry]` section of the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// OTLP collector base URL, e.g. `http://localhost:4318`.
    pub otlp_endpoint: Option<String>,
    pub json_logs: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            json_logs: false,
            log_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Collector URL: the configured one, else the standard OTel env var.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.otlp_endpoint
            .clone()
            .or_else(|| std::env::var(OTLP_ENDPOINT_ENV).ok())
            .filter(|e| !e.trim().is_empty())
    }

    pub fn wants_json(&self) -> bool {
        self.json_logs || std::env::var(LOG_FORMAT_ENV).as_deref() == Ok("json")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global subscriber.
///
/// Spans from `#[instrument]` (synchronizer passes, change scans, ticks) go
/// to the collector when an endpoint is configured; otherwise only console
/// output is produced.  A second call leaves the first subscriber in place.
pub fn init_tracing(service_name: &str, config: &TelemetryConfig) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let use_json = config.wants_json();
    let provider = build_provider(service_name, config.resolved_endpoint().as_deref());

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("chassisd")));
    let registry = tracing_subscriber::registry().with(env_filter).with(otel_layer);

    let installed = if use_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    };
    if let Err(e) = installed {
        eprintln!("[chassisd] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the span exporter down on drop, flushing what is still buffered.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[chassisd] span exporter shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_provider(service_name: &str, endpoint: Option<&str>) -> Option<SdkTracerProvider> {
    let endpoint = endpoint?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[chassisd] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The daemon installs tracing before its Tokio runtime exists.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_means_no_exporter() {
        assert!(build_provider("chassisd-test", None).is_none());
    }

    #[test]
    fn configured_endpoint_takes_precedence() {
        let config = TelemetryConfig {
            otlp_endpoint: Some("http://collector:4318".into()),
            ..TelemetryConfig::default()
        };
        assert_eq!(
            config.resolved_endpoint().as_deref(),
            Some("http://collector:4318")
        );
    }

    #[test]
    fn blank_endpoint_is_ignored() {
        let config = TelemetryConfig {
            otlp_endpoint: Some("  ".into()),
            ..TelemetryConfig::default()
        };
        assert!(config.resolved_endpoint().is_none());
    }

    #[test]
    fn config_defaults_from_partial_toml_shape() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_logs": true}"#).unwrap();
        assert!(config.json_logs);
        assert_eq!(config.log_filter, "info");
        assert!(config.wants_json());
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
