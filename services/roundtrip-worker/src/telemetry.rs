//! OpenTelemetry and logging setup for the worker
//!
//! Call spans produced by `TracingSpanRecorder` are bridged to an OTLP
//! exporter through `tracing-opentelemetry`. Logs go to stdout through a
//! `fmt` layer filtered by `RUST_LOG`.

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self, RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Service name attached to every exported span
    pub service_name: String,

    /// OTLP gRPC collector endpoint (e.g., "http://jaeger:4317")
    pub otlp_endpoint: String,

    /// Enable span export; logging is always on
    pub enabled: bool,

    /// Sampling ratio (0.0 to 1.0)
    pub sampling_ratio: f64,

    /// Export timeout in seconds
    pub export_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "roundtrip-worker".to_string(),
            otlp_endpoint: "http://jaeger:4317".to_string(),
            enabled: true,
            sampling_ratio: 1.0,
            export_timeout_secs: 10,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("ROUNDTRIP_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: lookup("ROUNDTRIP_OTLP_ENDPOINT").unwrap_or(defaults.otlp_endpoint),
            enabled: lookup("ROUNDTRIP_TELEMETRY_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.enabled),
            sampling_ratio: lookup("ROUNDTRIP_SAMPLING_RATIO")
                .and_then(|v| v.parse::<f64>().ok())
                .map(|ratio| ratio.clamp(0.0, 1.0))
                .unwrap_or(defaults.sampling_ratio),
            export_timeout_secs: lookup("ROUNDTRIP_EXPORT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.export_timeout_secs),
        }
    }
}

/// Initialize the OTLP exporter and the global tracing subscriber.
///
/// Returns a guard that flushes pending spans when dropped. When telemetry
/// is disabled only logging is installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    if !config.enabled {
        init_logging_only();
        tracing::info!("OpenTelemetry is disabled (ROUNDTRIP_TELEMETRY_ENABLED=false)");
        return Ok(TelemetryGuard { exporting: false });
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(Duration::from_secs(config.export_timeout_secs));

    // Installs the batch provider globally
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", config.service_name.clone()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer())
        .with(telemetry_layer)
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        endpoint = %config.otlp_endpoint,
        "OpenTelemetry initialized"
    );

    Ok(TelemetryGuard { exporting: true })
}

/// Install logging without span export.
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging_only() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer())
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer<S>() -> tracing_subscriber::fmt::Layer<S> {
    tracing_subscriber::fmt::layer().with_target(false)
}

/// Flushes pending spans and shuts down the global provider on drop.
pub struct TelemetryGuard {
    exporting: bool,
}

impl TelemetryGuard {
    /// Guard for a process that never enabled span export.
    pub fn disabled() -> Self {
        Self { exporting: false }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exporting {
            tracing::info!("Shutting down OpenTelemetry");
            global::shutdown_tracer_provider();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.service_name, "roundtrip-worker");
        assert_eq!(config.otlp_endpoint, "http://jaeger:4317");
        assert!(config.enabled);
    }

    #[test]
    fn test_config_from_env() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("ROUNDTRIP_SERVICE_NAME", "test-service"),
            ("ROUNDTRIP_OTLP_ENDPOINT", "http://collector:4317"),
            ("ROUNDTRIP_TELEMETRY_ENABLED", "1"),
            ("ROUNDTRIP_SAMPLING_RATIO", "0.5"),
        ]));

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert!(config.enabled);
        assert_eq!(config.sampling_ratio, 0.5);
    }

    #[test]
    fn test_disabled_and_bad_values() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("ROUNDTRIP_TELEMETRY_ENABLED", "false"),
            ("ROUNDTRIP_SAMPLING_RATIO", "7"),
            ("ROUNDTRIP_EXPORT_TIMEOUT_SECS", "soon"),
        ]));

        assert!(!config.enabled);
        assert_eq!(config.sampling_ratio, 1.0);
        assert_eq!(config.export_timeout_secs, 10);
    }

    #[test]
    fn test_disabled_guard_is_inert() {
        let guard = TelemetryGuard::disabled();
        drop(guard);
    }
}
