//! Shared tracing/metrics bootstrap for the broker's binaries.
//!
//! Grounded on the server's shared observability crate: an `EnvFilter` +
//! `fmt` layer pair selectable between pretty and JSON, a Prometheus
//! recorder, and an optional OTLP span exporter layered on top when an
//! endpoint is configured.

use anyhow::{anyhow, Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace, Resource};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

type Registry = tracing_subscriber::Registry;
type OtlpLayer = OpenTelemetryLayer<Registry, opentelemetry_sdk::trace::Tracer>;

/// Supported log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(anyhow!("unsupported log format: {other}")),
        }
    }
}

/// Configuration driving tracing initialisation.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name: String,
    pub log_format: LogFormat,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "ri-gateway".into(),
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
            otlp_endpoint: None,
        }
    }
}

/// Shuts down the OTLP exporter (flushing any buffered spans) on drop.
pub struct TracingGuard {
    otlp_enabled: bool,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if self.otlp_enabled {
            global::shutdown_tracer_provider();
        }
    }
}

/// Install the global tracing subscriber for the process. Must be called
/// at most once; the returned guard should be held for the process lifetime.
pub fn init_tracing(config: &TracingConfig) -> Result<TracingGuard> {
    let env_filter =
        EnvFilter::try_new(config.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));

    let (otel_layer, otlp_enabled) = build_otlp_layer(config)?;

    let fmt_layer = match config.log_format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
    };

    let subscriber = Registry::default().with(env_filter).with(fmt_layer).with(otel_layer);
    subscriber
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(TracingGuard { otlp_enabled })
}

fn build_otlp_layer(config: &TracingConfig) -> Result<(Option<OtlpLayer>, bool)> {
    let Some(endpoint) = &config.otlp_endpoint else {
        return Ok((None, false));
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::new(vec![KeyValue::new("service.name", config.service_name.clone())]);
    let provider = trace::TracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);

    let layer = tracing_opentelemetry::layer().with_tracer(tracer);
    Ok((Some(layer), true))
}

/// Prometheus exporter wrapper; `render()` backs the `/metrics` route.
#[derive(Clone)]
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    pub fn install_with_defaults() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus recorder")?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialise tracing and metrics together; the common path for a binary's
/// `main`.
pub fn init(tracing: &TracingConfig) -> Result<(TracingGuard, MetricsExporter)> {
    let guard = init_tracing(tracing)?;
    let exporter = MetricsExporter::install_with_defaults()?;
    Ok((guard, exporter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn log_format_rejects_unknown_value() {
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn default_tracing_config_has_no_otlp_endpoint() {
        let config = TracingConfig::default();
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.log_level, "info");
    }
}
