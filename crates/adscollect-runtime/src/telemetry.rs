//! Tracing pipeline initialisation for the collector.
//!
//! Call [`init_tracing`] once at process startup and hold the returned
//! [`TelemetryGuard`] until the connections are closed.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ADSCOLLECT_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP endpoint for per-tick spans. Blank or unset disables export. |
//! | `OTEL_SERVICE_NAME` | Overrides the reported service name. |

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Parse the value of `ADSCOLLECT_LOG_FORMAT`.  Anything but `json`
    /// selects [`LogFormat::Compact`].
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        Self::parse(std::env::var("ADSCOLLECT_LOG_FORMAT").ok().as_deref())
    }
}

/// Where spans go when OTLP export is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpSettings {
    pub endpoint: String,
    /// Reported as `service.name`; `OTEL_SERVICE_NAME` wins over the
    /// binary's own name.
    pub service_name: String,
}

impl OtlpSettings {
    /// Resolve export settings through `lookup`.  A missing or blank
    /// endpoint disables export.
    pub fn resolve(
        default_service: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())?;
        let service_name = lookup("OTEL_SERVICE_NAME")
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_service.to_string());
        Some(Self {
            endpoint,
            service_name,
        })
    }
}

/// Install the global `tracing` subscriber for the collector.
///
/// Cycle and variable records always reach the console.  Spans from
/// `PollingCycle::tick` are also exported when [`OtlpSettings`] resolve.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();
    let provider = OtlpSettings::resolve(service_name, |k| std::env::var(k).ok()).and_then(
        |settings| match span_provider(&settings) {
            Ok(p) => Some(p),
            Err(e) => {
                eprintln!("[adscollect] span export to {} disabled: {e}", settings.endpoint);
                None
            }
        },
    );

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("adscollect-runtime")));
    let json_layer = (format == LogFormat::Json).then(|| fmt::layer().json());
    let compact_layer = (format == LogFormat::Compact).then(|| fmt::layer().compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .init();

    TelemetryGuard { provider }
}

/// Keeps span export alive; flushes the last cycle's spans when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// `true` when spans are being exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            // The subscriber may already be gone at this point.
            eprintln!("[adscollect] failed to flush collector spans: {e}");
        }
    }
}

/// OTLP/HTTP provider tagged with the collector's service identity.
fn span_provider(settings: &OtlpSettings) -> Result<SdkTracerProvider, String> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(settings.endpoint.clone())
        .build()
        .map_err(|e| e.to_string())?;

    let resource = Resource::builder()
        .with_service_name(settings.service_name.clone())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    // Spans are exported synchronously, one per finished tick.
    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_simple_exporter(exporter)
        .build())
}
