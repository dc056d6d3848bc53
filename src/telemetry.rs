//! Telemetry and structured logging for the export service.

use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::job::{ExportJob, JobStatus};

const TRACER_NAME: &str = "cv-export";

/// Render time above which a finished job is logged as slow.
const SLOW_JOB_THRESHOLD_MS: i64 = 5000;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` controls filtering (default `info`); `LOG_FORMAT=json` switches
/// to one JSON object per line.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Records telemetry for a completed or failed job.
///
/// Emits a structured log line and an OpenTelemetry span carrying the job
/// id, final status, duration and, for failures, the error classification.
pub fn record_job_telemetry(job: &ExportJob) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("cv_export_job");

    span.set_attribute(KeyValue::new("job_id", job.id.to_string()));
    span.set_attribute(KeyValue::new("status", job.status.to_string()));

    if let Some(duration_ms) = job.processing_duration_ms() {
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));

        info!(
            job_id = %job.id,
            duration_ms = duration_ms,
            status = %job.status,
            "CV export job finished"
        );

        if duration_ms > SLOW_JOB_THRESHOLD_MS {
            warn!(
                job_id = %job.id,
                duration_ms = duration_ms,
                "CV export exceeded performance threshold ({}ms)",
                SLOW_JOB_THRESHOLD_MS
            );
        }
    }

    if job.status == JobStatus::Failed {
        if let Some(ref error) = job.error {
            span.set_attribute(KeyValue::new("error", error.clone()));
            let kind = job
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            span.set_attribute(KeyValue::new("error_kind", kind.clone()));
            warn!(
                job_id = %job.id,
                error = %error,
                error_kind = %kind,
                "CV export job failed"
            );
        }
    }

    span.end();
}

/// Records a store sweep that removed `removed` expired jobs.
pub fn record_sweep(removed: usize) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("job_store_sweep");
    span.set_attribute(KeyValue::new("removed", removed as i64));
    span.end();
}

/// Initializes OpenTelemetry with OTLP exporter.
///
/// This should be called once at startup. Reads configuration
/// from environment variables:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: cv-export)
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name = std::env::var("OTEL_SERVICE_NAME")
        .unwrap_or_else(|_| TRACER_NAME.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

/// Flushes pending spans. Call once on shutdown.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
