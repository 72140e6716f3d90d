//! OTLP metrics exporter

use std::time::Duration;

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use crate::MetricsError;

/// Build a meter provider that pushes to an OTLP/HTTP endpoint
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built.
pub fn init_otlp_exporter(
    endpoint: &str,
    export_interval: Duration,
) -> Result<SdkMeterProvider, MetricsError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| MetricsError::OpenTelemetry(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(export_interval)
        .build();

    Ok(SdkMeterProvider::builder().with_reader(reader).build())
}
