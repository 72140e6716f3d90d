//! OpenTelemetry metrics for herald
//!
//! Metrics are pushed via OTLP to an OpenTelemetry Collector, which can
//! expose them for Prometheus to scrape.
//!
//! - **Delivery Metrics**: sweeps, dispatch outcomes, sweep durations
//! - **Notify Metrics**: persisted records, push outcomes, fan-out sizes
//!
//! ```text
//! herald → OTLP/HTTP → OpenTelemetry Collector → Prometheus (scrape) → Grafana
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use herald_metrics::{init_metrics, MetricsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MetricsConfig {
//!     enabled: true,
//!     ..MetricsConfig::default()
//! };
//!
//! init_metrics(&config)?;
//!
//! if let Some(metrics) = herald_metrics::metrics() {
//!     metrics.delivery.record_sent();
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod delivery;
mod error;
mod exporter;
mod notify;

use std::time::Duration;

pub use config::MetricsConfig;
pub use delivery::DeliveryMetrics;
pub use error::MetricsError;
pub use notify::NotifyMetrics;
use once_cell::sync::OnceCell;

/// Global metrics instance
static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub delivery: DeliveryMetrics,
    pub notify: NotifyMetrics,
}

/// Initialize the metrics system
///
/// Must be called once at startup before any metrics are recorded. If
/// metrics are disabled in the config, this is a no-op and [`metrics`]
/// keeps returning `None`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or if called twice.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(
        endpoint = %config.endpoint,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::init_otlp_exporter(
        &config.endpoint,
        Duration::from_secs(config.export_interval_secs),
    )?;
    opentelemetry::global::set_meter_provider(provider);

    let metrics = Metrics {
        delivery: DeliveryMetrics::new()?,
        notify: NotifyMetrics::new()?,
    };

    METRICS_INSTANCE
        .set(metrics)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// The global metrics instance, if metrics are enabled
#[must_use]
pub fn metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

/// Check if metrics are enabled
#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
