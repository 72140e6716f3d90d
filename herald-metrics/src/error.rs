//! Error types for metrics operations

use thiserror::Error;

/// Errors that can occur during metrics operations
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metrics system has already been initialized
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    /// OpenTelemetry SDK or exporter error
    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),
}
