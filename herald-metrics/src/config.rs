//! Metrics configuration

use serde::Deserialize;

/// Configuration for metrics collection and export
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable or disable metrics collection
    ///
    /// When disabled, recording sites find no global instance and skip.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OTLP/HTTP endpoint of the OpenTelemetry Collector
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// How often to push metrics (in seconds)
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

const fn default_enabled() -> bool {
    false
}

const fn default_export_interval() -> u64 {
    60
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            export_interval_secs: default_export_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: MetricsConfig = ron::from_str("(enabled: true)").expect("valid config");
        assert!(config.enabled);
        assert_eq!(config.endpoint, "http://localhost:4318/v1/metrics");
        assert_eq!(config.export_interval_secs, 60);
    }
}
