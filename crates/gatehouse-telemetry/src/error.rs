//! Telemetry error types

use thiserror::Error;

/// Errors that can occur while installing telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log filter did not parse
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// A global subscriber was already installed
    #[error("Tracing subscriber error: {0}")]
    TracingError(String),

    /// The Prometheus exporter could not start
    #[cfg(feature = "prometheus")]
    #[error("Metrics error: {0}")]
    MetricsError(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
