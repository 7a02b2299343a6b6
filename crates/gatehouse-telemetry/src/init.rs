//! Telemetry initialization
//!
//! Provides the [`TelemetryGuard`] for managing telemetry lifecycle.

use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{TelemetryConfig, TelemetryError, TelemetryResult};

/// Guard that owns the installed telemetry
///
/// Keep it alive in `main()` for as long as the host serves requests. Logs
/// a shutdown line when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    config: TelemetryConfig,
}

impl TelemetryGuard {
    /// Install the global subscriber and, if configured, the metrics exporter
    ///
    /// `RUST_LOG` takes precedence over the configured log level.
    ///
    /// # Errors
    ///
    /// Fails when the filter directives do not parse, when a global
    /// subscriber is already installed, or when the Prometheus exporter
    /// cannot bind its port.
    pub fn init(config: TelemetryConfig) -> TelemetryResult<Self> {
        init_subscriber(&config)?;

        #[cfg(feature = "prometheus")]
        if let Some(port) = config.prometheus_port {
            init_prometheus(port)?;
        }

        info!(
            service_name = %config.service_name,
            service_version = %config.service_version,
            json_logs = config.json_logs,
            audit = config.audit,
            "Gatehouse telemetry initialized"
        );

        Ok(Self { config })
    }

    /// Get the service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        info!(
            service_name = %self.config.service_name,
            "Shutting down Gatehouse telemetry"
        );
    }
}

/// Build the filter: `RUST_LOG` first, then the configured directives
pub fn env_filter(config: &TelemetryConfig) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))
        .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))
}

fn writer(config: &TelemetryConfig) -> BoxMakeWriter {
    if config.stderr_output {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    }
}

fn init_subscriber(config: &TelemetryConfig) -> TelemetryResult<()> {
    let env_filter = env_filter(config)?;

    // Exactly one of the two fmt layers is present
    let (json_layer, pretty_layer) = if config.json_logs {
        let layer = fmt::layer()
            .with_writer(writer(config))
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json();
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .with_writer(writer(config))
            .with_target(true)
            .with_thread_ids(false)
            .pretty();
        (None, Some(layer))
    };

    Registry::default()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::TracingError(e.to_string()))
}

#[cfg(feature = "prometheus")]
fn init_prometheus(port: u16) -> TelemetryResult<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::{Ipv4Addr, SocketAddr};

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .map_err(|e| TelemetryError::MetricsError(e.to_string()))?;

    info!(port, "Prometheus metrics endpoint started");
    Ok(())
}
