//! Telemetry configuration
//!
//! Deserializable so hosts can embed it in their own config files under a
//! `[telemetry]` table.

use serde::Deserialize;

/// Target the decision engine writes audit events to
pub const AUDIT_TARGET: &str = "audit::auth";

/// Telemetry configuration
///
/// # Example
///
/// ```rust
/// use gatehouse_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::builder()
///     .service_name("edge-gateway")
///     .log_level("info,gatehouse_auth=debug")
///     .audit(false)
///     .build();
/// assert!(config.filter_directives().ends_with("audit::auth=off"));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name reported at startup
    pub service_name: String,
    /// Service version reported at startup
    pub service_version: String,
    /// Log level filter (e.g. "info", "info,gatehouse_auth=debug")
    pub log_level: String,
    /// Emit one JSON object per line instead of pretty text
    pub json_logs: bool,
    /// Write logs to stderr instead of stdout
    pub stderr_output: bool,
    /// Keep audit events; `false` silences the audit target entirely
    pub audit: bool,
    /// Prometheus scrape port; no exporter when unset
    #[cfg(feature = "prometheus")]
    pub prometheus_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "gatehouse".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            json_logs: true,
            stderr_output: true,
            audit: true,
            #[cfg(feature = "prometheus")]
            prometheus_port: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Filter directives handed to `EnvFilter` when `RUST_LOG` is unset
    pub fn filter_directives(&self) -> String {
        if self.audit {
            self.log_level.clone()
        } else {
            format!("{},{AUDIT_TARGET}=off", self.log_level)
        }
    }

    /// Initialize telemetry with this configuration
    ///
    /// # Errors
    ///
    /// See [`TelemetryGuard::init`](crate::TelemetryGuard::init).
    pub fn init(self) -> Result<crate::TelemetryGuard, crate::TelemetryError> {
        crate::TelemetryGuard::init(self)
    }
}

/// Builder for [`TelemetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfigBuilder {
    inner: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.inner.service_name = name.into();
        self
    }

    /// Set the service version
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.inner.service_version = version.into();
        self
    }

    /// Set the log level filter
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.inner.log_level = level.into();
        self
    }

    /// Enable or disable JSON log output
    #[must_use]
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.inner.json_logs = enabled;
        self
    }

    /// Enable or disable stderr output
    #[must_use]
    pub fn stderr_output(mut self, enabled: bool) -> Self {
        self.inner.stderr_output = enabled;
        self
    }

    /// Keep or silence audit events
    #[must_use]
    pub fn audit(mut self, enabled: bool) -> Self {
        self.inner.audit = enabled;
        self
    }

    /// Serve Prometheus metrics on this port
    #[cfg(feature = "prometheus")]
    #[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
    #[must_use]
    pub fn prometheus_port(mut self, port: u16) -> Self {
        self.inner.prometheus_port = Some(port);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.inner
    }
}
