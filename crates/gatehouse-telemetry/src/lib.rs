//! # Gatehouse Telemetry
//!
//! One-call `tracing` setup for hosts embedding the Gatehouse decision
//! engine: JSON or pretty output, `RUST_LOG` override, a switch for the
//! `audit::auth` target, and an optional Prometheus exporter for the
//! engine's `metrics` counters.
//!
//! ```rust,no_run
//! use gatehouse_telemetry::TelemetryConfig;
//!
//! # fn main() -> Result<(), gatehouse_telemetry::TelemetryError> {
//! let _guard = TelemetryConfig::builder()
//!     .service_name("edge-gateway")
//!     .json_logs(false)
//!     .build()
//!     .init()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `prometheus` - Prometheus scrape endpoint

#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod init;

pub use config::{AUDIT_TARGET, TelemetryConfig, TelemetryConfigBuilder};
pub use error::{TelemetryError, TelemetryResult};
pub use init::{TelemetryGuard, env_filter};
