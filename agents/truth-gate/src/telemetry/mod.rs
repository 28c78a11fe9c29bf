//! Telemetry for the Truth Gate
//!
//! Prometheus metrics for gate runs. Structured logs go through `tracing`
//! and never include input text.

pub mod metrics;

pub use metrics::{GateMetrics, GateMetricsRegistry, RunTimer};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
