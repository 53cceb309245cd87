//! Telemetry module for the Exam Proctoring Agent
//!
//! Prometheus metrics for the detection and signaling pipelines:
//!
//! - `metrics` - counters and gauges for observations, violations, call
//!   transitions and terminations

pub mod metrics;

pub use metrics::{ProctorMetrics, ProctorMetricsRegistry};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
