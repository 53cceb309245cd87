//! Prometheus metrics for the Exam Proctoring Agent
//!
//! - `proctor_observations_total` (counter) - observations by detector kind
//! - `proctor_violations_total` (counter) - ledger records by kind, severity
//! - `proctor_sensor_faults_total` (counter) - skipped ticks by detector
//! - `proctor_warning_total` (gauge) - current warning count
//! - `proctor_call_transitions_total` (counter) - call transitions by target
//! - `proctor_sessions_terminated_total` (counter) - terminations by reason

use prometheus::{CounterVec, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use super::{Result, TelemetryError};
use crate::contracts::{CallState, ObservationKind, RecordKind, Severity, TerminationReason};

/// Proctoring metrics, registered against one Prometheus registry.
pub struct ProctorMetrics {
    observations_total: CounterVec,
    violations_total: CounterVec,
    sensor_faults_total: CounterVec,
    warning_total: Gauge,
    call_transitions_total: CounterVec,
    sessions_terminated_total: CounterVec,
}

impl ProctorMetrics {
    /// Create the metric families and register them with the registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let observations_total = CounterVec::new(
            Opts::new(
                "observations_total",
                "Total normalized sensor observations processed",
            )
            .namespace("proctor"),
            &["kind"],
        )?;

        let violations_total = CounterVec::new(
            Opts::new("violations_total", "Total ledger records appended")
                .namespace("proctor"),
            &["kind", "severity"],
        )?;

        let sensor_faults_total = CounterVec::new(
            Opts::new(
                "sensor_faults_total",
                "Detector ticks skipped due to oracle failure",
            )
            .namespace("proctor"),
            &["detector"],
        )?;

        let warning_total = Gauge::with_opts(
            Opts::new("warning_total", "Current session warning count").namespace("proctor"),
        )?;

        let call_transitions_total = CounterVec::new(
            Opts::new(
                "call_transitions_total",
                "Call signaling state transitions by target state",
            )
            .namespace("proctor"),
            &["state"],
        )?;

        let sessions_terminated_total = CounterVec::new(
            Opts::new(
                "sessions_terminated_total",
                "Sessions that reached the terminal state, by reason",
            )
            .namespace("proctor"),
            &["reason"],
        )?;

        registry.register(Box::new(observations_total.clone()))?;
        registry.register(Box::new(violations_total.clone()))?;
        registry.register(Box::new(sensor_faults_total.clone()))?;
        registry.register(Box::new(warning_total.clone()))?;
        registry.register(Box::new(call_transitions_total.clone()))?;
        registry.register(Box::new(sessions_terminated_total.clone()))?;

        Ok(Self {
            observations_total,
            violations_total,
            sensor_faults_total,
            warning_total,
            call_transitions_total,
            sessions_terminated_total,
        })
    }

    /// Record one processed observation.
    pub fn record_observation(&self, kind: ObservationKind) {
        self.observations_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record one appended ledger record.
    pub fn record_violation(&self, kind: RecordKind, severity: Severity) {
        self.violations_total
            .with_label_values(&[kind.as_str(), severity.as_str()])
            .inc();
    }

    /// Record a skipped detector tick.
    pub fn record_sensor_fault(&self, detector: ObservationKind) {
        self.sensor_faults_total
            .with_label_values(&[detector.as_str()])
            .inc();
    }

    /// Publish the current warning count.
    pub fn set_warning_total(&self, total: u32) {
        self.warning_total.set(total as f64);
    }

    /// Record a call-state transition.
    pub fn record_call_transition(&self, state: CallState) {
        self.call_transitions_total
            .with_label_values(&[state.as_str()])
            .inc();
    }

    /// Record a session termination.
    pub fn record_termination(&self, reason: TerminationReason) {
        self.sessions_terminated_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }
}

/// Registry wrapper owning the Prometheus registry plus the proctoring
/// metric families.
pub struct ProctorMetricsRegistry {
    registry: Arc<Registry>,
    metrics: Arc<ProctorMetrics>,
}

impl ProctorMetricsRegistry {
    /// Create a fresh registry with all proctoring metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(ProctorMetrics::new(registry.clone())?);
        Ok(Self { registry, metrics })
    }

    /// The proctoring metric families.
    pub fn metrics(&self) -> Arc<ProctorMetrics> {
        self.metrics.clone()
    }

    /// The underlying registry, for custom collectors.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Encode all gathered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| TelemetryError::EncodingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creates_all_families() {
        let registry = ProctorMetricsRegistry::new().unwrap();
        let metrics = registry.metrics();

        metrics.record_observation(ObservationKind::FaceCount);
        metrics.record_violation(RecordKind::NoFace, Severity::Warning);
        metrics.record_sensor_fault(ObservationKind::LoudnessLevel);
        metrics.set_warning_total(3);
        metrics.record_call_transition(CallState::Connected);
        metrics.record_termination(TerminationReason::MalpracticeDetected);

        let encoded = registry.encode().unwrap();
        assert!(encoded.contains("proctor_observations_total"));
        assert!(encoded.contains("proctor_violations_total"));
        assert!(encoded.contains("proctor_warning_total 3"));
        assert!(encoded.contains("malpractice-detected"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        assert!(ProctorMetrics::new(registry.clone()).is_ok());
        assert!(ProctorMetrics::new(registry).is_err());
    }
}
