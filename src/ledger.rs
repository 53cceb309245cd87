//! Violation Ledger
//!
//! Converts typed observations into an append-only sequence of
//! [`ViolationRecord`]s under a per-kind debounce/threshold policy, and
//! maintains the running counters the termination policy reads.
//!
//! # Policy
//!
//! - `FaceCount == 0` → `no-face` warning; `> 1` → `multi-face` warning;
//!   `== 1` → no record, and the visual alert flag is cleared.
//! - `Loudness > noise_threshold` → `loud-noise` warning, debounced: a new
//!   record is suppressed while the previous one is younger than
//!   `debounce_ms`.
//! - `Focus` transition to hidden → `tab-switch` warning; back to visible →
//!   no record.
//!
//! `append` is a pure function of the observation plus the ledger's debounce
//! state: identical timestamps and thresholds always produce identical
//! results. Record insertion and counter updates happen in one call on the
//! session's single event loop, so a concurrent reader can never observe
//! them out of sync.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::MonitoringConfig;
use crate::contracts::{
    FocusState, Observation, ObservedValue, RecordKind, Severity, ViolationRecord,
};

/// Running counters for one session's ledger.
///
/// `terminated` transitions false→true exactly once and is never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub no_face_count: u32,
    pub multi_face_count: u32,
    pub loudness_count: u32,
    /// Number of warning-severity records that passed the debounce filter.
    pub warning_total: u32,
    pub terminated: bool,
}

/// Append-only violation log with per-kind debounce state.
pub struct ViolationLedger {
    noise_threshold: f64,
    debounce_ms: i64,
    records: Vec<ViolationRecord>,
    state: LedgerState,
    /// Timestamp of the last loud-noise record, for debounce.
    last_loud_at: Option<DateTime<Utc>>,
    /// Last focus value seen, so only genuine hidden transitions record.
    last_focus: FocusState,
    alert_active: bool,
}

impl ViolationLedger {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            noise_threshold: config.noise_threshold,
            debounce_ms: config.debounce_ms as i64,
            records: Vec::new(),
            state: LedgerState::default(),
            last_loud_at: None,
            last_focus: FocusState::Visible,
            alert_active: false,
        }
    }

    /// Current counter snapshot.
    pub fn state(&self) -> LedgerState {
        self.state
    }

    /// All records in creation order (which is also display order).
    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }

    /// Whether the visual alert (red border) is currently raised.
    pub fn alert_active(&self) -> bool {
        self.alert_active
    }

    /// Mark the session terminated. Idempotent; returns true on the one
    /// false→true transition. After this, `append` discards everything.
    pub fn mark_terminated(&mut self) -> bool {
        if self.state.terminated {
            return false;
        }
        self.state.terminated = true;
        true
    }

    /// Apply policy to one observation. Returns the record appended, if the
    /// observation crossed a policy and survived debounce.
    pub fn append(&mut self, observation: &Observation) -> Option<ViolationRecord> {
        if self.state.terminated {
            debug!(kind = observation.kind().as_str(), "observation discarded after termination");
            return None;
        }

        match observation.value {
            ObservedValue::FaceCount(n) => self.apply_face_policy(n, observation.at),
            ObservedValue::Loudness(v) => self.apply_loudness_policy(v, observation.at),
            ObservedValue::Focus(state) => self.apply_focus_policy(state, observation.at),
        }
    }

    fn apply_face_policy(&mut self, faces: usize, at: DateTime<Utc>) -> Option<ViolationRecord> {
        match faces {
            0 => {
                self.state.no_face_count += 1;
                self.alert_active = true;
                Some(self.push_warning(RecordKind::NoFace, "No face detected", at))
            }
            1 => {
                // Recovery: a single visible face clears the alert.
                self.alert_active = false;
                None
            }
            _ => {
                self.state.multi_face_count += 1;
                self.alert_active = true;
                Some(self.push_warning(RecordKind::MultiFace, "Multiple faces detected", at))
            }
        }
    }

    fn apply_loudness_policy(&mut self, level: f64, at: DateTime<Utc>) -> Option<ViolationRecord> {
        if level <= self.noise_threshold {
            return None;
        }
        if let Some(last) = self.last_loud_at {
            if (at - last).num_milliseconds() < self.debounce_ms {
                debug!(level, "loud noise within debounce window, suppressed");
                return None;
            }
        }
        self.last_loud_at = Some(at);
        self.state.loudness_count += 1;
        self.alert_active = true;
        Some(self.push_warning(RecordKind::LoudNoise, "Loud noise detected", at))
    }

    fn apply_focus_policy(&mut self, focus: FocusState, at: DateTime<Utc>) -> Option<ViolationRecord> {
        let previous = self.last_focus;
        self.last_focus = focus;
        if focus == FocusState::Hidden && previous != FocusState::Hidden {
            Some(self.push_warning(RecordKind::TabSwitch, "Exam tab lost focus", at))
        } else {
            None
        }
    }

    fn push_warning(
        &mut self,
        kind: RecordKind,
        message: &'static str,
        at: DateTime<Utc>,
    ) -> ViolationRecord {
        let record = ViolationRecord::warning(kind, message, at);
        self.state.warning_total += 1;
        self.records.push(record.clone());
        record
    }

    /// Record a transient detector fault. Error severity; never counts
    /// toward the warning total.
    pub fn note_fault(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Option<ViolationRecord> {
        if self.state.terminated {
            return None;
        }
        let record = ViolationRecord::error(RecordKind::SensorFault, message, at);
        self.records.push(record.clone());
        Some(record)
    }

    /// Record a lifecycle entry with the given severity (Info or Success).
    pub fn note_lifecycle(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> ViolationRecord {
        let record = ViolationRecord::new(RecordKind::Lifecycle, severity, message, at);
        self.records.push(record.clone());
        record
    }
}
