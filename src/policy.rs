//! Termination Policy
//!
//! Counts ledger warnings under a configurable inclusion rule and decides,
//! exactly once, that the session must end. The policy is the sole writer of
//! the terminal outcome; signaling failures never route through it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contracts::{RecordKind, ViolationRecord};

/// Which ledger records count toward the warning limit.
///
/// The observed deployments disagreed on the inclusion rule, so it is a
/// configuration knob rather than a constant. The default counts every
/// debounced warning-severity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum CountingRule {
    /// Count every warning-severity record.
    AllWarnings,
    /// Count only warnings of the listed kinds.
    Kinds { kinds: Vec<RecordKind> },
    /// Never terminate, whatever accumulates.
    Never,
}

impl Default for CountingRule {
    fn default() -> Self {
        CountingRule::AllWarnings
    }
}

impl CountingRule {
    fn counts(&self, record: &ViolationRecord) -> bool {
        if !record.severity.is_warning() {
            return false;
        }
        match self {
            CountingRule::AllWarnings => true,
            CountingRule::Kinds { kinds } => kinds.contains(&record.kind),
            CountingRule::Never => false,
        }
    }
}

/// Decides when accumulated warnings end the session.
///
/// Fires at most once: the first record that brings the counted total to the
/// warning limit returns `true`; every later call returns `false`.
pub struct TerminationPolicy {
    warning_limit: u32,
    rule: CountingRule,
    counted: u32,
    fired: bool,
}

impl TerminationPolicy {
    pub fn new(warning_limit: u32, rule: CountingRule) -> Self {
        Self {
            warning_limit,
            rule,
            counted: 0,
            fired: false,
        }
    }

    /// Number of records counted so far under the inclusion rule.
    pub fn counted(&self) -> u32 {
        self.counted
    }

    /// Whether the policy has already fired.
    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Feed one appended record. Returns `true` exactly once, on the record
    /// that crosses the limit.
    pub fn observe(&mut self, record: &ViolationRecord) -> bool {
        if !self.rule.counts(record) {
            return false;
        }
        self.counted += 1;
        if self.fired {
            return false;
        }
        if self.counted >= self.warning_limit {
            self.fired = true;
            warn!(
                counted = self.counted,
                limit = self.warning_limit,
                "warning limit reached, terminating session"
            );
            return true;
        }
        false
    }
}
