//! Session event and status surfaces consumed by the presentation layer.
//!
//! Events are broadcast as they happen; status is a snapshot published after
//! every mutation so late subscribers can render the current state without
//! replaying the event stream.

use serde::{Deserialize, Serialize};

use super::{CallState, EndpointId, Role, ViolationRecord};

/// Why a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// The termination policy crossed the warning limit.
    MalpracticeDetected,
    /// An operator ended the call explicitly.
    UserEnded,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::MalpracticeDetected => "malpractice-detected",
            TerminationReason::UserEnded => "user-ended",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event emitted by the session controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// A record was appended to the violation ledger.
    LogAppended { record: ViolationRecord },
    /// One of the face counters changed.
    CountsChanged { no_face: u32, multi_face: u32 },
    /// The call machine transitioned.
    CallStateChanged { state: CallState },
    /// The session reached its terminal state. Emitted exactly once.
    SessionTerminated {
        reason: TerminationReason,
        total_violations: u32,
    },
}

/// Point-in-time snapshot of one exam session, published through a watch
/// channel after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub role: Role,
    /// Transport-assigned identity, available once registration completes.
    pub endpoint: Option<EndpointId>,
    pub call_state: CallState,
    pub no_face_count: u32,
    pub multi_face_count: u32,
    pub loudness_count: u32,
    pub warning_total: u32,
    pub terminated: bool,
    /// Whether the visual alert (red border) is currently raised.
    pub alert_active: bool,
}

impl SessionStatus {
    /// Initial snapshot for a freshly started session.
    pub fn initial(role: Role) -> Self {
        Self {
            role,
            endpoint: None,
            call_state: CallState::Idle,
            no_face_count: 0,
            multi_face_count: 0,
            loudness_count: 0,
            warning_total: 0,
            terminated: false,
            alert_active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let status = SessionStatus::initial(Role::Candidate);
        assert_eq!(status.call_state, CallState::Idle);
        assert_eq!(status.warning_total, 0);
        assert!(!status.terminated);
        assert!(!status.alert_active);
        assert!(status.endpoint.is_none());
    }

    #[test]
    fn test_termination_reason_wire_format() {
        let json = serde_json::to_string(&TerminationReason::MalpracticeDetected).unwrap();
        assert_eq!(json, "\"malpractice-detected\"");
        assert_eq!(TerminationReason::UserEnded.to_string(), "user-ended");
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = SessionEvent::SessionTerminated {
            reason: TerminationReason::MalpracticeDetected,
            total_violations: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session-terminated");
        assert_eq!(json["total_violations"], 10);
    }
}
