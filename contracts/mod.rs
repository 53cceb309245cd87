//! Exam Proctoring Agent Contract Definitions
//!
//! This module defines the contracts shared by the sampling scheduler, the
//! violation ledger, the call signaling state machine, and the presentation
//! layer: typed sensor observations, append-only violation records, and the
//! session-level event and status surfaces.
//!
//! # Design Principles
//!
//! - **Immutable**: Observations and ViolationRecords are created once and
//!   never mutated afterwards.
//! - **Typed at creation**: severity and record kind are attached when a
//!   record is created; classification is never inferred from message text.
//! - **Serializable**: every contract type round-trips through serde for
//!   display layers and scenario files.

pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use events::{SessionEvent, SessionStatus, TerminationReason};

/// Which side of the exam call this device plays.
///
/// The monitored role (the candidate) runs the face and loudness detectors;
/// the proctor device only participates in the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Proctor,
    Candidate,
}

impl Role {
    /// Whether integrity detectors (face, loudness) run on this device.
    pub fn is_monitored(&self) -> bool {
        matches!(self, Role::Candidate)
    }

    /// Parse a role from its wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "proctor" => Some(Role::Proctor),
            "candidate" => Some(Role::Candidate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Proctor => write!(f, "proctor"),
            Role::Candidate => write!(f, "candidate"),
        }
    }
}

/// Foreground-tab visibility as reported by the focus detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusState {
    Visible,
    Hidden,
}

/// The kind of signal an observation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationKind {
    FaceCount,
    LoudnessLevel,
    FocusState,
}

impl ObservationKind {
    /// Stable label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::FaceCount => "face-count",
            ObservationKind::LoudnessLevel => "loudness-level",
            ObservationKind::FocusState => "focus-state",
        }
    }
}

/// The typed payload of a single sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservedValue {
    /// Number of faces the face oracle found in the current frame.
    FaceCount(usize),
    /// Scalar loudness in [0, 255] from the loudness oracle.
    Loudness(f64),
    /// Foreground-tab visibility transition.
    Focus(FocusState),
}

impl ObservedValue {
    pub fn kind(&self) -> ObservationKind {
        match self {
            ObservedValue::FaceCount(_) => ObservationKind::FaceCount,
            ObservedValue::Loudness(_) => ObservationKind::LoudnessLevel,
            ObservedValue::Focus(_) => ObservationKind::FocusState,
        }
    }
}

/// A single timestamped sensor reading, normalized to a typed value.
///
/// Produced once by the sampling scheduler and consumed exactly once by the
/// violation ledger; never mutated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: ObservedValue,
    pub at: DateTime<Utc>,
}

impl Observation {
    /// Create an observation stamped with the current wall-clock time.
    pub fn now(value: ObservedValue) -> Self {
        Self {
            value,
            at: Utc::now(),
        }
    }

    /// Create an observation with an explicit timestamp.
    ///
    /// Ledger policy is a deterministic function of observation timestamps,
    /// so tests construct observations this way.
    pub fn at(value: ObservedValue, at: DateTime<Utc>) -> Self {
        Self { value, at }
    }

    pub fn kind(&self) -> ObservationKind {
        self.value.kind()
    }
}

/// Severity of a ledger record, attached at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    /// Warning-severity records are the ones counted toward termination.
    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

/// Classification of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    /// No face visible in the candidate frame.
    NoFace,
    /// More than one face visible in the candidate frame.
    MultiFace,
    /// Ambient loudness crossed the configured threshold.
    LoudNoise,
    /// The exam tab lost foreground focus.
    TabSwitch,
    /// A detector oracle failed for one tick; never counted as a violation.
    SensorFault,
    /// Session lifecycle entry (registered, call ended, terminated).
    Lifecycle,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::NoFace => "no-face",
            RecordKind::MultiFace => "multi-face",
            RecordKind::LoudNoise => "loud-noise",
            RecordKind::TabSwitch => "tab-switch",
            RecordKind::SensorFault => "sensor-fault",
            RecordKind::Lifecycle => "lifecycle",
        }
    }
}

/// A logged integrity-policy breach or lifecycle entry.
///
/// Append-only: once created a record is never modified, and the creation
/// order of records is also their display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Unique identifier for this record.
    pub id: Uuid,
    pub kind: RecordKind,
    pub severity: Severity,
    /// Human-readable description for the proctor's log panel.
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ViolationRecord {
    pub fn new(
        kind: RecordKind,
        severity: Severity,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            at,
        }
    }

    /// Create a warning-severity record (counted toward termination).
    pub fn warning(kind: RecordKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(kind, Severity::Warning, message, at)
    }

    /// Create an error-severity record (transient fault, never counted).
    pub fn error(kind: RecordKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(kind, Severity::Error, message, at)
    }

    /// Create an info-severity lifecycle record.
    pub fn info(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(RecordKind::Lifecycle, Severity::Info, message, at)
    }

    /// Create a success-severity lifecycle record.
    pub fn success(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(RecordKind::Lifecycle, Severity::Success, message, at)
    }
}

/// Session-unique identifier assigned by the signaling transport at
/// registration; immutable for the lifetime of one device session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to an acquired media stream (local camera/microphone or the
/// remote peer's stream). The agent only attaches and releases handles; the
/// media pipeline itself lives outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    pub id: Uuid,
    /// Free-form label from the media layer ("camera+mic", "remote").
    pub label: String,
}

impl StreamHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }
}

/// Direction of a handshake signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
}

/// One leg of the offer/answer handshake relayed by the signaling transport.
///
/// The session description is opaque to the agent; the embedded stream
/// handle is what the receiving side attaches as its remote stream once the
/// handshake completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeSignal {
    pub kind: SignalKind,
    /// Opaque session description produced by the media layer.
    pub description: String,
    /// The sender's stream handle, attached by the receiver on connect.
    pub stream: StreamHandle,
}

impl HandshakeSignal {
    /// Build the outbound offer for a dial attempt.
    pub fn offer(local: &StreamHandle) -> Self {
        Self {
            kind: SignalKind::Offer,
            description: format!("offer:{}", local.id),
            stream: local.clone(),
        }
    }

    /// Build the answer to a pending offer.
    pub fn answer(offer: &HandshakeSignal, local: &StreamHandle) -> Self {
        Self {
            kind: SignalKind::Answer,
            description: format!("answer:{}:{}", offer.stream.id, local.id),
            stream: local.clone(),
        }
    }
}

/// Axis-aligned bounding box returned by the face oracle for one detected
/// face. Only the count matters to the ledger; coordinates are carried for
/// the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// State of the two-party call, shared by the signaling machine and the
/// session status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// No call activity; dial and incoming invites are both possible.
    Idle,
    /// Outbound offer sent, waiting for the remote accept.
    Dialing,
    /// Inbound offer held, waiting for the operator to answer.
    Ringing,
    /// Handshake complete; both stream handles attached.
    Connected,
    /// Terminal. No outgoing transitions.
    Ended,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Dialing => "dialing",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inbound message from the signaling transport.
///
/// Delivery is assumed reliable and ordered per peer pair; retry belongs to
/// the transport, not the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// Another endpoint wants to start a call with us.
    Invite {
        from: EndpointId,
        offer: HandshakeSignal,
    },
    /// The peer we dialed accepted; carries their answer.
    InviteAccepted { answer: HandshakeSignal },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_gates_detectors() {
        assert!(Role::Candidate.is_monitored());
        assert!(!Role::Proctor.is_monitored());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("proctor"), Some(Role::Proctor));
        assert_eq!(Role::parse("Candidate"), Some(Role::Candidate));
        assert_eq!(Role::parse("observer"), None);
    }

    #[test]
    fn test_observation_kind_matches_value() {
        assert_eq!(
            Observation::now(ObservedValue::FaceCount(2)).kind(),
            ObservationKind::FaceCount
        );
        assert_eq!(
            Observation::now(ObservedValue::Loudness(12.0)).kind(),
            ObservationKind::LoudnessLevel
        );
        assert_eq!(
            Observation::now(ObservedValue::Focus(FocusState::Hidden)).kind(),
            ObservationKind::FocusState
        );
    }

    #[test]
    fn test_record_constructors_set_severity() {
        let at = Utc::now();
        let w = ViolationRecord::warning(RecordKind::NoFace, "No face detected", at);
        assert_eq!(w.severity, Severity::Warning);
        assert!(w.severity.is_warning());

        let e = ViolationRecord::error(RecordKind::SensorFault, "oracle failed", at);
        assert_eq!(e.severity, Severity::Error);
        assert!(!e.severity.is_warning());

        let s = ViolationRecord::success("Call ended", at);
        assert_eq!(s.kind, RecordKind::Lifecycle);
        assert_eq!(s.severity, Severity::Success);
    }

    #[test]
    fn test_handshake_answer_references_offer() {
        let caller = StreamHandle::new("camera+mic");
        let callee = StreamHandle::new("camera+mic");
        let offer = HandshakeSignal::offer(&caller);
        assert_eq!(offer.kind, SignalKind::Offer);
        assert_eq!(offer.stream, caller);

        let answer = HandshakeSignal::answer(&offer, &callee);
        assert_eq!(answer.kind, SignalKind::Answer);
        assert_eq!(answer.stream, callee);
        assert!(answer.description.contains(&caller.id.to_string()));
    }

    #[test]
    fn test_signaling_message_roundtrip() {
        let msg = SignalingMessage::Invite {
            from: EndpointId::new("peer-1"),
            offer: HandshakeSignal::offer(&StreamHandle::new("camera+mic")),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_call_state_terminal() {
        assert!(CallState::Ended.is_terminal());
        assert!(!CallState::Connected.is_terminal());
        assert_eq!(CallState::Dialing.to_string(), "dialing");
    }
}
