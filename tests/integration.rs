//! Integration tests for the Exam Proctoring Agent
//!
//! Exercises the full session controller against mock oracles and a mock
//! signaling transport:
//! - detection pipeline from scheduler ticks to termination
//! - call signaling flows (dial/accept, invite/answer, teardown)
//! - termination idempotence and post-termination behavior
//! - role gating of the detectors

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use exam_proctor::scheduler::{FaceOracle, LoudnessOracle};
use exam_proctor::signaling::{BoxFuture, MediaSource, SignalingTransport};
use exam_proctor::{
    CallState, EndpointId, ExamSession, FaceBox, FocusState, HandshakeSignal, MonitoringConfig,
    ProctorError, RecordKind, Result, Role, SessionEvent, SignalingMessage, StreamHandle,
    TerminationReason,
};

/// What the mock transport saw go out.
#[derive(Debug, Clone)]
enum Sent {
    Invite {
        to: EndpointId,
        from: EndpointId,
        offer: HandshakeSignal,
    },
    Accept {
        to: EndpointId,
    },
}

/// In-memory transport that records outbound messages.
struct MockTransport {
    id: String,
    sent: Mutex<Vec<Sent>>,
    fail_sends: bool,
}

impl MockTransport {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_sends: false,
        })
    }

    fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_sends: true,
        })
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl SignalingTransport for MockTransport {
    fn register(&self) -> BoxFuture<'_, Result<EndpointId>> {
        let id = self.id.clone();
        Box::pin(async move { Ok(EndpointId::new(id)) })
    }

    fn send_invite(
        &self,
        to: EndpointId,
        offer: HandshakeSignal,
        from: EndpointId,
    ) -> BoxFuture<'_, Result<()>> {
        if self.fail_sends {
            return Box::pin(async { Err(ProctorError::relay("relay rejected invite")) });
        }
        self.sent.lock().unwrap().push(Sent::Invite { to, from, offer });
        Box::pin(async { Ok(()) })
    }

    fn send_accept(&self, to: EndpointId, _answer: HandshakeSignal) -> BoxFuture<'_, Result<()>> {
        if self.fail_sends {
            return Box::pin(async { Err(ProctorError::relay("relay rejected accept")) });
        }
        self.sent.lock().unwrap().push(Sent::Accept { to });
        Box::pin(async { Ok(()) })
    }
}

/// Media source that always yields a stream.
struct MockMedia;

impl MediaSource for MockMedia {
    fn acquire(&self) -> BoxFuture<'_, Result<StreamHandle>> {
        Box::pin(async { Ok(StreamHandle::new("camera+mic")) })
    }
}

/// Media source whose acquisition always fails.
struct DeniedMedia;

impl MediaSource for DeniedMedia {
    fn acquire(&self) -> BoxFuture<'_, Result<StreamHandle>> {
        Box::pin(async { Err(ProctorError::media("permission denied")) })
    }
}

/// Face oracle returning a fixed count forever.
struct FixedFaces(usize);

impl FaceOracle for FixedFaces {
    fn estimate(&self) -> BoxFuture<'_, Result<Vec<FaceBox>>> {
        let n = self.0;
        Box::pin(async move {
            Ok(vec![
                FaceBox {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0
                };
                n
            ])
        })
    }
}

/// Face oracle that plays a script, then repeats the last entry.
struct ScriptedFaces(Mutex<VecDeque<usize>>, usize);

impl ScriptedFaces {
    fn new(script: &[usize], then: usize) -> Self {
        Self(Mutex::new(script.iter().copied().collect()), then)
    }
}

impl FaceOracle for ScriptedFaces {
    fn estimate(&self) -> BoxFuture<'_, Result<Vec<FaceBox>>> {
        let n = self.0.lock().unwrap().pop_front().unwrap_or(self.1);
        Box::pin(async move {
            Ok(vec![
                FaceBox {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0
                };
                n
            ])
        })
    }
}

/// Loudness oracle that counts how often it was sampled.
struct CountingLoudness {
    calls: Arc<AtomicUsize>,
    level: f64,
}

impl LoudnessOracle for CountingLoudness {
    fn sample(&self) -> BoxFuture<'_, Result<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let level = self.level;
        Box::pin(async move { Ok(level) })
    }
}

/// Await the session-terminated event, skipping everything else.
async fn wait_for_termination(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> (TerminationReason, u32) {
    loop {
        match events.recv().await.expect("event stream closed") {
            SessionEvent::SessionTerminated {
                reason,
                total_violations,
            } => return (reason, total_violations),
            _ => continue,
        }
    }
}

/// Await a specific call-state transition, skipping everything else.
async fn wait_for_call_state(events: &mut broadcast::Receiver<SessionEvent>, wanted: CallState) {
    loop {
        match events.recv().await.expect("event stream closed") {
            SessionEvent::CallStateChanged { state } if state == wanted => return,
            _ => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_ten_no_face_samples_terminate_the_session() {
    let transport = MockTransport::new("candidate-1");
    let session = ExamSession::builder(Role::Candidate)
        .transport(transport)
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(FixedFaces(0)))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let (reason, total) = tokio::time::timeout(
        Duration::from_secs(300),
        wait_for_termination(&mut events),
    )
    .await
    .expect("session never terminated");

    assert_eq!(reason, TerminationReason::MalpracticeDetected);
    assert_eq!(total, 10);

    let status = session.status();
    assert!(status.terminated);
    assert_eq!(status.no_face_count, 10);
    assert_eq!(status.warning_total, 10);
    assert_eq!(status.call_state, CallState::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_terminated_session_discards_detector_output() {
    let config = MonitoringConfig::builder().warning_limit(2).build();
    let session = ExamSession::builder(Role::Candidate)
        .config(config)
        .transport(MockTransport::new("candidate-2"))
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(FixedFaces(0)))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let (_, total) = wait_for_termination(&mut events).await;
    assert_eq!(total, 2);

    // Give any queued samples a chance to (not) land.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let status = session.status();
    assert_eq!(status.warning_total, 2);
    assert!(status.terminated);
    assert_eq!(status.call_state, CallState::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_clears_alert_without_new_warnings() {
    // Two empty frames, then a single face forever.
    let session = ExamSession::builder(Role::Candidate)
        .transport(MockTransport::new("candidate-3"))
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(ScriptedFaces::new(&[0, 0], 1)))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    // Wait for the second no-face record.
    let mut warnings = 0;
    while warnings < 2 {
        if let SessionEvent::LogAppended { record } = events.recv().await.unwrap() {
            if record.kind == RecordKind::NoFace {
                warnings += 1;
            }
        }
    }

    // Let recovery samples flow.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let status = session.status();
    assert_eq!(status.no_face_count, 2);
    assert_eq!(status.warning_total, 2);
    assert!(!status.alert_active);
    assert!(!status.terminated);
}

#[tokio::test(start_paused = true)]
async fn test_proctor_role_never_samples_detectors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::new("proctor-1"))
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(FixedFaces(0)))
        .loudness_oracle(Arc::new(CountingLoudness {
            calls: calls.clone(),
            level: 255.0,
        }))
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let status = session.status();
    assert_eq!(status.warning_total, 0);
    assert_eq!(status.loudness_count, 0);
    assert!(!status.terminated);
}

#[tokio::test(start_paused = true)]
async fn test_focus_transitions_record_twice() {
    let session = ExamSession::builder(Role::Candidate)
        .transport(MockTransport::new("candidate-4"))
        .media(Arc::new(MockMedia))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let focus = session.focus_sensor();
    focus.report(FocusState::Hidden);
    focus.report(FocusState::Visible);
    focus.report(FocusState::Hidden);

    let mut tab_switches = 0;
    while tab_switches < 2 {
        if let SessionEvent::LogAppended { record } = events.recv().await.unwrap() {
            if record.kind == RecordKind::TabSwitch {
                tab_switches += 1;
            }
        }
    }

    let status = session.status();
    assert_eq!(status.warning_total, 2);
}

#[tokio::test]
async fn test_dial_flow_connects_on_accept() {
    let transport = MockTransport::new("proctor-2");
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let session = ExamSession::builder(Role::Proctor)
        .transport(transport.clone())
        .media(Arc::new(MockMedia))
        .inbound(inbound_rx)
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let peer = EndpointId::new("candidate-9");
    session.dial(peer.clone()).await.unwrap();
    wait_for_call_state(&mut events, CallState::Dialing).await;

    // The invite went out with our identity and an offer.
    let sent = transport.sent();
    let offer = match &sent[..] {
        [Sent::Invite { to, from, offer }] => {
            assert_eq!(*to, peer);
            assert_eq!(*from, *session.endpoint());
            offer.clone()
        }
        other => panic!("unexpected outbound traffic: {:?}", other),
    };

    // The peer accepts.
    let answer = HandshakeSignal::answer(&offer, &StreamHandle::new("remote"));
    inbound_tx
        .send(SignalingMessage::InviteAccepted { answer })
        .await
        .unwrap();

    wait_for_call_state(&mut events, CallState::Connected).await;
    assert_eq!(session.status().call_state, CallState::Connected);

    // A second dial is rejected while connected.
    let err = session.dial(EndpointId::new("other")).await.unwrap_err();
    assert!(matches!(err, ProctorError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_inbound_invite_rings_and_answer_connects() {
    let transport = MockTransport::new("proctor-3");
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let session = ExamSession::builder(Role::Proctor)
        .transport(transport.clone())
        .media(Arc::new(MockMedia))
        .inbound(inbound_rx)
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let caller = EndpointId::new("candidate-7");
    let offer = HandshakeSignal::offer(&StreamHandle::new("caller-stream"));
    inbound_tx
        .send(SignalingMessage::Invite {
            from: caller.clone(),
            offer,
        })
        .await
        .unwrap();

    wait_for_call_state(&mut events, CallState::Ringing).await;
    assert_eq!(session.status().call_state, CallState::Ringing);

    session.answer().await.unwrap();
    wait_for_call_state(&mut events, CallState::Connected).await;

    let sent = transport.sent();
    assert!(matches!(&sent[..], [Sent::Accept { to }] if *to == caller));
}

#[tokio::test]
async fn test_answer_without_invite_is_invalid() {
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::new("proctor-4"))
        .media(Arc::new(MockMedia))
        .start()
        .await
        .unwrap();

    let err = session.answer().await.unwrap_err();
    assert!(matches!(
        err,
        ProctorError::InvalidTransition {
            operation: "answer",
            state: CallState::Idle,
        }
    ));
}

#[tokio::test]
async fn test_media_failure_is_recoverable_and_keeps_idle() {
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::new("proctor-5"))
        .media(Arc::new(DeniedMedia))
        .start()
        .await
        .unwrap();

    let err = session.dial(EndpointId::new("candidate-1")).await.unwrap_err();
    assert!(matches!(err, ProctorError::MediaUnavailable(_)));
    assert!(err.is_recoverable());

    let status = session.status();
    assert_eq!(status.call_state, CallState::Idle);
    assert!(!status.terminated);
}

#[tokio::test]
async fn test_relay_failure_rolls_back_to_idle_for_retry() {
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::failing("proctor-6"))
        .media(Arc::new(MockMedia))
        .start()
        .await
        .unwrap();

    let err = session.dial(EndpointId::new("candidate-1")).await.unwrap_err();
    assert!(matches!(err, ProctorError::RelayFailure(_)));
    assert!(err.is_recoverable());

    let status = session.status();
    assert_eq!(status.call_state, CallState::Idle);
    assert!(!status.terminated);

    // A retry reaches the relay again instead of being rejected for
    // already dialing.
    let err = session.dial(EndpointId::new("candidate-1")).await.unwrap_err();
    assert!(matches!(err, ProctorError::RelayFailure(_)));
    assert_eq!(session.status().call_state, CallState::Idle);
}

#[tokio::test]
async fn test_accept_relay_failure_falls_back_to_idle() {
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::failing("proctor-9"))
        .media(Arc::new(MockMedia))
        .inbound(inbound_rx)
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let offer = HandshakeSignal::offer(&StreamHandle::new("caller-stream"));
    inbound_tx
        .send(SignalingMessage::Invite {
            from: EndpointId::new("candidate-2"),
            offer,
        })
        .await
        .unwrap();
    wait_for_call_state(&mut events, CallState::Ringing).await;

    let err = session.answer().await.unwrap_err();
    assert!(matches!(err, ProctorError::RelayFailure(_)));

    // The caller never saw the answer; the call is torn back to Idle so a
    // fresh invite can ring again.
    let status = session.status();
    assert_eq!(status.call_state, CallState::Idle);
    assert!(!status.terminated);
}

#[tokio::test]
async fn test_double_end_yields_single_termination_event() {
    let session = ExamSession::builder(Role::Proctor)
        .transport(MockTransport::new("proctor-7"))
        .media(Arc::new(MockMedia))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    session.end_call().await.unwrap();
    // Second end is idempotent, whether or not the worker is still around.
    session.end_call().await.unwrap();

    let (reason, total) = wait_for_termination(&mut events).await;
    assert_eq!(reason, TerminationReason::UserEnded);
    assert_eq!(total, 0);

    // Exactly one termination event total: the one consumed above plus
    // none remaining in the stream.
    let mut ended = 1;
    let mut ended_transitions = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::SessionTerminated { .. } => ended += 1,
            SessionEvent::CallStateChanged {
                state: CallState::Ended,
            } => ended_transitions += 1,
            _ => {}
        }
    }
    assert_eq!(ended, 1);
    assert!(ended_transitions <= 1);

    let status = session.status();
    assert!(status.terminated);
    assert_eq!(status.call_state, CallState::Ended);

    // Commands after termination fail cleanly.
    let err = session.dial(EndpointId::new("x")).await.unwrap_err();
    assert!(matches!(err, ProctorError::SessionEnded));
}

#[tokio::test(start_paused = true)]
async fn test_policy_termination_then_user_end_is_silent() {
    let config = MonitoringConfig::builder().warning_limit(1).build();
    let session = ExamSession::builder(Role::Candidate)
        .config(config)
        .transport(MockTransport::new("candidate-5"))
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(FixedFaces(0)))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let (reason, _) = wait_for_termination(&mut events).await;
    assert_eq!(reason, TerminationReason::MalpracticeDetected);

    // A racing user end after the policy fired is a no-op.
    session.end_call().await.unwrap();
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, SessionEvent::SessionTerminated { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_counts_changed_events_track_face_counters() {
    let session = ExamSession::builder(Role::Candidate)
        .transport(MockTransport::new("candidate-6"))
        .media(Arc::new(MockMedia))
        .face_oracle(Arc::new(ScriptedFaces::new(&[0, 2], 1)))
        .start()
        .await
        .unwrap();

    let mut events = session.subscribe();
    let mut seen = Vec::new();
    while seen.len() < 2 {
        if let SessionEvent::CountsChanged {
            no_face,
            multi_face,
        } = events.recv().await.unwrap()
        {
            seen.push((no_face, multi_face));
        }
    }
    assert_eq!(seen, vec![(1, 0), (1, 1)]);
}

#[tokio::test]
async fn test_status_snapshot_after_start() {
    let session = ExamSession::builder(Role::Candidate)
        .transport(MockTransport::new("candidate-8"))
        .media(Arc::new(MockMedia))
        .start()
        .await
        .unwrap();

    assert_eq!(*session.endpoint(), EndpointId::new("candidate-8"));
    let status = session.status();
    assert_eq!(status.role, Role::Candidate);
    assert_eq!(status.endpoint, Some(EndpointId::new("candidate-8")));
    assert_eq!(status.call_state, CallState::Idle);
    assert!(!status.terminated);
}
