//! Session Controller
//!
//! Wires the sampling scheduler, violation ledger, termination policy and
//! call signaling machine into one [`ExamSession`] and exposes the external
//! contract: dial, answer, end, focus reporting, status, and the event
//! stream.
//!
//! # Concurrency
//!
//! All mutation of the ledger and the call machine happens on one spawned
//! worker task that drains three queues (detector samples, operator
//! commands, inbound signaling) as discrete events. Handlers for one
//! session never run concurrently, so the single-writer invariants hold
//! without locks. Detector tasks only produce onto the sample queue; the
//! public handle only sends commands and reads the status snapshot.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::MonitoringConfig;
use crate::contracts::{
    CallState, EndpointId, ObservedValue, RecordKind, Role, SessionEvent, SessionStatus, Severity,
    SignalingMessage, TerminationReason, ViolationRecord,
};
use crate::error::{ProctorError, Result};
use crate::ledger::ViolationLedger;
use crate::policy::{CountingRule, TerminationPolicy};
use crate::scheduler::{FaceOracle, FocusSensor, LoudnessOracle, SampleEvent, SamplingScheduler};
use crate::signaling::{CallMachine, MediaSource, SignalingTransport};
use crate::telemetry::ProctorMetrics;

const SAMPLE_QUEUE_DEPTH: usize = 256;
const COMMAND_QUEUE_DEPTH: usize = 32;
const EVENT_CHANNEL_DEPTH: usize = 256;

/// Operator commands handled by the session worker.
enum Command {
    Dial {
        peer: EndpointId,
        reply: oneshot::Sender<Result<()>>,
    },
    Answer {
        reply: oneshot::Sender<Result<()>>,
    },
    EndCall {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Builder for [`ExamSession`]. Missing required dependencies surface as
/// contract violations at `start`.
pub struct ExamSessionBuilder {
    role: Role,
    config: MonitoringConfig,
    counting_rule: CountingRule,
    face: Option<Arc<dyn FaceOracle>>,
    loudness: Option<Arc<dyn LoudnessOracle>>,
    media: Option<Arc<dyn MediaSource>>,
    transport: Option<Arc<dyn SignalingTransport>>,
    inbound: Option<mpsc::Receiver<SignalingMessage>>,
    metrics: Option<Arc<ProctorMetrics>>,
}

impl ExamSessionBuilder {
    fn new(role: Role) -> Self {
        Self {
            role,
            config: MonitoringConfig::default(),
            counting_rule: CountingRule::default(),
            face: None,
            loudness: None,
            media: None,
            transport: None,
            inbound: None,
            metrics: None,
        }
    }

    /// Override the monitoring configuration.
    pub fn config(mut self, config: MonitoringConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the termination counting rule.
    pub fn counting_rule(mut self, rule: CountingRule) -> Self {
        self.counting_rule = rule;
        self
    }

    /// Attach the face-presence oracle.
    pub fn face_oracle(mut self, oracle: Arc<dyn FaceOracle>) -> Self {
        self.face = Some(oracle);
        self
    }

    /// Attach the loudness oracle.
    pub fn loudness_oracle(mut self, oracle: Arc<dyn LoudnessOracle>) -> Self {
        self.loudness = Some(oracle);
        self
    }

    /// Attach the local media source.
    pub fn media(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = Some(media);
        self
    }

    /// Attach the signaling transport.
    pub fn transport(mut self, transport: Arc<dyn SignalingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach the inbound signaling message stream.
    pub fn inbound(mut self, inbound: mpsc::Receiver<SignalingMessage>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    /// Attach a metrics handle.
    pub fn metrics(mut self, metrics: Arc<ProctorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register with the transport, spawn the detectors and the worker, and
    /// return the session handle.
    ///
    /// Registration failure propagates before any sampling task exists, so
    /// a failed start leaks nothing.
    pub async fn start(self) -> Result<ExamSession> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| ProctorError::contract("session requires a signaling transport"))?;
        let media = self
            .media
            .ok_or_else(|| ProctorError::contract("session requires a media source"))?;

        let endpoint = transport.register().await?;
        info!(%endpoint, role = %self.role, "session registered");

        let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);
        // Registration has already completed, so the first snapshot a
        // subscriber sees carries the endpoint identity.
        let initial = SessionStatus {
            endpoint: Some(endpoint.clone()),
            ..SessionStatus::initial(self.role)
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let inbound = self.inbound.unwrap_or_else(|| {
            // No transport stream wired in: behave as a silent peer.
            let (_tx, rx) = mpsc::channel(1);
            rx
        });

        let scheduler =
            SamplingScheduler::start(self.role, &self.config, self.face, self.loudness, sample_tx.clone());
        let focus = FocusSensor::new(sample_tx);

        let core = SessionCore {
            role: self.role,
            endpoint: endpoint.clone(),
            ledger: ViolationLedger::new(&self.config),
            policy: TerminationPolicy::new(self.config.warning_limit, self.counting_rule),
            machine: CallMachine::new(),
            scheduler,
            transport,
            media,
            metrics: self.metrics,
            events: event_tx.clone(),
            status: status_tx,
        };

        tokio::spawn(run_worker(core, sample_rx, command_rx, inbound));

        Ok(ExamSession {
            role: self.role,
            endpoint,
            commands: command_tx,
            events: event_tx,
            status: status_rx,
            focus,
        })
    }
}

/// Handle to one running exam session.
///
/// Dropping every handle disposes the session: the worker drains out, all
/// sampling tasks are aborted, and no further mutation happens.
pub struct ExamSession {
    role: Role,
    endpoint: EndpointId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Receiver<SessionStatus>,
    focus: FocusSensor,
}

impl ExamSession {
    /// Start building a session for the given role.
    pub fn builder(role: Role) -> ExamSessionBuilder {
        ExamSessionBuilder::new(role)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The transport-assigned identity of this device.
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Subscribe to the session event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Handle for the presentation layer to report tab visibility changes.
    pub fn focus_sensor(&self) -> FocusSensor {
        self.focus.clone()
    }

    /// Place an outbound call to the given peer.
    pub async fn dial(&self, peer: EndpointId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Dial { peer, reply })
            .await
            .map_err(|_| ProctorError::SessionEnded)?;
        rx.await.map_err(|_| ProctorError::SessionEnded)?
    }

    /// Answer the currently ringing invite.
    pub async fn answer(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Answer { reply })
            .await
            .map_err(|_| ProctorError::SessionEnded)?;
        rx.await.map_err(|_| ProctorError::SessionEnded)?
    }

    /// End the call and terminate the session. Idempotent: ending an
    /// already-terminated session is a no-op.
    pub async fn end_call(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::EndCall { reply })
            .await
            .is_err()
        {
            // Worker already gone: the session is terminated.
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

/// State owned exclusively by the worker task.
struct SessionCore {
    role: Role,
    endpoint: EndpointId,
    ledger: ViolationLedger,
    policy: TerminationPolicy,
    machine: CallMachine,
    scheduler: SamplingScheduler,
    transport: Arc<dyn SignalingTransport>,
    media: Arc<dyn MediaSource>,
    metrics: Option<Arc<ProctorMetrics>>,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<SessionStatus>,
}

async fn run_worker(
    mut core: SessionCore,
    mut samples: mpsc::Receiver<SampleEvent>,
    mut commands: mpsc::Receiver<Command>,
    mut inbound: mpsc::Receiver<SignalingMessage>,
) {
    core.on_start();

    let mut inbound_open = true;
    while !core.terminated() {
        tokio::select! {
            maybe = samples.recv() => match maybe {
                Some(event) => core.handle_sample(event),
                None => break,
            },
            maybe = commands.recv() => match maybe {
                Some(command) => core.handle_command(command).await,
                None => {
                    // Every handle dropped: dispose the session.
                    debug!(endpoint = %core.endpoint, "session handle dropped, disposing");
                    break;
                }
            },
            maybe = inbound.recv(), if inbound_open => match maybe {
                Some(message) => core.handle_signal(message),
                None => inbound_open = false,
            },
        }
    }

    core.scheduler.shutdown();
}

impl SessionCore {
    fn terminated(&self) -> bool {
        self.ledger.state().terminated
    }

    fn on_start(&mut self) {
        let record = self.ledger.note_lifecycle(
            Severity::Info,
            format!("Session registered as {}", self.endpoint),
            Utc::now(),
        );
        self.emit_record(&record);
        self.publish_status();
    }

    fn handle_sample(&mut self, event: SampleEvent) {
        match event {
            SampleEvent::Observation(observation) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_observation(observation.kind());
                }
                let recovered = matches!(observation.value, ObservedValue::FaceCount(1));
                if let Some(record) = self.ledger.append(&observation) {
                    self.emit_record(&record);
                    if matches!(record.kind, RecordKind::NoFace | RecordKind::MultiFace) {
                        let state = self.ledger.state();
                        self.emit(SessionEvent::CountsChanged {
                            no_face: state.no_face_count,
                            multi_face: state.multi_face_count,
                        });
                    }
                    if self.policy.observe(&record) {
                        self.terminate(TerminationReason::MalpracticeDetected);
                        return;
                    }
                } else if recovered {
                    debug!("single face visible, alert cleared");
                }
                self.publish_status();
            }
            SampleEvent::Fault { detector, message } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_sensor_fault(detector);
                }
                if let Some(record) = self.ledger.note_fault(message, Utc::now()) {
                    self.emit_record(&record);
                }
                self.publish_status();
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer, reply } => {
                let result = self.do_dial(peer).await;
                let _ = reply.send(result);
            }
            Command::Answer { reply } => {
                let result = self.do_answer().await;
                let _ = reply.send(result);
            }
            Command::EndCall { reply } => {
                self.terminate(TerminationReason::UserEnded);
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn do_dial(&mut self, peer: EndpointId) -> Result<()> {
        if self.machine.state() != CallState::Idle {
            return Err(ProctorError::InvalidTransition {
                operation: "dial",
                state: self.machine.state(),
            });
        }
        // Media failure is recoverable: the call stays Idle and the
        // operator may retry.
        let local = self.media.acquire().await?;
        let offer = self.machine.begin_dial(peer.clone(), local)?;
        self.transition_metrics(CallState::Dialing);
        self.emit(SessionEvent::CallStateChanged {
            state: CallState::Dialing,
        });
        self.publish_status();
        if let Err(e) = self
            .transport
            .send_invite(peer, offer, self.endpoint.clone())
            .await
        {
            // The invite never left the relay; undo the transition so a
            // retry starts from Idle instead of wedging in Dialing.
            self.roll_back_handshake();
            return Err(e);
        }
        Ok(())
    }

    async fn do_answer(&mut self) -> Result<()> {
        if self.machine.state() != CallState::Ringing {
            return Err(ProctorError::InvalidTransition {
                operation: "answer",
                state: self.machine.state(),
            });
        }
        let local = self.media.acquire().await?;
        let (to, answer) = self.machine.answer(local)?;
        self.transition_metrics(CallState::Connected);
        self.emit(SessionEvent::CallStateChanged {
            state: CallState::Connected,
        });
        self.publish_status();
        if let Err(e) = self.transport.send_accept(to, answer).await {
            // The caller never received the answer; fall back to Idle and
            // let the caller re-invite.
            self.roll_back_handshake();
            return Err(e);
        }
        Ok(())
    }

    fn roll_back_handshake(&mut self) {
        self.machine.abort_handshake();
        self.transition_metrics(CallState::Idle);
        self.emit(SessionEvent::CallStateChanged {
            state: CallState::Idle,
        });
        self.publish_status();
    }

    fn handle_signal(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::Invite { from, offer } => {
                match self.machine.receive_invite(from, offer) {
                    Ok(()) => {
                        self.transition_metrics(CallState::Ringing);
                        self.emit(SessionEvent::CallStateChanged {
                            state: CallState::Ringing,
                        });
                        self.publish_status();
                    }
                    // Rejection is logged inside the machine; never queued.
                    Err(_) => {}
                }
            }
            SignalingMessage::InviteAccepted { answer } => {
                match self.machine.accept_answer(answer) {
                    Ok(()) => {
                        self.transition_metrics(CallState::Connected);
                        self.emit(SessionEvent::CallStateChanged {
                            state: CallState::Connected,
                        });
                        self.publish_status();
                    }
                    Err(e) => warn!(error = %e, "discarding unexpected accept signal"),
                }
            }
        }
    }

    /// The one-way terminal transition. Safe against racing user and policy
    /// triggers: only the first call is observable.
    fn terminate(&mut self, reason: TerminationReason) {
        if self.terminated() {
            return;
        }
        if self.machine.terminate() {
            let record = self
                .ledger
                .note_lifecycle(Severity::Success, "Call ended", Utc::now());
            self.emit_record(&record);
            self.transition_metrics(CallState::Ended);
            self.emit(SessionEvent::CallStateChanged {
                state: CallState::Ended,
            });
        }
        self.ledger.mark_terminated();
        self.scheduler.shutdown();

        let total = self.ledger.state().warning_total;
        info!(%reason, total_violations = total, "session terminated");
        if let Some(metrics) = &self.metrics {
            metrics.record_termination(reason);
        }
        self.emit(SessionEvent::SessionTerminated {
            reason,
            total_violations: total,
        });
        self.publish_status();
    }

    fn emit_record(&self, record: &ViolationRecord) {
        if let Some(metrics) = &self.metrics {
            metrics.record_violation(record.kind, record.severity);
            metrics.set_warning_total(self.ledger.state().warning_total);
        }
        self.emit(SessionEvent::LogAppended {
            record: record.clone(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are best-effort toward the UI.
        let _ = self.events.send(event);
    }

    fn transition_metrics(&self, state: CallState) {
        if let Some(metrics) = &self.metrics {
            metrics.record_call_transition(state);
        }
    }

    fn publish_status(&self) {
        let state = self.ledger.state();
        self.status.send_replace(SessionStatus {
            role: self.role,
            endpoint: Some(self.endpoint.clone()),
            call_state: self.machine.state(),
            no_face_count: state.no_face_count,
            multi_face_count: state.multi_face_count,
            loudness_count: state.loudness_count,
            warning_total: state.warning_total,
            terminated: state.terminated,
            alert_active: self.ledger.alert_active(),
        });
    }
}
