//! Call Signaling State Machine
//!
//! Drives the two-party call through its handshake:
//! `Idle → Dialing → Connected`, `Idle → Ringing → Connected`, and
//! `{Dialing, Ringing, Connected} → Ended`. `Ended` is terminal.
//!
//! The machine itself is synchronous and pure: every inbound signal and
//! operator action is an explicit method call returning a [`Result`], so the
//! transition set is exhaustive and testable. Async side effects (media
//! acquisition, relay sends) are performed by the session worker around
//! these calls.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use crate::contracts::{CallState, EndpointId, HandshakeSignal, StreamHandle};
use crate::error::{ProctorError, Result};

/// Boxed future returned by the external-interface traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reliable, ordered message relay between two named endpoints.
///
/// The agent never retries over this channel; delivery guarantees belong to
/// the transport implementation.
pub trait SignalingTransport: Send + Sync {
    /// Register this device and obtain its session-unique endpoint id.
    fn register(&self) -> BoxFuture<'_, Result<EndpointId>>;

    /// Relay an outbound call invite with our offer signal.
    fn send_invite(
        &self,
        to: EndpointId,
        offer: HandshakeSignal,
        from: EndpointId,
    ) -> BoxFuture<'_, Result<()>>;

    /// Relay our answer to a pending invite.
    fn send_accept(&self, to: EndpointId, answer: HandshakeSignal) -> BoxFuture<'_, Result<()>>;
}

/// Local media acquisition (camera + microphone).
pub trait MediaSource: Send + Sync {
    /// Acquire the local stream. Failure is recoverable: the call stays in
    /// its current state and the operator may retry.
    fn acquire(&self) -> BoxFuture<'_, Result<StreamHandle>>;
}

/// The per-session call state machine.
///
/// At most one connected partner exists per session; a second inbound invite
/// while connected is rejected, never queued.
pub struct CallMachine {
    state: CallState,
    local_stream: Option<StreamHandle>,
    remote_stream: Option<StreamHandle>,
    peer: Option<EndpointId>,
    /// Offer held while ringing, pending operator acceptance.
    pending_invite: Option<(EndpointId, HandshakeSignal)>,
}

impl Default for CallMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMachine {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            local_stream: None,
            remote_stream: None,
            peer: None,
            pending_invite: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn peer(&self) -> Option<&EndpointId> {
        self.peer.as_ref()
    }

    pub fn local_stream(&self) -> Option<&StreamHandle> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&StreamHandle> {
        self.remote_stream.as_ref()
    }

    /// Begin an outbound call: Idle → Dialing. Returns the offer signal to
    /// relay to the peer. The local stream must already be acquired.
    pub fn begin_dial(&mut self, peer: EndpointId, local: StreamHandle) -> Result<HandshakeSignal> {
        if self.state != CallState::Idle {
            return Err(ProctorError::InvalidTransition {
                operation: "dial",
                state: self.state,
            });
        }
        info!(peer = %peer, "dialing");
        let offer = HandshakeSignal::offer(&local);
        self.local_stream = Some(local);
        self.peer = Some(peer);
        self.state = CallState::Dialing;
        Ok(offer)
    }

    /// Apply the remote accept while dialing: Dialing → Connected. Attaches
    /// the remote stream carried by the answer.
    pub fn accept_answer(&mut self, answer: HandshakeSignal) -> Result<()> {
        if self.state != CallState::Dialing {
            return Err(ProctorError::InvalidTransition {
                operation: "accept-answer",
                state: self.state,
            });
        }
        self.remote_stream = Some(answer.stream);
        self.state = CallState::Connected;
        info!(peer = ?self.peer, "call connected (outbound)");
        Ok(())
    }

    /// Record an inbound invite: Idle → Ringing. While connected (or mid-
    /// handshake) the invite is rejected, never queued.
    pub fn receive_invite(&mut self, from: EndpointId, offer: HandshakeSignal) -> Result<()> {
        if self.state != CallState::Idle {
            warn!(from = %from, state = %self.state, "rejecting inbound invite");
            return Err(ProctorError::InvalidTransition {
                operation: "receive-invite",
                state: self.state,
            });
        }
        debug!(from = %from, "inbound invite, ringing");
        self.pending_invite = Some((from, offer));
        self.state = CallState::Ringing;
        Ok(())
    }

    /// Answer the pending invite: Ringing → Connected. Returns the caller's
    /// endpoint and the answer signal to relay back. The caller's stream is
    /// attached as our remote stream.
    pub fn answer(&mut self, local: StreamHandle) -> Result<(EndpointId, HandshakeSignal)> {
        if self.state != CallState::Ringing {
            return Err(ProctorError::InvalidTransition {
                operation: "answer",
                state: self.state,
            });
        }
        // Invariant: Ringing always holds a pending invite.
        let (from, offer) = self
            .pending_invite
            .take()
            .ok_or_else(|| ProctorError::contract("ringing without a pending invite"))?;
        let answer = HandshakeSignal::answer(&offer, &local);
        self.local_stream = Some(local);
        self.remote_stream = Some(offer.stream);
        self.peer = Some(from.clone());
        self.state = CallState::Connected;
        info!(peer = %from, "call connected (inbound)");
        Ok((from, answer))
    }

    /// Roll back a handshake whose signal never reached the peer: back to
    /// Idle with both streams released, the peer cleared, and any pending
    /// invite dropped. `Ended` stays terminal.
    pub fn abort_handshake(&mut self) {
        if self.state == CallState::Ended {
            return;
        }
        debug!(from = %self.state, "handshake aborted");
        self.local_stream = None;
        self.remote_stream = None;
        self.pending_invite = None;
        self.peer = None;
        self.state = CallState::Idle;
    }

    /// Tear the call down: any state → Ended. Releases both stream handles
    /// and drops any pending invite. Idempotent: returns `true` only on the
    /// transition that actually ended the call.
    pub fn terminate(&mut self) -> bool {
        if self.state == CallState::Ended {
            return false;
        }
        debug!(from = %self.state, "call ended");
        self.local_stream = None;
        self.remote_stream = None;
        self.pending_invite = None;
        self.state = CallState::Ended;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> EndpointId {
        EndpointId::new(id)
    }

    fn stream() -> StreamHandle {
        StreamHandle::new("camera+mic")
    }

    #[test]
    fn test_outbound_call_flow() {
        let mut machine = CallMachine::new();
        assert_eq!(machine.state(), CallState::Idle);

        let offer = machine.begin_dial(peer("remote"), stream()).unwrap();
        assert_eq!(machine.state(), CallState::Dialing);
        assert!(machine.local_stream().is_some());

        let remote = stream();
        machine
            .accept_answer(HandshakeSignal::answer(&offer, &remote))
            .unwrap();
        assert_eq!(machine.state(), CallState::Connected);
        assert_eq!(machine.remote_stream(), Some(&remote));
        assert_eq!(machine.peer(), Some(&peer("remote")));
    }

    #[test]
    fn test_inbound_call_flow() {
        let mut machine = CallMachine::new();
        let caller_stream = stream();
        let offer = HandshakeSignal::offer(&caller_stream);

        machine.receive_invite(peer("caller"), offer).unwrap();
        assert_eq!(machine.state(), CallState::Ringing);

        let (to, answer) = machine.answer(stream()).unwrap();
        assert_eq!(to, peer("caller"));
        assert_eq!(answer.stream, *machine.local_stream().unwrap());
        assert_eq!(machine.state(), CallState::Connected);
        assert_eq!(machine.remote_stream(), Some(&caller_stream));
    }

    #[test]
    fn test_dial_requires_idle() {
        let mut machine = CallMachine::new();
        machine.begin_dial(peer("a"), stream()).unwrap();

        let err = machine.begin_dial(peer("b"), stream()).unwrap_err();
        assert!(matches!(err, ProctorError::InvalidTransition { operation: "dial", .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invite_while_connected_is_rejected_not_queued() {
        let mut machine = CallMachine::new();
        let offer = machine.begin_dial(peer("a"), stream()).unwrap();
        machine
            .accept_answer(HandshakeSignal::answer(&offer, &stream()))
            .unwrap();

        let second = HandshakeSignal::offer(&stream());
        assert!(machine.receive_invite(peer("b"), second).is_err());
        // Still connected to the first peer; nothing queued.
        assert_eq!(machine.state(), CallState::Connected);
        assert_eq!(machine.peer(), Some(&peer("a")));
    }

    #[test]
    fn test_answer_requires_ringing() {
        let mut machine = CallMachine::new();
        let err = machine.answer(stream()).unwrap_err();
        assert!(matches!(err, ProctorError::InvalidTransition { operation: "answer", .. }));
    }

    #[test]
    fn test_terminate_releases_streams_and_is_idempotent() {
        let mut machine = CallMachine::new();
        let offer = machine.begin_dial(peer("a"), stream()).unwrap();
        machine
            .accept_answer(HandshakeSignal::answer(&offer, &stream()))
            .unwrap();

        assert!(machine.terminate());
        assert_eq!(machine.state(), CallState::Ended);
        assert!(machine.local_stream().is_none());
        assert!(machine.remote_stream().is_none());

        // Second terminate is a no-op.
        assert!(!machine.terminate());
        assert_eq!(machine.state(), CallState::Ended);
    }

    #[test]
    fn test_ended_is_terminal() {
        let mut machine = CallMachine::new();
        machine.terminate();

        assert!(machine.begin_dial(peer("a"), stream()).is_err());
        assert!(machine
            .receive_invite(peer("a"), HandshakeSignal::offer(&stream()))
            .is_err());
        assert!(machine.answer(stream()).is_err());
        assert_eq!(machine.state(), CallState::Ended);
    }

    #[test]
    fn test_abort_handshake_returns_to_idle_for_retry() {
        let mut machine = CallMachine::new();
        machine.begin_dial(peer("a"), stream()).unwrap();

        machine.abort_handshake();
        assert_eq!(machine.state(), CallState::Idle);
        assert!(machine.local_stream().is_none());
        assert!(machine.peer().is_none());

        // The operator can dial again from scratch.
        machine.begin_dial(peer("a"), stream()).unwrap();
        assert_eq!(machine.state(), CallState::Dialing);
    }

    #[test]
    fn test_abort_handshake_after_end_stays_ended() {
        let mut machine = CallMachine::new();
        machine.terminate();

        machine.abort_handshake();
        assert_eq!(machine.state(), CallState::Ended);
    }

    #[test]
    fn test_terminate_while_ringing_drops_pending_invite() {
        let mut machine = CallMachine::new();
        machine
            .receive_invite(peer("caller"), HandshakeSignal::offer(&stream()))
            .unwrap();
        assert!(machine.terminate());
        assert!(machine.answer(stream()).is_err());
    }
}
