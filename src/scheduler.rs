//! Sampling Scheduler
//!
//! Runs each active detector oracle on its own cadence and normalizes raw
//! results into typed [`Observation`]s on a single-consumer queue. Each
//! detector is an independent tokio task, so a stalled oracle never delays
//! another detector's schedule.
//!
//! Sampling handles follow a scoped-resource pattern: tasks are spawned at
//! session start and unconditionally aborted on every exit path, so no
//! observation from a dead session can reach a disposed ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::MonitoringConfig;
use crate::contracts::{FaceBox, FocusState, Observation, ObservationKind, ObservedValue, Role};
use crate::error::Result;
use crate::signaling::BoxFuture;

/// Face-presence oracle: given the current video frame, returns the detected
/// faces. May fail, in which case the tick is skipped.
pub trait FaceOracle: Send + Sync {
    fn estimate(&self) -> BoxFuture<'_, Result<Vec<FaceBox>>>;
}

/// Ambient-loudness oracle: returns a scalar loudness in [0, 255] over the
/// most recent sampling window.
pub trait LoudnessOracle: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, Result<f64>>;
}

/// What a detector task puts on the sample queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEvent {
    /// A normalized sensor reading.
    Observation(Observation),
    /// A detector oracle failed for one tick. Logged by the consumer as an
    /// error-severity record; never counted as a violation.
    Fault {
        detector: ObservationKind,
        message: String,
    },
}

/// Owns the spawned detector tasks for one session.
pub struct SamplingScheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl SamplingScheduler {
    /// Spawn the detectors that are active for this role. The face and
    /// loudness detectors run only on the monitored device; the focus
    /// detector is event-driven and lives in [`FocusSensor`].
    pub fn start(
        role: Role,
        config: &MonitoringConfig,
        face: Option<Arc<dyn FaceOracle>>,
        loudness: Option<Arc<dyn LoudnessOracle>>,
        tx: mpsc::Sender<SampleEvent>,
    ) -> Self {
        let mut tasks = Vec::new();

        if role.is_monitored() {
            if let Some(oracle) = face {
                tasks.push(tokio::spawn(face_loop(
                    oracle,
                    Duration::from_millis(config.face_interval_ms),
                    tx.clone(),
                )));
            }
            if let Some(oracle) = loudness {
                tasks.push(tokio::spawn(loudness_loop(
                    oracle,
                    Duration::from_millis(config.loudness_interval_ms),
                    tx,
                )));
            }
        } else {
            debug!(%role, "detectors disabled for non-monitored role");
        }

        Self { tasks }
    }

    /// Abort every sampling task. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn face_loop(
    oracle: Arc<dyn FaceOracle>,
    period: Duration,
    tx: mpsc::Sender<SampleEvent>,
) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let event = match oracle.estimate().await {
            Ok(faces) => {
                trace!(count = faces.len(), "face sample");
                SampleEvent::Observation(Observation::now(ObservedValue::FaceCount(faces.len())))
            }
            Err(e) => SampleEvent::Fault {
                detector: ObservationKind::FaceCount,
                message: format!("Face detection error occurred: {}", e),
            },
        };
        if tx.send(event).await.is_err() {
            // Consumer gone; the session is over.
            break;
        }
    }
}

async fn loudness_loop(
    oracle: Arc<dyn LoudnessOracle>,
    period: Duration,
    tx: mpsc::Sender<SampleEvent>,
) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let event = match oracle.sample().await {
            Ok(level) => {
                trace!(level, "loudness sample");
                SampleEvent::Observation(Observation::now(ObservedValue::Loudness(level)))
            }
            Err(e) => SampleEvent::Fault {
                detector: ObservationKind::LoudnessLevel,
                message: format!("Error accessing microphone: {}", e),
            },
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

/// Event-driven focus detector handle.
///
/// The presentation layer reports visibility changes; only genuine
/// transitions are forwarded as observations; nothing re-emits while the
/// tab stays hidden.
#[derive(Clone)]
pub struct FocusSensor {
    hidden: Arc<AtomicBool>,
    tx: mpsc::Sender<SampleEvent>,
}

impl FocusSensor {
    pub fn new(tx: mpsc::Sender<SampleEvent>) -> Self {
        Self {
            hidden: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Report the current visibility. Deduplicated: repeated reports of the
    /// same state emit nothing.
    pub fn report(&self, state: FocusState) {
        let now_hidden = state == FocusState::Hidden;
        let was_hidden = self.hidden.swap(now_hidden, Ordering::AcqRel);
        if was_hidden == now_hidden {
            return;
        }
        let event = SampleEvent::Observation(Observation::now(ObservedValue::Focus(state)));
        if self.tx.try_send(event).is_err() {
            warn!("focus observation dropped, session queue unavailable");
        }
    }
}
