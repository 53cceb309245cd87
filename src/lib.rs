//! Exam Proctoring Agent
//!
//! An agent that supervises a remote examination session: it fuses
//! independently-sampled integrity signals (camera face presence, ambient
//! loudness, foreground-tab focus) into a single violation ledger, and it
//! drives the two-party proctor/candidate call through its signaling
//! handshake to termination.
//!
//! ## Features
//!
//! - **Sampling Scheduler**: each detector oracle runs on its own cadence
//!   as an independent tokio task; a stalled oracle never delays another
//!   detector
//! - **Violation Ledger**: append-only record log with per-kind debounce
//!   and threshold policy; severity is attached at creation, never inferred
//!   from message text
//! - **Termination Policy**: configurable counting rule; fires exactly once
//!   when the warning limit is crossed and forces the call to Ended
//! - **Call Signaling**: explicit dial/ring/answer/teardown state machine
//!   with an exhaustive, testable transition set
//! - **Telemetry**: Prometheus metrics for observations, violations and
//!   call transitions
//! - **CLI Support**: scenario simulation with machine-readable output
//!
//! ## Architecture
//!
//! 1. **Contracts** (`contracts/`): observations, violation records, events
//!    and status snapshots shared with the presentation layer.
//!
//! 2. **Scheduler** (`scheduler`): detector oracle traits and the sampling
//!    tasks that normalize raw readings into typed observations.
//!
//! 3. **Ledger** (`ledger`): debounce/threshold policy and the append-only
//!    record sequence.
//!
//! 4. **Policy** (`policy`): the termination decision, sole writer of the
//!    terminal outcome.
//!
//! 5. **Signaling** (`signaling`): the call state machine plus the
//!    transport and media traits it drives.
//!
//! 6. **Session** (`session`): the aggregate root wiring everything onto a
//!    single event loop per session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use exam_proctor::{ExamSession, MonitoringConfig, Role};
//! # use exam_proctor::signaling::{MediaSource, SignalingTransport};
//! # use exam_proctor::scheduler::{FaceOracle, LoudnessOracle};
//!
//! # async fn run(
//! #     transport: Arc<dyn SignalingTransport>,
//! #     media: Arc<dyn MediaSource>,
//! #     face: Arc<dyn FaceOracle>,
//! #     loudness: Arc<dyn LoudnessOracle>,
//! # ) -> exam_proctor::Result<()> {
//! let session = ExamSession::builder(Role::Candidate)
//!     .config(MonitoringConfig::builder().warning_limit(10).build())
//!     .transport(transport)
//!     .media(media)
//!     .face_oracle(face)
//!     .loudness_oracle(loudness)
//!     .start()
//!     .await?;
//!
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod scheduler;
pub mod session;
pub mod signaling;
pub mod telemetry;

// Contracts module - located at ../contracts relative to src/
#[path = "../contracts/mod.rs"]
pub mod contracts;

// Re-export the session surface
pub use session::{ExamSession, ExamSessionBuilder};

// Re-export contract types for external use
pub use contracts::{
    // Sensor observations
    FaceBox, FocusState, Observation, ObservationKind, ObservedValue,
    // Ledger records
    RecordKind, Severity, ViolationRecord,
    // Call and signaling types
    CallState, EndpointId, HandshakeSignal, SignalKind, SignalingMessage, StreamHandle,
    // Session surface
    Role, SessionEvent, SessionStatus, TerminationReason,
};

// Re-export configuration and policy knobs
pub use config::{MonitoringConfig, MonitoringConfigBuilder};
pub use policy::{CountingRule, TerminationPolicy};

// Re-export ledger types
pub use ledger::{LedgerState, ViolationLedger};

// Re-export telemetry types
pub use telemetry::{ProctorMetrics, ProctorMetricsRegistry};

// Re-export error types
pub use error::{ProctorError, Result};

// Re-export CLI types for command-line usage
pub use cli::{ExitCode, ProctorCli, ProctorCommands};

/// Agent version (from Cargo.toml)
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent identifier
pub const AGENT_ID: &str = "exam-proctor-agent";

/// Run the CLI application
///
/// This is the main entry point for the CLI binary.
pub fn run_cli(cli: ProctorCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                ProctorError::ConfigError(_) | ProctorError::ContractViolation(_) => {
                    ExitCode::InvalidInput
                }
                ProctorError::FileError(_) => ExitCode::FileError,
                _ => ExitCode::InternalError,
            }
        }
    }
}
