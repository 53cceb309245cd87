//! Exam Proctoring Agent CLI
//!
//! Command-line interface for the Exam Proctoring Agent.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scripted sensor scenario through the violation ledger
//! proctor simulate --scenario exam.yaml --format json
//!
//! # Tighten the termination policy for a run
//! proctor simulate --scenario exam.yaml --warning-limit 5
//!
//! # Print the effective monitoring configuration
//! proctor defaults
//! ```
//!
//! # Exit Codes
//!
//! - 0: Scenario completed without termination
//! - 1: The termination policy ended the session
//! - 3: Invalid input or arguments
//! - 4: Scenario file not found or unreadable
//! - 10: Internal error

use clap::Parser;
use exam_proctor::{run_cli, ProctorCli};

fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments
    let cli = ProctorCli::parse();

    // Run the CLI and exit with appropriate code
    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
