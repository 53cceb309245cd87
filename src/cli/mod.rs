//! CLI module for the Exam Proctoring Agent
//!
//! Provides the `proctor` command line: deterministic replay of scripted
//! sensor scenarios through the violation ledger and termination policy,
//! and inspection of the effective monitoring configuration.

pub mod simulate;

pub use simulate::{OutputFormat, Scenario, SimulationReport};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::ProctorError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Scenario completed without termination
    Success = 0,
    /// The termination policy ended the session
    Terminated = 1,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// Scenario file not found or unreadable
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Exam session proctoring agent
#[derive(Debug, Parser)]
#[command(name = "proctor", version, about)]
pub struct ProctorCli {
    #[command(subcommand)]
    pub command: ProctorCommands,
}

#[derive(Debug, Subcommand)]
pub enum ProctorCommands {
    /// Replay a scripted sensor scenario through the violation ledger
    Simulate {
        /// Scenario file (JSON or YAML)
        #[arg(long)]
        scenario: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Override the warning limit
        #[arg(long)]
        warning_limit: Option<u32>,

        /// Override the loudness threshold
        #[arg(long)]
        noise_threshold: Option<f64>,

        /// Override the loud-noise debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// Print the effective monitoring configuration
    Defaults {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: ProctorCli) -> Result<ExitCode, ProctorError> {
    match cli.command {
        ProctorCommands::Simulate {
            scenario,
            format,
            warning_limit,
            noise_threshold,
            debounce_ms,
        } => simulate::execute_simulate(scenario, format, warning_limit, noise_threshold, debounce_ms),
        ProctorCommands::Defaults { format } => simulate::execute_defaults(format),
    }
}
