//! Scenario simulation for the CLI
//!
//! Replays a scripted sequence of sensor readings through the violation
//! ledger and termination policy with synthetic timestamps, so debounce and
//! termination behavior can be inspected deterministically offline.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::ExitCode;
use crate::config::MonitoringConfig;
use crate::contracts::{FocusState, Observation, ObservedValue, Severity, ViolationRecord};
use crate::error::{ProctorError, Result};
use crate::ledger::ViolationLedger;
use crate::policy::{CountingRule, TerminationPolicy};

/// Output format for CLI results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored text
    Text,
    /// Machine-readable JSON
    Json,
}

/// One scripted sensor reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Milliseconds since scenario start.
    pub at_ms: i64,
    #[serde(flatten)]
    pub signal: ScenarioSignal,
}

/// The reading itself, keyed by detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioSignal {
    /// Face count reported by the face oracle.
    Face(usize),
    /// Loudness level reported by the loudness oracle.
    Loudness(f64),
    /// Tab visibility transition.
    Focus(FocusState),
}

/// A scripted exam scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Monitoring overrides; anything unset uses the defaults.
    #[serde(default)]
    pub config: MonitoringConfig,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Load a scenario from a JSON or YAML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProctorError::file(format!("cannot read scenario {}: {}", path.display(), e))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&raw)
                .map_err(|e| ProctorError::config(format!("invalid scenario YAML: {}", e)))
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| ProctorError::config(format!("invalid scenario JSON: {}", e)))
        }
    }
}

/// Result of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub name: Option<String>,
    pub records: Vec<ViolationRecord>,
    pub no_face_count: u32,
    pub multi_face_count: u32,
    pub loudness_count: u32,
    pub warning_total: u32,
    pub terminated: bool,
    /// Index of the step that triggered termination, if any.
    pub terminated_at_step: Option<usize>,
}

/// Replay a scenario through a fresh ledger and policy.
pub fn run_scenario(scenario: &Scenario) -> Result<SimulationReport> {
    scenario.config.validate()?;
    let mut ledger = ViolationLedger::new(&scenario.config);
    let mut policy = TerminationPolicy::new(scenario.config.warning_limit, CountingRule::default());

    let t0 = Utc::now();
    let mut records = Vec::new();
    let mut terminated_at_step = None;

    for (index, step) in scenario.steps.iter().enumerate() {
        let value = match step.signal {
            ScenarioSignal::Face(n) => ObservedValue::FaceCount(n),
            ScenarioSignal::Loudness(v) => ObservedValue::Loudness(v),
            ScenarioSignal::Focus(state) => ObservedValue::Focus(state),
        };
        let observation = Observation::at(value, t0 + Duration::milliseconds(step.at_ms));
        if let Some(record) = ledger.append(&observation) {
            let fired = policy.observe(&record);
            records.push(record);
            if fired {
                ledger.mark_terminated();
                terminated_at_step = Some(index);
            }
        }
    }

    let state = ledger.state();
    Ok(SimulationReport {
        name: scenario.name.clone(),
        records,
        no_face_count: state.no_face_count,
        multi_face_count: state.multi_face_count,
        loudness_count: state.loudness_count,
        warning_total: state.warning_total,
        terminated: state.terminated,
        terminated_at_step,
    })
}

/// Execute the `simulate` subcommand.
pub fn execute_simulate(
    path: PathBuf,
    format: OutputFormat,
    warning_limit: Option<u32>,
    noise_threshold: Option<f64>,
    debounce_ms: Option<u64>,
) -> std::result::Result<ExitCode, ProctorError> {
    let mut scenario = Scenario::load(&path)?;
    if let Some(limit) = warning_limit {
        scenario.config.warning_limit = limit;
    }
    if let Some(threshold) = noise_threshold {
        scenario.config.noise_threshold = threshold;
    }
    if let Some(debounce) = debounce_ms {
        scenario.config.debounce_ms = debounce;
    }

    let report = run_scenario(&scenario)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    Ok(if report.terminated {
        ExitCode::Terminated
    } else {
        ExitCode::Success
    })
}

/// Execute the `defaults` subcommand.
pub fn execute_defaults(format: OutputFormat) -> std::result::Result<ExitCode, ProctorError> {
    let config = MonitoringConfig::from_env();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!("face_interval_ms:     {}", config.face_interval_ms);
            println!("loudness_interval_ms: {}", config.loudness_interval_ms);
            println!("noise_threshold:      {}", config.noise_threshold);
            println!("warning_limit:        {}", config.warning_limit);
            println!("debounce_ms:          {}", config.debounce_ms);
        }
    }
    Ok(ExitCode::Success)
}

fn print_report(report: &SimulationReport) {
    if let Some(name) = &report.name {
        println!("{}", name.bold());
    }
    for record in &report.records {
        let severity = match record.severity {
            Severity::Warning => "warning".yellow(),
            Severity::Error => "error".red(),
            Severity::Success => "success".green(),
            Severity::Info => "info".blue(),
        };
        println!(
            "{} [{}] {}",
            record.at.format("%H:%M:%S%.3f"),
            severity,
            record.message
        );
    }
    println!();
    println!(
        "warnings: {}  no-face: {}  multi-face: {}  loud-noise: {}",
        report.warning_total.to_string().bold(),
        report.no_face_count,
        report.multi_face_count,
        report.loudness_count
    );
    if report.terminated {
        println!("{}", "MALPRACTICE DETECTED - session terminated".red().bold());
    } else {
        println!("{}", "session completed".green());
    }
}
