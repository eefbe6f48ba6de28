//! CLI command definitions for the `orchestra` binary.
//!
//! Uses clap derive macros. Commands operate on a workflow taken either from
//! a YAML file or from the built-in preset catalog.

pub mod sim;
pub mod workflow;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Plan and run confidence-gated worker workflows.
#[derive(Parser)]
#[command(name = "orchestra", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine config file (defaults to ~/.orchestra/config.toml).
    #[arg(long, global = true, env = "ORCHESTRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow YAML file.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Show the stage plan for a workflow.
    Plan {
        #[command(flatten)]
        source: WorkflowSource,
    },

    /// Run a workflow against simulated workers.
    Run {
        #[command(flatten)]
        source: WorkflowSource,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// List the built-in preset workflows.
    Presets,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Where the workflow comes from: a file or a named preset.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct WorkflowSource {
    /// Path to a workflow YAML file.
    pub file: Option<PathBuf>,

    /// Name of a built-in preset (see `orchestra presets`).
    #[arg(long)]
    pub preset: Option<String>,
}

/// Behavior of the simulated workers used by `run`.
#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// JSON input passed to every step.
    #[arg(long, default_value = "{}")]
    pub input: String,

    /// Confidence every simulated worker reports.
    #[arg(long, default_value_t = 0.9, value_parser = parse_score)]
    pub confidence: f64,

    /// Per-worker confidence override (WORKER=SCORE), repeatable.
    #[arg(long = "confidence-for", value_name = "WORKER=SCORE", value_parser = parse_override)]
    pub confidence_for: Vec<(String, f64)>,

    /// Simulated latency of each worker call, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Make the named worker always fail (repeatable).
    #[arg(long = "fail", value_name = "WORKER")]
    pub fail: Vec<String>,
}

fn parse_override(raw: &str) -> Result<(String, f64), String> {
    let (name, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected WORKER=SCORE, got '{raw}'"))?;
    Ok((name.to_string(), parse_score(score)?))
}

fn parse_score(raw: &str) -> Result<f64, String> {
    let score: f64 = raw
        .parse()
        .map_err(|e| format!("invalid score '{raw}': {e}"))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(format!("score {score} outside [0, 1]"));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_preset_and_sim_flags() {
        let cli = Cli::try_parse_from([
            "orchestra",
            "run",
            "--preset",
            "fan-out",
            "--confidence",
            "0.4",
            "--confidence-for",
            "alpha=0.95",
            "--fail",
            "beta",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Run { source, sim } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(source.preset.as_deref(), Some("fan-out"));
        assert!(source.file.is_none());
        assert_eq!(sim.confidence_for, vec![("alpha".to_string(), 0.95)]);
        assert_eq!(sim.fail, vec!["beta".to_string()]);
        assert_eq!(sim.latency_ms, 50);
    }

    #[test]
    fn plan_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["orchestra", "plan"]).is_err());
        assert!(
            Cli::try_parse_from(["orchestra", "plan", "wf.yaml", "--preset", "fan-out"]).is_err()
        );
        assert!(Cli::try_parse_from(["orchestra", "plan", "wf.yaml"]).is_ok());
    }

    #[test]
    fn parse_override_rejects_bad_input() {
        assert!(parse_override("alpha").is_err());
        assert!(parse_override("alpha=high").is_err());
        assert!(parse_override("alpha=1.5").is_err());
        assert_eq!(parse_override("a=0.5").unwrap(), ("a".to_string(), 0.5));
    }

    #[test]
    fn confidence_flag_rejects_out_of_range() {
        for bad in ["1.5", "NaN", "-0.1"] {
            let args = ["orchestra", "run", "--preset", "fan-out", "--confidence", bad];
            assert!(Cli::try_parse_from(args).is_err(), "{bad}");
        }
    }
}
