//! Workflow subcommands: validate, plan, run, presets.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use orchestra_core::event::EventBus;
use orchestra_core::workflow::definition::{WorkflowError, load_workflow_file};
use orchestra_core::workflow::planner::SchedulePlanner;
use orchestra_core::workflow::presets::PresetCatalog;
use orchestra_core::workflow::runner::{RunError, WorkflowReport, WorkflowRunner};
use orchestra_types::config::EngineConfig;
use orchestra_types::workflow::{ExecutionPlan, StepStatus, WorkflowDefinition, WorkflowRunStatus};

use super::{SimArgs, WorkflowSource, sim};

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_file(path: &Path) -> Result<WorkflowDefinition> {
    load_workflow_file(path).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow!("Failed to parse workflow YAML: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow!("Workflow validation failed: {msg}"),
        WorkflowError::IoError(err) => {
            anyhow!(err).context(format!("Failed to read {}", path.display()))
        }
    })
}

fn resolve(source: &WorkflowSource, config: &EngineConfig) -> Result<WorkflowDefinition> {
    match (&source.file, &source.preset) {
        (Some(file), _) => load_file(file),
        (None, Some(name)) => PresetCatalog::with_config(config.clone())
            .build(name)
            .with_context(|| format!("Unknown preset '{name}' (see `orchestra presets`)")),
        (None, None) => bail!("Provide a workflow file or --preset"),
    }
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn handle_validate(file: &Path, out: Output) -> Result<()> {
    let def = load_file(file)?;
    let plan = SchedulePlanner::plan(&def).context("Workflow cannot be scheduled")?;

    if out.json {
        let report = serde_json::json!({
            "valid": true,
            "name": def.name,
            "steps": def.steps.len(),
            "stages": plan.stages.len(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !out.quiet {
        println!();
        println!(
            "  {} '{}' is valid: {} steps in {} stages",
            style("*").green().bold(),
            style(&def.name).cyan(),
            def.steps.len(),
            plan.stages.len()
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn handle_plan(source: &WorkflowSource, config: &EngineConfig, out: Output) -> Result<()> {
    let def = resolve(source, config)?;
    let plan = SchedulePlanner::plan(&def).context("Workflow cannot be scheduled")?;

    if out.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    println!();
    println!("  Plan for '{}'", style(&def.name).cyan().bold());
    println!();
    println!("{}", plan_table(&plan));
    println!();
    Ok(())
}

fn plan_table(plan: &ExecutionPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Mode"),
            Cell::new("Step"),
            Cell::new("Worker"),
            Cell::new("Depends on"),
        ]);

    for stage in &plan.stages {
        let mode = if stage.can_run_in_parallel {
            Cell::new("parallel").fg(Color::Green)
        } else {
            Cell::new("sequential")
        };
        for (i, step) in stage.steps.iter().enumerate() {
            let deps = step
                .depends_on
                .iter()
                .map(|d| match d.min_confidence {
                    Some(min) => format!("{} (>= {min})", d.worker_ref),
                    None => d.worker_ref.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                Cell::new(if i == 0 { stage.stage_number.to_string() } else { String::new() }),
                if i == 0 { mode.clone() } else { Cell::new("") },
                Cell::new(&step.id),
                Cell::new(&step.worker_ref),
                Cell::new(if deps.is_empty() { "-".to_string() } else { deps }),
            ]);
        }
    }
    table
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    source: &WorkflowSource,
    sim_args: &SimArgs,
    config: &EngineConfig,
    out: Output,
) -> Result<()> {
    let def = resolve(source, config)?;
    let input: serde_json::Value =
        serde_json::from_str(&sim_args.input).context("--input must be valid JSON")?;

    let registry = Arc::new(sim::build_registry(&def, sim_args));
    let event_bus = EventBus::new(config.event_bus_capacity);
    if !out.json && !out.quiet {
        event_bus.on("cli-progress", |event| {
            if let Some(step_id) = &event.step_id {
                eprintln!("  {} {}", style(event.kind.as_str()).dim(), step_id);
            }
        });
    }
    let runner = WorkflowRunner::with_config(registry, event_bus, config);

    tracing::info!(workflow = def.name.as_str(), "running workflow");
    match runner.run(&def, input).await {
        Ok(report) => {
            print_report(&report, out)?;
            Ok(())
        }
        Err(RunError::Aborted {
            step_id,
            source,
            report,
        }) => {
            print_report(&report, out)?;
            let worker = def.step(&step_id).map_or("?", |step| step.worker_ref.as_str());
            bail!("Workflow aborted at step '{step_id}' (worker '{worker}'): {source}")
        }
        Err(err) => Err(err).context("Workflow could not start"),
    }
}

fn print_report(report: &WorkflowReport, out: Output) -> Result<()> {
    if out.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Worker"),
            Cell::new("Status"),
            Cell::new("Confidence"),
            Cell::new("Retries"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);

    for r in report.ordered_results() {
        table.add_row(vec![
            Cell::new(&r.step_id),
            Cell::new(&r.worker_ref),
            format_step_status(r.status),
            Cell::new(
                r.confidence()
                    .map(|c| format!("{c:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(r.retry_count),
            Cell::new(
                r.duration_ms
                    .map(|d| format!("{d}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(r.error.as_deref().unwrap_or("")),
        ]);
    }

    let m = &report.metrics;
    println!();
    println!(
        "  Run {} of '{}': {}",
        style(report.run_id).dim(),
        style(&report.workflow_name).cyan(),
        format_run_status(report.status)
    );
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} {}ms total, {:.0}ms avg step, efficiency {:.2}, success {:.0}%",
        style("Metrics:").bold(),
        m.total_execution_time_ms,
        m.avg_step_execution_time_ms,
        m.parallelization_efficiency,
        m.success_rate * 100.0
    );
    let dist = &m.confidence_distribution;
    if dist.count > 0 {
        println!(
            "  {} min {:.2} / median {:.2} / max {:.2} over {} outputs",
            style("Confidence:").bold(),
            dist.min,
            dist.median,
            dist.max,
            dist.count
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

pub fn handle_presets(out: Output) -> Result<()> {
    let catalog = PresetCatalog::new();
    if out.json {
        let entries: Vec<_> = catalog
            .entries()
            .into_iter()
            .map(|(name, description)| {
                serde_json::json!({ "name": name, "description": description })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Name").fg(Color::Cyan), Cell::new("Description")]);
    for (name, description) in catalog.entries() {
        table.add_row(vec![Cell::new(name), Cell::new(description)]);
    }
    println!("{table}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn format_run_status(status: WorkflowRunStatus) -> String {
    match status {
        WorkflowRunStatus::Completed => style("completed").green().to_string(),
        WorkflowRunStatus::Failed => style("failed").red().to_string(),
        other => style(other.to_string()).yellow().to_string(),
    }
}

fn format_step_status(status: StepStatus) -> Cell {
    match status {
        StepStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        StepStatus::Running => Cell::new("running").fg(Color::Blue),
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::DarkYellow),
        StepStatus::Cancelled => Cell::new("cancelled").fg(Color::Magenta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn preset(name: &str) -> WorkflowSource {
        WorkflowSource {
            file: None,
            preset: Some(name.to_string()),
        }
    }

    #[test]
    fn resolve_known_and_unknown_presets() {
        let config = EngineConfig::default();
        let def = resolve(&preset("fan-out"), &config).unwrap();
        assert_eq!(def.steps.len(), 3);
        let err = resolve(&preset("missing"), &config).unwrap_err();
        assert!(err.to_string().contains("Unknown preset"));
    }

    #[test]
    fn resolve_file_reports_validation_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.yaml");
        std::fs::write(
            &path,
            "name: bad\nsteps:\n  - id: a\n    worker_ref: w\n  - id: a\n    worker_ref: v\n",
        )
        .unwrap();
        let source = WorkflowSource {
            file: Some(path),
            preset: None,
        };
        let err = resolve(&source, &EngineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn load_missing_file_has_context() {
        let err = load_file(&PathBuf::from("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn plan_table_lists_every_step() {
        let def = PresetCatalog::new().build("research-pipeline").unwrap();
        let plan = SchedulePlanner::plan(&def).unwrap();
        let rendered = plan_table(&plan).to_string();
        for step in &def.steps {
            assert!(rendered.contains(&step.worker_ref));
        }
        assert!(rendered.contains("parallel"));
    }

    #[tokio::test]
    async fn run_preset_with_failing_worker_aborts() {
        let args = SimArgs {
            input: "{}".to_string(),
            confidence: 0.9,
            confidence_for: Vec::new(),
            latency_ms: 0,
            fail: vec!["beta".to_string()],
        };
        let out = Output {
            json: false,
            quiet: true,
        };
        let err = handle_run(&preset("fan-out"), &args, &EngineConfig::default(), out)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("aborted"));
        assert!(message.contains("(worker 'beta')"), "{message}");
    }

    #[tokio::test]
    async fn run_preset_succeeds() {
        let args = SimArgs {
            input: "{\"topic\":\"rust\"}".to_string(),
            confidence: 0.9,
            confidence_for: Vec::new(),
            latency_ms: 0,
            fail: Vec::new(),
        };
        let out = Output {
            json: false,
            quiet: true,
        };
        handle_run(&preset("research-pipeline"), &args, &EngineConfig::default(), out)
            .await
            .unwrap();
    }
}
