//! Workflow runner: validates, plans and drives a run stage by stage.
//!
//! Execution model:
//! 1. Build a fresh `ExecutionContext`.
//! 2. Validate the definition and compute the `ExecutionPlan`. Either failing
//!    ends the run before any step executes.
//! 3. For each stage, snapshot the context and run its steps. Parallel stages
//!    fan out on a `JoinSet` (bounded by `max_concurrency` when set) and wait
//!    for every sibling to settle. Outcomes are applied in declaration order.
//! 4. Stamp completion, compute metrics, emit the terminal event.
//!
//! In strict mode the first escalated step failure stops the loop after its
//! stage settles and `run` returns [`RunError::Aborted`] carrying the partial
//! report. Lenient mode records failures and always reaches the last stage.

use std::collections::HashMap;
use std::sync::Arc;

use orchestra_types::config::EngineConfig;
use orchestra_types::event::{WorkflowEvent, WorkflowEventKind};
use orchestra_types::worker::WorkerError;
use orchestra_types::workflow::{
    ExecutionMetadata, Stage, StepResult, StepStatus, WorkflowDefinition, WorkflowMetrics,
    WorkflowRunStatus, DEFAULT_STEP_TIMEOUT_MS,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::context::{ExecutionContext, StageSnapshot};
use super::definition::{validate_definition, WorkflowError};
use super::metrics::MetricsCalculator;
use super::planner::{PlanError, SchedulePlanner};
use super::step_executor::{StepError, StepExecutor, StepOutcome};
use crate::event::EventBus;
use crate::worker::WorkerRegistry;

// ---------------------------------------------------------------------------
// Report and errors
// ---------------------------------------------------------------------------

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub status: WorkflowRunStatus,
    /// Step results keyed by worker reference.
    pub results: HashMap<String, StepResult>,
    pub metrics: WorkflowMetrics,
    pub metadata: ExecutionMetadata,
    pub shared_data: HashMap<String, Value>,
}

impl WorkflowReport {
    pub fn result(&self, worker_ref: &str) -> Option<&StepResult> {
        self.results.get(worker_ref)
    }

    /// Results ordered by start time, then step ID.
    pub fn ordered_results(&self) -> Vec<&StepResult> {
        let mut ordered: Vec<&StepResult> = self.results.values().collect();
        ordered.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });
        ordered
    }
}

/// Errors returned from [`WorkflowRunner::run`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] WorkflowError),

    #[error("planning failed: {0}")]
    Planning(#[from] PlanError),

    /// A step failed in strict mode; `report` holds what was recorded.
    #[error("workflow aborted at step '{step_id}': {source}")]
    Aborted {
        step_id: String,
        source: StepError,
        report: Box<WorkflowReport>,
    },
}

impl RunError {
    /// Partial report for an aborted run.
    pub fn report(&self) -> Option<&WorkflowReport> {
        match self {
            RunError::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

/// Drives workflow runs. Cheap to clone; each `run` call is independent.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    executor: Arc<StepExecutor>,
    event_bus: EventBus,
}

impl WorkflowRunner {
    pub fn new(registry: Arc<WorkerRegistry>, event_bus: EventBus) -> Self {
        Self::with_default_timeout(registry, event_bus, DEFAULT_STEP_TIMEOUT_MS)
    }

    /// Runner whose fallback step timeout comes from `config`.
    pub fn with_config(
        registry: Arc<WorkerRegistry>,
        event_bus: EventBus,
        config: &EngineConfig,
    ) -> Self {
        Self::with_default_timeout(registry, event_bus, config.default_step_timeout_ms)
    }

    fn with_default_timeout(
        registry: Arc<WorkerRegistry>,
        event_bus: EventBus,
        default_timeout_ms: u64,
    ) -> Self {
        let executor =
            StepExecutor::with_default_timeout(registry, event_bus.clone(), default_timeout_ms);
        Self {
            executor: Arc::new(executor),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Execute `definition` with `input`.
    ///
    /// The whole run happens inside a `workflow.run` span; each step gets a
    /// child `workflow.step` span.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> Result<WorkflowReport, RunError> {
        let ctx = ExecutionContext::new(definition.id, definition.steps.len(), input);
        let span = info_span!(
            "workflow.run",
            run_id = %ctx.run_id,
            workflow_id = %definition.id,
            workflow = definition.name.as_str(),
        );
        self.drive(definition, ctx).instrument(span).await
    }

    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        mut ctx: ExecutionContext,
    ) -> Result<WorkflowReport, RunError> {
        let mut status = WorkflowRunStatus::Initialized;

        let plan = match validate_definition(definition)
            .map_err(RunError::from)
            .and_then(|()| SchedulePlanner::plan(definition).map_err(RunError::from))
        {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    workflow = definition.name.as_str(),
                    error = %err,
                    "workflow rejected"
                );
                self.publish(
                    &ctx,
                    WorkflowEventKind::WorkflowFailed,
                    json!({ "error": err.to_string() }),
                );
                return Err(err);
            }
        };

        transition(&mut status, WorkflowRunStatus::Running);
        tracing::info!(
            run_id = %ctx.run_id,
            workflow = definition.name.as_str(),
            steps = definition.steps.len(),
            stages = plan.stages.len(),
            "workflow started"
        );
        self.publish(
            &ctx,
            WorkflowEventKind::WorkflowStarted,
            json!({
                "name": definition.name,
                "total_steps": definition.steps.len(),
                "stages": plan.stages.len(),
            }),
        );

        let mut abort: Option<(String, StepError)> = None;

        for stage in &plan.stages {
            tracing::debug!(
                run_id = %ctx.run_id,
                stage = stage.stage_number,
                steps = stage.steps.len(),
                parallel = stage.can_run_in_parallel,
                "processing stage"
            );

            let snapshot = ctx.snapshot(definition);
            let outcomes = if stage.can_run_in_parallel {
                self.run_parallel(stage, &snapshot, definition.max_concurrency).await
            } else {
                let mut outcomes = Vec::with_capacity(stage.steps.len());
                for step in &stage.steps {
                    outcomes.push(self.executor.execute(step, &snapshot).await);
                }
                outcomes
            };

            for StepOutcome { result, escalation } in outcomes {
                if let Some(err) = escalation {
                    if abort.is_none() {
                        abort = Some((result.step_id.clone(), err));
                    }
                }
                ctx.record(result);
            }

            if abort.is_some() {
                break;
            }
        }

        ctx.finish();
        let metrics = MetricsCalculator::calculate(&ctx.results, &ctx.metadata);

        match abort {
            Some((step_id, source)) => {
                transition(&mut status, WorkflowRunStatus::Failed);
                tracing::warn!(
                    run_id = %ctx.run_id,
                    step_id = step_id.as_str(),
                    error = %source,
                    "workflow aborted"
                );
                self.publish(
                    &ctx,
                    WorkflowEventKind::WorkflowFailed,
                    json!({ "step_id": step_id, "error": source.to_string() }),
                );
                Err(RunError::Aborted {
                    step_id,
                    source,
                    report: Box::new(report(definition, ctx, status, metrics)),
                })
            }
            None => {
                transition(&mut status, WorkflowRunStatus::Completed);
                tracing::info!(
                    run_id = %ctx.run_id,
                    completed = ctx.metadata.completed_steps,
                    failed = ctx.metadata.failed_steps,
                    duration_ms = metrics.total_execution_time_ms,
                    "workflow completed"
                );
                self.publish(
                    &ctx,
                    WorkflowEventKind::WorkflowCompleted,
                    json!({
                        "completed_steps": ctx.metadata.completed_steps,
                        "failed_steps": ctx.metadata.failed_steps,
                        "duration_ms": metrics.total_execution_time_ms,
                    }),
                );
                Ok(report(definition, ctx, status, metrics))
            }
        }
    }

    /// Run every step of a parallel stage and return outcomes in declaration order.
    async fn run_parallel(
        &self,
        stage: &Stage,
        snapshot: &StageSnapshot,
        max_concurrency: Option<u32>,
    ) -> Vec<StepOutcome> {
        let semaphore = max_concurrency.map(|max| Arc::new(Semaphore::new(max as usize)));
        let mut join_set = JoinSet::new();

        for (index, step) in stage.steps.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let snapshot = snapshot.clone();
            let step = step.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(
                async move {
                    let _permit = match semaphore {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    (index, executor.execute(&step, &snapshot).await)
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<StepOutcome>> =
            (0..stage.steps.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => {
                    tracing::warn!(run_id = %snapshot.run_id, error = %err, "step task join error")
                }
            }
        }

        slots
            .into_iter()
            .zip(&stage.steps)
            .map(|(slot, step)| {
                slot.unwrap_or_else(|| {
                    let err = StepError::WorkerFailed(WorkerError::Failed(
                        "step task did not complete".to_string(),
                    ));
                    let mut result = StepResult::started(&step.id, &step.worker_ref);
                    result.status = StepStatus::Failed;
                    result.error = Some(err.to_string());
                    result.end_time = Some(result.start_time);
                    result.duration_ms = Some(0);
                    StepOutcome {
                        escalation: StepExecutor::escalation_for(step, snapshot, &err),
                        result,
                    }
                })
            })
            .collect()
    }

    fn publish(&self, ctx: &ExecutionContext, kind: WorkflowEventKind, payload: Value) {
        self.event_bus
            .publish(WorkflowEvent::workflow(kind, ctx.workflow_id, ctx.run_id, payload));
    }
}

fn transition(status: &mut WorkflowRunStatus, next: WorkflowRunStatus) {
    debug_assert!(status.can_transition_to(next), "{status} -> {next}");
    *status = next;
}

fn report(
    definition: &WorkflowDefinition,
    ctx: ExecutionContext,
    status: WorkflowRunStatus,
    metrics: WorkflowMetrics,
) -> WorkflowReport {
    WorkflowReport {
        run_id: ctx.run_id,
        workflow_id: ctx.workflow_id,
        workflow_name: definition.name.clone(),
        status,
        results: ctx.results,
        metrics,
        metadata: ctx.metadata,
        shared_data: ctx.shared_data,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
