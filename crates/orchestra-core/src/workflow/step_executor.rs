//! Executes a single step: gates, worker invocation, timeout and retries.
//!
//! The executor reads only the [`StageSnapshot`] it is handed and returns a
//! [`StepOutcome`]; recording the result is the runner's job. That keeps the
//! executor free of locks and lets sibling steps run on separate tasks.
//!
//! Every worker call is spawned as a detached tokio task and raced against the
//! step timeout. A timed-out call is not cancelled: only its join handle is
//! dropped, so the worker keeps running unobserved until it settles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use orchestra_types::event::{WorkflowEvent, WorkflowEventKind};
use orchestra_types::worker::{WorkerError, WorkerOutput, WorkerRequest};
use orchestra_types::workflow::{
    ErrorHandlingMode, FallbackBehavior, StepResult, StepSpec, StepStatus,
    DEFAULT_STEP_TIMEOUT_MS,
};
use serde_json::json;
use thiserror::Error;
use tracing::{info_span, Instrument};

use super::context::StageSnapshot;
use super::retry::RetryHandler;
use crate::event::EventBus;
use crate::worker::{BoxWorker, WorkerRegistry};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Step-level failures. Every one is recorded in the run's results.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// A required dependency is missing, not completed, or under its confidence gate.
    #[error("dependency '{dependency}' unmet: {reason}")]
    DependencyUnmet { dependency: String, reason: String },

    /// No worker is registered under the step's reference. Never retried.
    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    /// The worker did not settle within the step timeout.
    #[error("execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    /// The worker reported an error or its task panicked.
    #[error(transparent)]
    WorkerFailed(#[from] WorkerError),
}

/// What happened to one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: StepResult,
    /// Set when the failure must abort the run (strict mode, no `skip_on_error`).
    pub escalation: Option<StepError>,
}

enum Gate {
    Skip(String),
    Fail(StepError),
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Runs steps against workers looked up in a shared registry.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<WorkerRegistry>,
    event_bus: EventBus,
    default_timeout_ms: u64,
}

impl StepExecutor {
    pub fn new(registry: Arc<WorkerRegistry>, event_bus: EventBus) -> Self {
        Self::with_default_timeout(registry, event_bus, DEFAULT_STEP_TIMEOUT_MS)
    }

    /// Use `default_timeout_ms` when neither the step nor the workflow sets a timeout.
    pub fn with_default_timeout(
        registry: Arc<WorkerRegistry>,
        event_bus: EventBus,
        default_timeout_ms: u64,
    ) -> Self {
        Self {
            registry,
            event_bus,
            default_timeout_ms,
        }
    }

    /// Execute `step` against the results in `snapshot`, inside a `workflow.step` span.
    pub async fn execute(&self, step: &StepSpec, snapshot: &StageSnapshot) -> StepOutcome {
        let span = info_span!(
            "workflow.step",
            run_id = %snapshot.run_id,
            step_id = step.id.as_str(),
            worker = step.worker_ref.as_str(),
        );
        self.execute_step(step, snapshot).instrument(span).await
    }

    async fn execute_step(&self, step: &StepSpec, snapshot: &StageSnapshot) -> StepOutcome {
        let mut result = StepResult::started(&step.id, &step.worker_ref);

        let upstream = match check_dependencies(step, snapshot) {
            Ok(upstream) => upstream,
            Err(Gate::Skip(reason)) => return skipped(result, reason),
            Err(Gate::Fail(err)) => {
                self.emit_started(step, snapshot);
                return self.fail(step, snapshot, result, err);
            }
        };

        self.emit_started(step, snapshot);

        let Some(worker) = self.registry.get(&step.worker_ref) else {
            let err = StepError::WorkerNotFound(step.worker_ref.clone());
            return self.fail(step, snapshot, result, err);
        };

        let timeout_ms =
            step.effective_timeout_ms(snapshot.global_timeout_ms, self.default_timeout_ms);
        let request = Arc::new(WorkerRequest {
            workflow_id: snapshot.workflow_id,
            run_id: snapshot.run_id,
            step_id: step.id.clone(),
            input: (*snapshot.input).clone(),
            upstream,
            shared_data: (*snapshot.shared_data).clone(),
        });

        let mut attempt: u32 = 1;
        loop {
            match invoke(Arc::clone(&worker), Arc::clone(&request), timeout_ms).await {
                Ok(output) => {
                    result.retry_count = attempt - 1;
                    return self.complete(step, snapshot, result, output);
                }
                Err(err) => {
                    result.retry_count = attempt - 1;
                    if !RetryHandler::should_retry(&step.retry, attempt) {
                        return self.fail(step, snapshot, result, err);
                    }
                    tracing::warn!(
                        run_id = %snapshot.run_id,
                        step_id = step.id.as_str(),
                        worker = step.worker_ref.as_str(),
                        attempt,
                        max_attempts = step.retry.max_attempts(),
                        error = %err,
                        "step attempt failed, retrying"
                    );
                    tokio::time::sleep(RetryHandler::backoff(&step.retry)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Whether a terminal failure of `step` aborts the run.
    pub fn escalation_for(
        step: &StepSpec,
        snapshot: &StageSnapshot,
        err: &StepError,
    ) -> Option<StepError> {
        (snapshot.error_handling == ErrorHandlingMode::Strict && !step.skip_on_error)
            .then(|| err.clone())
    }

    fn emit_started(&self, step: &StepSpec, snapshot: &StageSnapshot) {
        self.event_bus.publish(WorkflowEvent::step(
            WorkflowEventKind::StepStarted,
            snapshot.workflow_id,
            snapshot.run_id,
            &step.id,
            json!({ "worker_ref": step.worker_ref }),
        ));
    }

    fn complete(
        &self,
        step: &StepSpec,
        snapshot: &StageSnapshot,
        mut result: StepResult,
        output: WorkerOutput,
    ) -> StepOutcome {
        stamp_end(&mut result);
        result.status = StepStatus::Completed;

        tracing::debug!(
            run_id = %snapshot.run_id,
            step_id = step.id.as_str(),
            worker = step.worker_ref.as_str(),
            confidence = output.confidence,
            retries = result.retry_count,
            "step completed"
        );

        self.event_bus.publish(WorkflowEvent::step(
            WorkflowEventKind::StepCompleted,
            snapshot.workflow_id,
            snapshot.run_id,
            &step.id,
            json!({
                "worker_ref": step.worker_ref,
                "duration_ms": result.duration_ms,
                "confidence": output.confidence,
                "retry_count": result.retry_count,
            }),
        ));

        result.output = Some(output);
        StepOutcome {
            result,
            escalation: None,
        }
    }

    fn fail(
        &self,
        step: &StepSpec,
        snapshot: &StageSnapshot,
        mut result: StepResult,
        err: StepError,
    ) -> StepOutcome {
        stamp_end(&mut result);
        result.status = StepStatus::Failed;
        result.error = Some(err.to_string());

        tracing::warn!(
            run_id = %snapshot.run_id,
            step_id = step.id.as_str(),
            worker = step.worker_ref.as_str(),
            retries = result.retry_count,
            error = %err,
            "step failed"
        );

        self.event_bus.publish(WorkflowEvent::step(
            WorkflowEventKind::StepFailed,
            snapshot.workflow_id,
            snapshot.run_id,
            &step.id,
            json!({
                "worker_ref": step.worker_ref,
                "error": err.to_string(),
                "retry_count": result.retry_count,
            }),
        ));

        let escalation = Self::escalation_for(step, snapshot, &err);
        StepOutcome { result, escalation }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Evaluate the dependency and confidence gates.
///
/// Returns the outputs of the completed dependencies on success.
fn check_dependencies(
    step: &StepSpec,
    snapshot: &StageSnapshot,
) -> Result<HashMap<String, WorkerOutput>, Gate> {
    let mut upstream = HashMap::new();

    for dep in &step.depends_on {
        let unmet = match snapshot.result(&dep.worker_ref) {
            None => Some("no result recorded".to_string()),
            Some(r) if !r.is_completed() => Some(format!("dependency {}", r.status)),
            Some(r) => match (dep.min_confidence, r.confidence()) {
                (Some(_), Some(conf)) if !conf.is_finite() => {
                    Some(format!("invalid confidence {conf}"))
                }
                (Some(min), Some(conf)) if conf < min => {
                    Some(format!("confidence {conf} below required {min}"))
                }
                (Some(min), None) => Some(format!("no output to check against confidence {min}")),
                _ => {
                    if let Some(output) = &r.output {
                        upstream.insert(dep.worker_ref.clone(), output.clone());
                    }
                    None
                }
            },
        };

        let Some(reason) = unmet else { continue };
        if !dep.required {
            continue;
        }
        if dep.fallback == FallbackBehavior::Skip || step.skip_on_error {
            return Err(Gate::Skip(format!(
                "dependency '{}' unmet: {reason}",
                dep.worker_ref
            )));
        }
        return Err(Gate::Fail(StepError::DependencyUnmet {
            dependency: dep.worker_ref.clone(),
            reason,
        }));
    }

    Ok(upstream)
}

/// Run one worker call on a detached task, racing it against the timeout.
///
/// An output whose confidence is not a finite value in [0, 1] fails the attempt.
async fn invoke(
    worker: Arc<BoxWorker>,
    request: Arc<WorkerRequest>,
    timeout_ms: u64,
) -> Result<WorkerOutput, StepError> {
    let handle = tokio::spawn(async move { worker.execute(&request).await }.in_current_span());

    match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
        Ok(Ok(Ok(output))) => check_output(output),
        Ok(Ok(Err(err))) => Err(StepError::WorkerFailed(err)),
        Ok(Err(join_err)) => Err(StepError::WorkerFailed(WorkerError::Failed(format!(
            "worker task panicked: {join_err}"
        )))),
        Err(_elapsed) => Err(StepError::ExecutionTimeout { timeout_ms }),
    }
}

fn check_output(output: WorkerOutput) -> Result<WorkerOutput, StepError> {
    if (0.0..=1.0).contains(&output.confidence) {
        return Ok(output);
    }
    Err(StepError::WorkerFailed(WorkerError::InvalidOutput(format!(
        "confidence {} outside [0, 1]",
        output.confidence
    ))))
}

fn skipped(mut result: StepResult, reason: String) -> StepOutcome {
    result.status = StepStatus::Skipped;
    result.end_time = Some(result.start_time);
    result.duration_ms = Some(0);
    tracing::debug!(step_id = result.step_id.as_str(), %reason, "step skipped");
    result.error = Some(reason);
    StepOutcome {
        result,
        escalation: None,
    }
}

fn stamp_end(result: &mut StepResult) {
    let end = Utc::now();
    let elapsed = (end - result.start_time).num_milliseconds().max(0);
    result.end_time = Some(end);
    result.duration_ms = Some(elapsed as u64);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
