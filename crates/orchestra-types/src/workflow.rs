//! Workflow domain types for Orchestra.
//!
//! Defines the canonical declarative representation of a workflow
//! (`WorkflowDefinition`, `StepSpec`, `DependencyRef`), the schedule produced
//! from it (`Stage`, `ExecutionPlan`), and the run-time records produced by
//! executing it (`StepResult`, `ExecutionMetadata`, `WorkflowMetrics`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::worker::WorkerOutput;

/// Fallback step timeout when neither the step nor the workflow sets one (60 s).
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 60_000;

/// Confidence threshold applied by `add_dependent_step` style dependencies.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Constant delay between retry attempts when none is configured.
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
///
/// Built once (by `WorkflowBuilder`, a preset, or a YAML file) and never
/// mutated afterwards. Steps are kept in declaration order; the planner relies
/// on that order when it emits sequential stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 generated at build/parse time.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When this definition was built.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Ordered list of steps (declaration order).
    pub steps: Vec<StepSpec>,
    /// Upper bound on steps in flight within one parallel stage (None = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    /// Timeout applied to steps that do not set their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_timeout_ms: Option<u64>,
    /// Whether a terminal step failure aborts the run.
    #[serde(default)]
    pub error_handling: ErrorHandlingMode,
    /// Extensible metadata for callers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowDefinition {
    /// Look up a step by its ID.
    pub fn step(&self, step_id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Look up the step bound to a worker reference.
    pub fn step_for_worker(&self, worker_ref: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.worker_ref == worker_ref)
    }
}

/// How the runner reacts to a step that fails terminally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingMode {
    /// Abort the run on the first terminal failure of a step without `skip_on_error`.
    #[default]
    Strict,
    /// Record the failure and keep going.
    Lenient,
}

// ---------------------------------------------------------------------------
// Step Specification
// ---------------------------------------------------------------------------

/// A single step bound to an external worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step ID, unique within a workflow.
    pub id: String,
    /// Name of the worker (registry key) that performs this step.
    pub worker_ref: String,
    /// Upstream dependencies, by worker reference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyRef>,
    /// Whether this step may share a stage with other parallel steps.
    #[serde(default)]
    pub parallel: bool,
    /// Step-level timeout (falls back to the workflow's global timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Retry configuration for this step.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Skip the step when a dependency is unmet, and never escalate its failures.
    #[serde(default)]
    pub skip_on_error: bool,
}

impl StepSpec {
    /// Create a sequential step with no dependencies and default retry policy.
    pub fn new(id: impl Into<String>, worker_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            worker_ref: worker_ref.into(),
            depends_on: Vec::new(),
            parallel: false,
            timeout_ms: None,
            retry: RetryPolicy::default(),
            skip_on_error: false,
        }
    }

    /// Resolve the effective timeout: step, then workflow, then `fallback_ms`.
    pub fn effective_timeout_ms(&self, global_timeout_ms: Option<u64>, fallback_ms: u64) -> u64 {
        self.timeout_ms.or(global_timeout_ms).unwrap_or(fallback_ms)
    }
}

/// An edge from a step to the worker whose result it consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Worker reference of the upstream step.
    pub worker_ref: String,
    /// Whether an unmet dependency blocks the step.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Minimum upstream confidence, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// What to do when the dependency is unmet.
    #[serde(default)]
    pub fallback: FallbackBehavior,
}

fn default_required() -> bool {
    true
}

impl DependencyRef {
    /// A required dependency with no confidence gate.
    pub fn required(worker_ref: impl Into<String>) -> Self {
        Self {
            worker_ref: worker_ref.into(),
            required: true,
            min_confidence: None,
            fallback: FallbackBehavior::Fail,
        }
    }

    /// An optional dependency: unmet is treated as satisfied.
    pub fn optional(worker_ref: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(worker_ref)
        }
    }

    /// Gate on the upstream output's confidence score.
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    /// Override the fallback behavior.
    pub fn with_fallback(mut self, fallback: FallbackBehavior) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Reaction to an unmet dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBehavior {
    /// Skip the dependent step.
    Skip,
    /// Same branching as `Fail`; the dependency is already terminal when checked.
    Retry,
    /// Skip when `skip_on_error` is set, otherwise fail the step.
    #[default]
    Fail,
}

/// Bounded retry with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = 1 + max_retries).
    #[serde(default)]
    pub max_retries: u32,
    /// Delay between attempts in milliseconds (not exponential).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// Total number of worker invocations allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution Plan
// ---------------------------------------------------------------------------

/// A batch of steps whose dependencies are all satisfied by earlier stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// 0-based position in the plan.
    pub stage_number: usize,
    /// Steps in this stage (one step unless `can_run_in_parallel`).
    pub steps: Vec<StepSpec>,
    /// Whether the steps are dispatched concurrently.
    pub can_run_in_parallel: bool,
}

/// Ordered list of stages produced by the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    /// Stage index holding the step bound to `worker_ref`.
    pub fn stage_of(&self, worker_ref: &str) -> Option<usize> {
        self.stages
            .iter()
            .find(|stage| stage.steps.iter().any(|s| s.worker_ref == worker_ref))
            .map(|stage| stage.stage_number)
    }

    /// Total steps across all stages.
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(|s| s.steps.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Run Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
///
/// `Paused` and `Cancelled` are reserved: the runner never transitions into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Initialized,
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl WorkflowRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowRunStatus::Completed | WorkflowRunStatus::Failed | WorkflowRunStatus::Cancelled
        )
    }

    /// Whether the runner may move from `self` to `next`.
    pub fn can_transition_to(&self, next: WorkflowRunStatus) -> bool {
        matches!(
            (self, next),
            (WorkflowRunStatus::Initialized, WorkflowRunStatus::Running)
                | (WorkflowRunStatus::Initialized, WorkflowRunStatus::Failed)
                | (WorkflowRunStatus::Running, WorkflowRunStatus::Completed)
                | (WorkflowRunStatus::Running, WorkflowRunStatus::Failed)
        )
    }
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowRunStatus::Initialized => "initialized",
            WorkflowRunStatus::Running => "running",
            WorkflowRunStatus::Completed => "completed",
            WorkflowRunStatus::Failed => "failed",
            WorkflowRunStatus::Paused => "paused",
            WorkflowRunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Step Results
// ---------------------------------------------------------------------------

/// Status of an individual step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Record of one step's execution, keyed by `worker_ref` in the run's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step ID matching `StepSpec.id`.
    pub step_id: String,
    /// Worker reference (the key in the results map).
    pub worker_ref: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<WorkerOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Retries consumed (0 when the first attempt settled the step).
    pub retry_count: u32,
}

impl StepResult {
    /// A fresh result in `Running` state, stamped with the current time.
    pub fn started(step_id: impl Into<String>, worker_ref: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            worker_ref: worker_ref.into(),
            status: StepStatus::Running,
            output: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            retry_count: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Confidence of the worker output, if the step produced one.
    pub fn confidence(&self) -> Option<f64> {
        self.output.as_ref().map(|o| o.confidence)
    }
}

/// Bookkeeping for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Aggregate statistics derived from a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Wall-clock time from run start to completion.
    pub total_execution_time_ms: u64,
    /// Mean of non-zero step durations.
    pub avg_step_execution_time_ms: f64,
    /// Wall-clock total divided by the sum of step durations (<1 means overlap).
    pub parallelization_efficiency: f64,
    /// Completed results divided by all recorded results.
    pub success_rate: f64,
    pub confidence_distribution: ConfidenceDistribution,
}

/// Summary of output confidence scores across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    /// Number of outputs the statistics were computed over.
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
