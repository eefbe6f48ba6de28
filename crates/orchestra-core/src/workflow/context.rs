//! Per-run execution state.
//!
//! `ExecutionContext` is owned by the runner's stage loop and is the only place
//! results and counters are written. Before each stage the runner takes a
//! [`StageSnapshot`]: cheap `Arc` copies of everything a step may read, so
//! concurrently running steps never share mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use orchestra_types::workflow::{
    ErrorHandlingMode, ExecutionMetadata, StepResult, StepStatus, WorkflowDefinition,
};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable state for a single workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    /// Run input, passed unchanged to every step.
    pub input: Value,
    /// Step results keyed by worker reference.
    pub results: HashMap<String, StepResult>,
    /// Values published by completed steps (`<worker_ref>.<key>`).
    pub shared_data: HashMap<String, Value>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionContext {
    /// Fresh context with a new run ID and `started_at` set to now.
    pub fn new(workflow_id: Uuid, total_steps: usize, input: Value) -> Self {
        Self {
            workflow_id,
            run_id: Uuid::now_v7(),
            input,
            results: HashMap::new(),
            shared_data: HashMap::new(),
            metadata: ExecutionMetadata {
                started_at: Utc::now(),
                completed_at: None,
                total_steps,
                completed_steps: 0,
                failed_steps: 0,
            },
        }
    }

    /// Store a step result and update the counters.
    ///
    /// A completed step whose output metadata is a JSON object also publishes
    /// each key into `shared_data` as `<worker_ref>.<key>`.
    pub fn record(&mut self, result: StepResult) {
        match result.status {
            StepStatus::Completed => {
                self.metadata.completed_steps += 1;
                if let Some(Value::Object(map)) =
                    result.output.as_ref().and_then(|o| o.metadata.as_ref())
                {
                    for (key, value) in map {
                        self.shared_data
                            .insert(format!("{}.{key}", result.worker_ref), value.clone());
                    }
                }
            }
            StepStatus::Failed => self.metadata.failed_steps += 1,
            _ => {}
        }
        self.results.insert(result.worker_ref.clone(), result);
    }

    /// Stamp `completed_at`.
    pub fn finish(&mut self) {
        self.metadata.completed_at = Some(Utc::now());
    }

    /// Read-only view of the run for the steps of the next stage.
    pub fn snapshot(&self, definition: &WorkflowDefinition) -> StageSnapshot {
        StageSnapshot {
            workflow_id: self.workflow_id,
            run_id: self.run_id,
            input: Arc::new(self.input.clone()),
            results: Arc::new(self.results.clone()),
            shared_data: Arc::new(self.shared_data.clone()),
            global_timeout_ms: definition.global_timeout_ms,
            error_handling: definition.error_handling,
        }
    }
}

// ---------------------------------------------------------------------------
// StageSnapshot
// ---------------------------------------------------------------------------

/// Immutable view of a run taken between stages. Clones share the same data.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    pub input: Arc<Value>,
    /// Results of all prior stages.
    pub results: Arc<HashMap<String, StepResult>>,
    pub shared_data: Arc<HashMap<String, Value>>,
    pub global_timeout_ms: Option<u64>,
    pub error_handling: ErrorHandlingMode,
}

impl StageSnapshot {
    pub fn result(&self, worker_ref: &str) -> Option<&StepResult> {
        self.results.get(worker_ref)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_types::worker::WorkerOutput;
    use orchestra_types::workflow::StepSpec;
    use serde_json::json;

    fn finished(worker_ref: &str, status: StepStatus, output: Option<WorkerOutput>) -> StepResult {
        let mut result = StepResult::started(format!("id-{worker_ref}"), worker_ref);
        result.status = status;
        result.output = output;
        result
    }

    #[test]
    fn test_record_updates_counters() {
        let mut ctx = ExecutionContext::new(Uuid::now_v7(), 3, json!({}));
        ctx.record(finished("a", StepStatus::Completed, Some(WorkerOutput::new("x", 0.9))));
        ctx.record(finished("b", StepStatus::Failed, None));
        ctx.record(finished("c", StepStatus::Skipped, None));

        assert_eq!(ctx.results.len(), 3);
        assert_eq!(ctx.metadata.total_steps, 3);
        assert_eq!(ctx.metadata.completed_steps, 1);
        assert_eq!(ctx.metadata.failed_steps, 1);
    }

    #[test]
    fn test_record_publishes_object_metadata() {
        let mut ctx = ExecutionContext::new(Uuid::now_v7(), 2, json!(null));
        let out = WorkerOutput::new("x", 0.9).with_metadata(json!({"sources": 3, "lang": "en"}));
        ctx.record(finished("gatherer", StepStatus::Completed, Some(out)));

        // Non-object metadata is not published.
        let scalar = WorkerOutput::new("y", 0.9).with_metadata(json!("plain"));
        ctx.record(finished("other", StepStatus::Completed, Some(scalar)));

        assert_eq!(ctx.shared_data.len(), 2);
        assert_eq!(ctx.shared_data["gatherer.sources"], json!(3));
        assert_eq!(ctx.shared_data["gatherer.lang"], json!("en"));
    }

    #[test]
    fn test_failed_step_does_not_publish_metadata() {
        let mut ctx = ExecutionContext::new(Uuid::now_v7(), 1, json!(null));
        let out = WorkerOutput::new("x", 0.1).with_metadata(json!({"k": 1}));
        ctx.record(finished("a", StepStatus::Failed, Some(out)));
        assert!(ctx.shared_data.is_empty());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_records() {
        let def = WorkflowDefinition {
            id: Uuid::now_v7(),
            name: "snap".to_string(),
            description: None,
            created_at: Utc::now(),
            steps: vec![StepSpec::new("s1", "a")],
            max_concurrency: None,
            global_timeout_ms: Some(5_000),
            error_handling: ErrorHandlingMode::Lenient,
            metadata: HashMap::new(),
        };
        let mut ctx = ExecutionContext::new(def.id, 1, json!({"q": "rust"}));
        let snapshot = ctx.snapshot(&def);
        ctx.record(finished("a", StepStatus::Completed, None));

        assert!(snapshot.result("a").is_none());
        assert_eq!(snapshot.global_timeout_ms, Some(5_000));
        assert_eq!(snapshot.error_handling, ErrorHandlingMode::Lenient);
        assert_eq!(*snapshot.input, json!({"q": "rust"}));
        assert_eq!(snapshot.run_id, ctx.run_id);
    }

    #[test]
    fn test_finish_sets_completed_at() {
        let mut ctx = ExecutionContext::new(Uuid::now_v7(), 0, json!(null));
        assert!(ctx.metadata.completed_at.is_none());
        ctx.finish();
        assert!(ctx.metadata.completed_at.unwrap() >= ctx.metadata.started_at);
    }
}
