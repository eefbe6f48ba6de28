//! Lifecycle events published by the workflow runner.
//!
//! `WorkflowEvent` is Clone + Send + Sync so it can travel over a tokio
//! broadcast channel; the payload is free-form JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowEventKind {
    WorkflowStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    WorkflowCompleted,
    WorkflowFailed,
}

impl WorkflowEventKind {
    /// Wire name, e.g. `step-started`.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEventKind::WorkflowStarted => "workflow-started",
            WorkflowEventKind::StepStarted => "step-started",
            WorkflowEventKind::StepCompleted => "step-completed",
            WorkflowEventKind::StepFailed => "step-failed",
            WorkflowEventKind::WorkflowCompleted => "workflow-completed",
            WorkflowEventKind::WorkflowFailed => "workflow-failed",
        }
    }

    pub fn is_step_event(&self) -> bool {
        matches!(
            self,
            WorkflowEventKind::StepStarted
                | WorkflowEventKind::StepCompleted
                | WorkflowEventKind::StepFailed
        )
    }
}

impl std::fmt::Display for WorkflowEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub kind: WorkflowEventKind,
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl WorkflowEvent {
    /// A workflow-scoped event stamped with the current time.
    pub fn workflow(
        kind: WorkflowEventKind,
        workflow_id: Uuid,
        run_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            workflow_id,
            run_id,
            step_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A step-scoped event stamped with the current time.
    pub fn step(
        kind: WorkflowEventKind,
        workflow_id: Uuid,
        run_id: Uuid,
        step_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            step_id: Some(step_id.into()),
            ..Self::workflow(kind, workflow_id, run_id, payload)
        }
    }
}
