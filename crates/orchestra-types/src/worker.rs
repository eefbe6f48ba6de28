//! Worker request/response payloads and the worker error type.
//!
//! Workers are the external collaborators that perform a step's actual work
//! (typically a remote reasoning or generation call). The engine only cares
//! about the text they return and the confidence they attach to it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// What a worker returns for a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Generated text.
    pub text: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Free-form metadata. Object keys are published to the run's shared data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WorkerOutput {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            notes: None,
            metadata: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Everything a worker receives for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    /// The run's input, passed unchanged to every step.
    pub input: serde_json::Value,
    /// Outputs of this step's completed dependencies, keyed by worker reference.
    #[serde(default)]
    pub upstream: HashMap<String, WorkerOutput>,
    /// Snapshot of the run's shared data when the step started.
    #[serde(default)]
    pub shared_data: HashMap<String, serde_json::Value>,
}

/// Errors a worker can report. Every variant counts as a step failure.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),

    #[error("worker unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid output: {0}")]
    InvalidOutput(String),
}
