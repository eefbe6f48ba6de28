//! Simulated workers for `orchestra run`.
//!
//! Each worker sleeps for the configured latency, then echoes what it saw with
//! a fixed confidence. Workers listed with `--fail` always fail instead.

use std::collections::HashMap;
use std::time::Duration;

use orchestra_core::worker::{Worker, WorkerRegistry};
use orchestra_types::worker::{WorkerError, WorkerOutput, WorkerRequest};
use orchestra_types::workflow::WorkflowDefinition;
use serde_json::json;

use super::SimArgs;

pub struct SimulatedWorker {
    name: String,
    confidence: f64,
    latency: Duration,
    fail: bool,
}

impl Worker for SimulatedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        tokio::time::sleep(self.latency).await;
        if self.fail {
            return Err(WorkerError::Failed(format!("{} is set to fail", self.name)));
        }

        let mut upstream: Vec<&str> = request.upstream.keys().map(String::as_str).collect();
        upstream.sort_unstable();
        let text = format!(
            "{} handled {} (input: {}, upstream: [{}])",
            self.name,
            request.step_id,
            request.input,
            upstream.join(", ")
        );
        Ok(WorkerOutput::new(text, self.confidence).with_metadata(json!({
            "latency_ms": self.latency.as_millis() as u64,
            "upstream_count": upstream.len(),
        })))
    }
}

/// Register a simulated worker for every step of `def`.
pub fn build_registry(def: &WorkflowDefinition, args: &SimArgs) -> WorkerRegistry {
    let overrides: HashMap<&str, f64> = args
        .confidence_for
        .iter()
        .map(|(name, score)| (name.as_str(), *score))
        .collect();

    let mut registry = WorkerRegistry::new();
    for step in &def.steps {
        let name = step.worker_ref.clone();
        let worker = SimulatedWorker {
            confidence: overrides
                .get(name.as_str())
                .copied()
                .unwrap_or(args.confidence),
            latency: Duration::from_millis(args.latency_ms),
            fail: args.fail.iter().any(|f| *f == name),
            name: name.clone(),
        };
        registry.register(name, worker);
    }
    registry
}
