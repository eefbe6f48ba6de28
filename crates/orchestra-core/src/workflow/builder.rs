//! Fluent builder for `WorkflowDefinition`.
//!
//! Every method takes the builder by value and hands it back, so calls chain.
//! `build()` borrows the builder and snapshots the accumulated steps, which
//! makes repeated builds produce definitions that differ only in `id` and
//! `created_at`. No scheduling logic lives here -- ordering is the planner's job.

use std::collections::HashMap;

use chrono::Utc;
use orchestra_types::config::EngineConfig;
use orchestra_types::workflow::{
    DependencyRef, ErrorHandlingMode, FallbackBehavior, RetryPolicy, StepSpec, WorkflowDefinition,
    DEFAULT_BACKOFF_MS, DEFAULT_MIN_CONFIDENCE,
};
use uuid::Uuid;

/// Per-step knobs accepted by the builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub depends_on: Vec<DependencyRef>,
    pub parallel: bool,
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetryPolicy>,
    pub skip_on_error: bool,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends_on(mut self, dependency: DependencyRef) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn retry(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.retry = Some(RetryPolicy::new(max_retries, backoff_ms));
        self
    }

    pub fn skip_on_error(mut self, skip: bool) -> Self {
        self.skip_on_error = skip;
        self
    }
}

/// Accumulates steps and global settings for a workflow.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    steps: Vec<StepSpec>,
    max_concurrency: Option<u32>,
    global_timeout_ms: Option<u64>,
    error_handling: ErrorHandlingMode,
    metadata: HashMap<String, serde_json::Value>,
    next_step: usize,
    default_min_confidence: f64,
    default_backoff_ms: u64,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps: Vec::new(),
            max_concurrency: None,
            global_timeout_ms: None,
            error_handling: ErrorHandlingMode::default(),
            metadata: HashMap::new(),
            next_step: 0,
            default_min_confidence: DEFAULT_MIN_CONFIDENCE,
            default_backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }

    /// Seed the defaults for dependent-step confidence and retry backoff from config.
    pub fn with_config(name: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            default_min_confidence: config.default_min_confidence,
            default_backoff_ms: config.default_backoff_ms,
            ..Self::new(name)
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn max_concurrency(mut self, max: u32) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn global_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.global_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn error_handling(mut self, mode: ErrorHandlingMode) -> Self {
        self.error_handling = mode;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Append a step bound to `worker_ref` with an auto-generated ID (`step-N`).
    pub fn add_step(mut self, worker_ref: impl Into<String>, options: StepOptions) -> Self {
        self.next_step += 1;
        let retry = options
            .retry
            .unwrap_or_else(|| RetryPolicy::new(0, self.default_backoff_ms));
        self.steps.push(StepSpec {
            id: format!("step-{}", self.next_step),
            worker_ref: worker_ref.into(),
            depends_on: options.depends_on,
            parallel: options.parallel,
            timeout_ms: options.timeout_ms,
            retry,
            skip_on_error: options.skip_on_error,
        });
        self
    }

    /// Append a step that requires each of `upstream`.
    ///
    /// The generated dependencies are required, gated at the default minimum
    /// confidence, and fail when unmet. They are added after any dependencies
    /// already present in `options`.
    pub fn add_dependent_step(
        self,
        worker_ref: impl Into<String>,
        upstream: &[&str],
        mut options: StepOptions,
    ) -> Self {
        let min_confidence = self.default_min_confidence;
        options.depends_on.extend(upstream.iter().map(|dep| {
            DependencyRef::required(*dep)
                .with_min_confidence(min_confidence)
                .with_fallback(FallbackBehavior::Fail)
        }));
        self.add_step(worker_ref, options)
    }

    /// Append several steps flagged `parallel`.
    ///
    /// No dependency is implied between them; each receives a clone of `options`.
    pub fn add_parallel_steps(mut self, worker_refs: &[&str], options: StepOptions) -> Self {
        for worker_ref in worker_refs {
            self = self.add_step(*worker_ref, options.clone().parallel(true));
        }
        self
    }

    /// Steps accumulated so far.
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Snapshot the builder into an immutable definition with a fresh ID.
    pub fn build(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: Utc::now(),
            steps: self.steps.clone(),
            max_concurrency: self.max_concurrency,
            global_timeout_ms: self.global_timeout_ms,
            error_handling: self.error_handling,
            metadata: self.metadata.clone(),
        }
    }
}
