//! Workflow engine core: definitions, scheduling, step execution and run orchestration.
//!
//! - `definition` -- YAML parsing, validation, filesystem load/save
//! - `builder` -- fluent `WorkflowBuilder`
//! - `planner` -- greedy stage layering and stall diagnosis
//! - `context` -- per-run mutable state and the per-stage snapshot handed to steps
//! - `retry` -- constant-backoff retry decisions
//! - `step_executor` -- dependency/confidence gates, timeout race, retries
//! - `runner` -- stage loop, error-handling modes, reports
//! - `metrics` -- aggregate run statistics
//! - `presets` -- named, ready-to-run workflow factories

pub mod builder;
pub mod context;
pub mod definition;
pub mod metrics;
pub mod planner;
pub mod presets;
pub mod retry;
pub mod runner;
pub mod step_executor;
