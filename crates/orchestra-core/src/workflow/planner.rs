//! Schedule planner: greedy layering of steps into ordered stages.
//!
//! Each pass collects the unplaced steps whose dependencies are all placed.
//! Parallel-flagged steps from a pass share one stage; sequential steps each get
//! their own stage, in declaration order. A pass that places nothing means the
//! remaining steps can never run -- either because they form a cycle or because
//! they depend on a worker no step provides. Both surface as
//! [`PlanError::CircularDependency`]; the attached [`StallCause`] says which.

use std::collections::{HashMap, HashSet};

use orchestra_types::workflow::{ExecutionPlan, Stage, StepSpec, WorkflowDefinition};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why planning stalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallCause {
    /// Steps that (transitively) depend on themselves, in declaration order.
    Cycle { members: Vec<String> },
    /// A dependency names a worker that no step is bound to.
    UnknownWorker { step_id: String, worker_ref: String },
}

impl std::fmt::Display for StallCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StallCause::Cycle { members } => write!(f, "cycle through {}", members.join(" -> ")),
            StallCause::UnknownWorker {
                step_id,
                worker_ref,
            } => write!(f, "step '{step_id}' depends on unknown worker '{worker_ref}'"),
        }
    }
}

/// Planning-time failures. Always fatal to the run.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// No progress was possible in a layering pass.
    #[error("circular dependency: cannot schedule {unplaced:?} ({cause})")]
    CircularDependency {
        /// IDs of the steps left unplaced, in declaration order.
        unplaced: Vec<String>,
        cause: StallCause,
    },
}

impl PlanError {
    /// Diagnosed cause of the stall.
    pub fn cause(&self) -> &StallCause {
        match self {
            PlanError::CircularDependency { cause, .. } => cause,
        }
    }

    /// True when the stall is a genuine cycle rather than a dangling reference.
    pub fn is_cycle(&self) -> bool {
        matches!(self.cause(), StallCause::Cycle { .. })
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Stateless planner. All logic is in associated functions.
pub struct SchedulePlanner;

impl SchedulePlanner {
    /// Plan the stages for a workflow definition.
    pub fn plan(definition: &WorkflowDefinition) -> Result<ExecutionPlan, PlanError> {
        Self::plan_steps(&definition.steps)
    }

    /// Plan the stages for an ordered list of steps.
    pub fn plan_steps(steps: &[StepSpec]) -> Result<ExecutionPlan, PlanError> {
        let mut placed: HashSet<&str> = HashSet::new();
        let mut unplaced: Vec<&StepSpec> = steps.iter().collect();
        let mut stages: Vec<Stage> = Vec::new();

        while !unplaced.is_empty() {
            let (available, blocked): (Vec<&StepSpec>, Vec<&StepSpec>) =
                unplaced.into_iter().partition(|step| {
                    step.depends_on
                        .iter()
                        .all(|dep| placed.contains(dep.worker_ref.as_str()))
                });

            if available.is_empty() {
                return Err(diagnose_stall(steps, &blocked));
            }

            let (parallel, sequential): (Vec<&StepSpec>, Vec<&StepSpec>) =
                available.into_iter().partition(|step| step.parallel);

            if !parallel.is_empty() {
                placed.extend(parallel.iter().map(|s| s.worker_ref.as_str()));
                stages.push(Stage {
                    stage_number: stages.len(),
                    steps: parallel.into_iter().cloned().collect(),
                    can_run_in_parallel: true,
                });
            }

            for step in sequential {
                placed.insert(step.worker_ref.as_str());
                stages.push(Stage {
                    stage_number: stages.len(),
                    steps: vec![step.clone()],
                    can_run_in_parallel: false,
                });
            }

            unplaced = blocked;
        }

        tracing::debug!(
            stages = stages.len(),
            steps = steps.len(),
            "execution plan built"
        );

        Ok(ExecutionPlan { stages })
    }
}

/// Work out why the `blocked` steps cannot be placed.
fn diagnose_stall(all_steps: &[StepSpec], blocked: &[&StepSpec]) -> PlanError {
    let unplaced: Vec<String> = blocked.iter().map(|s| s.id.clone()).collect();
    let known: HashSet<&str> = all_steps.iter().map(|s| s.worker_ref.as_str()).collect();

    for step in blocked {
        if let Some(dep) = step
            .depends_on
            .iter()
            .find(|dep| !known.contains(dep.worker_ref.as_str()))
        {
            return PlanError::CircularDependency {
                unplaced,
                cause: StallCause::UnknownWorker {
                    step_id: step.id.clone(),
                    worker_ref: dep.worker_ref.clone(),
                },
            };
        }
    }

    // Every dependency resolves, so the blocked set must contain a cycle.
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..blocked.len()).map(|i| graph.add_node(i)).collect();
    let by_worker: HashMap<&str, usize> = blocked
        .iter()
        .enumerate()
        .map(|(i, s)| (s.worker_ref.as_str(), i))
        .collect();

    for (to, step) in blocked.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&from) = by_worker.get(dep.worker_ref.as_str()) {
                graph.add_edge(nodes[from], nodes[to], ());
            }
        }
    }

    let members = tarjan_scc(&graph)
        .into_iter()
        .find(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.find_edge(n, n).is_some())
        })
        .map(|component| {
            let mut idx: Vec<usize> = component.into_iter().map(|n| graph[n]).collect();
            idx.sort_unstable();
            idx.into_iter().map(|i| blocked[i].id.clone()).collect()
        })
        .unwrap_or_else(|| unplaced.clone());

    PlanError::CircularDependency {
        unplaced,
        cause: StallCause::Cycle { members },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
