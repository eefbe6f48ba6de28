//! Worker registry for runtime worker lookup.
//!
//! A simple name-indexed registry of boxed workers. Runners share it as
//! `Arc<WorkerRegistry>`; entries are reference-counted so a step can hand its
//! worker to a detached task.

use std::collections::HashMap;
use std::sync::Arc;

use super::box_worker::BoxWorker;
use super::provider::Worker;

/// Registry of available workers, indexed by worker reference.
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<BoxWorker>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Register a worker under the given reference.
    ///
    /// If a worker with this reference already exists, it is replaced.
    pub fn register<W: Worker + 'static>(&mut self, worker_ref: impl Into<String>, worker: W) {
        self.register_boxed(worker_ref, BoxWorker::new(worker));
    }

    /// Register an already type-erased worker.
    pub fn register_boxed(&mut self, worker_ref: impl Into<String>, worker: BoxWorker) {
        self.workers.insert(worker_ref.into(), Arc::new(worker));
    }

    /// Look up a worker by reference.
    pub fn get(&self, worker_ref: &str) -> Option<Arc<BoxWorker>> {
        self.workers.get(worker_ref).cloned()
    }

    pub fn contains(&self, worker_ref: &str) -> bool {
        self.workers.contains_key(worker_ref)
    }

    /// List all registered worker references, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_types::worker::{WorkerError, WorkerOutput, WorkerRequest};

    struct Fixed(&'static str, f64);

    impl Worker for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
            Ok(WorkerOutput::new(self.0, self.1))
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = WorkerRegistry::new();
        assert!(registry.is_empty());

        registry.register("writer", Fixed("writer", 0.9));
        registry.register("analyst", Fixed("analyst", 0.8));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("writer"));
        assert_eq!(registry.get("analyst").unwrap().name(), "analyst");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list_names(), vec!["analyst", "writer"]);
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = WorkerRegistry::new();
        registry.register("writer", Fixed("first", 0.1));
        registry.register("writer", Fixed("second", 0.2));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("writer").unwrap().name(), "second");
    }
}
