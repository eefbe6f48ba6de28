//! Worker trait definition.
//!
//! This is the core abstraction that every step backend implements. Uses
//! RPITIT for `execute` so implementations can be plain `async fn`s.

use orchestra_types::worker::{WorkerError, WorkerOutput, WorkerRequest};

/// Trait for the external callables that perform a step's work.
///
/// Implementations typically wrap a remote reasoning/generation call and
/// return its text together with a self-reported confidence score. Any
/// `Err` is treated as a step failure and counts against the retry budget.
pub trait Worker: Send + Sync {
    /// Registry name of this worker (e.g. "analyst").
    fn name(&self) -> &str;

    /// Perform the work for one step invocation.
    fn execute(
        &self,
        request: &WorkerRequest,
    ) -> impl std::future::Future<Output = Result<WorkerOutput, WorkerError>> + Send;
}
