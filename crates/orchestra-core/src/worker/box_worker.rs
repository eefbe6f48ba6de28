//! BoxWorker -- object-safe dynamic dispatch wrapper for Worker.
//!
//! 1. Define an object-safe `WorkerDyn` trait with boxed futures
//! 2. Blanket-impl `WorkerDyn` for all `T: Worker`
//! 3. `BoxWorker` wraps `Box<dyn WorkerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use orchestra_types::worker::{WorkerError, WorkerOutput, WorkerRequest};

use super::provider::Worker;

/// Object-safe version of [`Worker`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `Worker`.
pub trait WorkerDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        request: &'a WorkerRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerOutput, WorkerError>> + Send + 'a>>;
}

impl<T: Worker> WorkerDyn for T {
    fn name(&self) -> &str {
        Worker::name(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        request: &'a WorkerRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerOutput, WorkerError>> + Send + 'a>> {
        Box::pin(self.execute(request))
    }
}

/// Type-erased worker for runtime registration.
///
/// Since `Worker` uses RPITIT, it cannot be used as a trait object directly.
/// `BoxWorker` provides equivalent methods that delegate to the inner
/// `WorkerDyn` trait object.
pub struct BoxWorker {
    inner: Box<dyn WorkerDyn + Send + Sync>,
}

impl BoxWorker {
    /// Wrap a concrete `Worker` in a type-erased box.
    pub fn new<T: Worker + 'static>(worker: T) -> Self {
        Self {
            inner: Box::new(worker),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn execute(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        self.inner.execute_boxed(request).await
    }
}

impl std::fmt::Debug for BoxWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxWorker").field("name", &self.name()).finish()
    }
}
