//! Constant-backoff retry decisions for step execution.

use std::time::Duration;

use orchestra_types::workflow::RetryPolicy;

/// Stateless retry handler. All logic is in associated functions.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt is allowed after `attempt` failed.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < policy.max_attempts()
    }

    /// Delay before the next attempt. Constant, independent of the attempt number.
    pub fn backoff(policy: &RetryPolicy) -> Duration {
        Duration::from_millis(policy.backoff_ms)
    }
}
