//! Event bus for workflow lifecycle notifications.
//!
//! Provides an `EventBus` that distributes `WorkflowEvent` messages to named
//! listeners and to broadcast subscribers.

pub mod bus;

pub use bus::{EventBus, EventListener};
