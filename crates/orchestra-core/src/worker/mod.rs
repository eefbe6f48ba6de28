//! Worker abstractions for Orchestra.
//!
//! This module defines the ports the engine uses to reach external workers:
//! - `Worker`: RPITIT trait for concrete worker implementations
//! - `BoxWorker`: Object-safe wrapper for dynamic dispatch
//! - `WorkerRegistry`: name-indexed lookup used by the step executor

pub mod box_worker;
pub mod provider;
pub mod registry;

pub use box_worker::BoxWorker;
pub use provider::Worker;
pub use registry::WorkerRegistry;
