//! Workflow engine core for Orchestra.
//!
//! Planning, step execution, run orchestration and metrics live here, along
//! with the ports the engine talks through: the `Worker` trait and registry,
//! and the lifecycle `EventBus`. Depends only on `orchestra-types` plus the
//! async runtime -- no network or storage crates.

pub mod config;
pub mod event;
pub mod worker;
pub mod workflow;
