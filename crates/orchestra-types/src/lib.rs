//! Shared domain types for Orchestra.
//!
//! This crate contains the core domain types used across the workflow engine:
//! workflow definitions, step results, run metrics, lifecycle events, worker
//! payloads and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod event;
pub mod worker;
pub mod workflow;
