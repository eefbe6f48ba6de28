//! Observability setup for Orchestra: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
