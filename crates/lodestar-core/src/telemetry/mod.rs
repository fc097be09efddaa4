//! Telemetry event model and sinks.
//!
//! Events are write-once records; sinks are fire-and-forget and must never
//! surface their own failures to the caller.

mod event;
mod sink;
mod stats;

pub use event::TelemetryEvent;
pub use sink::{JsonlTelemetrySink, MemoryTelemetrySink, NoopTelemetrySink, TelemetrySink};
pub use stats::TelemetryStats;
