//! Core services for Lodestar.
//!
//! Leaf collaborators shared by the orchestrator and the CLI:
//! - [`logging`]: bounded, structured in-process log sink
//! - [`telemetry`]: closed event model and fire-and-forget sinks
//! - [`config`]: TOML configuration with defaults
//! - [`vcs`]: version-control access contract and its `git` implementation

pub mod config;
pub mod error;
pub mod logging;
pub mod telemetry;
pub mod vcs;

pub use config::LodestarConfig;
pub use error::{CoreError, Result};
pub use logging::{LogEntry, LogLevel, Logger};
pub use telemetry::{
    JsonlTelemetrySink, MemoryTelemetrySink, NoopTelemetrySink, TelemetryEvent, TelemetrySink,
    TelemetryStats,
};
pub use vcs::{BlameRange, CommitSummary, GitCli, RepositoryAccess};
