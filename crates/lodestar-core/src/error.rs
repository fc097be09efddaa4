//! Error types for Lodestar Core.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for configuration and repository operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser error
        source: toml::de::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A version-control command failed
    #[error("git {command} failed: {stderr}")]
    Vcs {
        /// The git subcommand that failed
        command: String,
        /// Captured standard error
        stderr: String,
    },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
