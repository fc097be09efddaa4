//! Lodestar configuration.
//!
//! Configuration lives in `.lodestar/config.toml` inside the workspace. Every
//! key is optional; missing keys take the defaults below. The document may be
//! wrapped in a `[lodestar]` table or written bare.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding workspace-local state.
pub const CONFIG_DIR: &str = ".lodestar";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodestarConfig {
    /// Middleware pipeline settings
    pub pipeline: PipelineConfig,
    /// Tool runner settings
    pub runner: RunnerConfig,
    /// Settings handed to every tool
    pub tools: ToolsConfig,
    /// In-process log buffer settings
    pub logging: LoggingConfig,
    /// Speculative pre-execution settings
    pub speculative: SpeculativeConfig,
    /// Telemetry sink settings
    pub telemetry: TelemetryConfig,
}

/// Middleware pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum invocations of one command within a one-second window.
    pub rate_limit_per_second: usize,
    /// Commands that produce an audit record.
    pub audited_commands: Vec<String>,
    /// Commands the permission check rejects.
    pub denied_commands: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: 10,
            audited_commands: [
                "git.commit",
                "git.stage",
                "git.resolveConflicts",
                "cleanup.apply",
                "agent.delegate",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            denied_commands: Vec::new(),
        }
    }
}

/// Tool runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Attempts made to obtain a model provider before giving up.
    pub provider_retry_attempts: u32,
    /// Fixed delay between provider attempts, in milliseconds.
    pub provider_retry_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { provider_retry_attempts: 3, provider_retry_delay_ms: 500 }
    }
}

impl RunnerConfig {
    /// Delay between provider attempts.
    pub fn provider_retry_delay(&self) -> Duration {
        Duration::from_millis(self.provider_retry_delay_ms)
    }
}

/// Settings shared by all tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Concurrency ceiling of the batch helper.
    pub batch_concurrency: usize,
    /// Default deadline of a model request, in seconds.
    pub model_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { batch_concurrency: 4, model_timeout_secs: 60 }
    }
}

impl ToolsConfig {
    /// Default deadline of a model request.
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// In-process log buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Number of entries the log buffer retains.
    pub capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { capacity: crate::logging::DEFAULT_LOG_CAPACITY }
    }
}

/// Speculative pre-execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeculativeConfig {
    /// Whether tools are pre-started when a workflow is matched.
    pub enabled: bool,
}

impl Default for SpeculativeConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSONL file receiving telemetry events; relative paths resolve against
    /// the workspace root. Absent means telemetry is discarded.
    pub path: Option<PathBuf>,
}

impl LodestarConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|source| CoreError::ConfigParse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns the TOML error if the content does not parse.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let value: toml::Value = toml::from_str(content)?;
        let value = match value.get("lodestar") {
            Some(section) => section.clone(),
            None => value,
        };
        value.try_into()
    }

    /// Loads `<workspace>/.lodestar/config.toml`, or defaults if it does not exist.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be loaded.
    pub fn discover(workspace_root: &Path) -> Result<Self> {
        let path = Self::config_path(workspace_root);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "Loading workspace config");
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Location of the workspace config file.
    pub fn config_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Rejects values the orchestrator cannot work with.
    ///
    /// # Errors
    /// Returns `CoreError::Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.rate_limit_per_second == 0 {
            return Err(CoreError::Config(
                "pipeline.rate_limit_per_second must be at least 1".to_string(),
            ));
        }
        if self.tools.batch_concurrency == 0 {
            return Err(CoreError::Config("tools.batch_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Serializes the configuration as pretty TOML.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }
}
