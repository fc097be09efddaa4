//! Workspace and configuration resolution shared by all commands.

use anyhow::Context;
use lodestar_core::LodestarConfig;
use std::path::PathBuf;

/// Resolved workspace root and effective configuration.
#[derive(Debug)]
pub struct CliContext {
    pub workspace: PathBuf,
    pub config: LodestarConfig,
}

impl CliContext {
    /// Uses the explicit workspace or the current directory, then loads the
    /// explicit config file or discovers one inside the workspace.
    pub fn resolve(workspace: Option<PathBuf>, config: Option<PathBuf>) -> anyhow::Result<Self> {
        let workspace = match workspace {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        if !workspace.is_dir() {
            anyhow::bail!("workspace not found: {}", workspace.display());
        }
        let workspace = workspace.canonicalize().unwrap_or(workspace);

        let config = match config {
            Some(path) => LodestarConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => LodestarConfig::discover(&workspace)?,
        };
        Ok(Self { workspace, config })
    }
}
