//! Version-control access contract.
//!
//! Tools consume repository data through [`RepositoryAccess`]; the
//! orchestrator treats every call as an opaque async operation and only
//! propagates its errors.

mod git;

pub use git::GitCli;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// One entry of the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Full commit hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// Subject line.
    pub subject: String,
}

/// Consecutive lines attributed to one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameRange {
    /// Commit that last touched the lines.
    pub commit: String,
    /// First line (1-based, inclusive).
    pub start_line: u32,
    /// Last line (1-based, inclusive).
    pub end_line: u32,
}

/// Read and write access to the repository under analysis.
#[async_trait]
pub trait RepositoryAccess: Send + Sync {
    /// Files with staged or unstaged changes, relative to the repository root.
    async fn changed_files(&self) -> Result<Vec<PathBuf>>;

    /// Unified diff of the working tree against `HEAD`, or against `base` if given.
    async fn diff(&self, base: Option<&str>) -> Result<String>;

    /// The most recent `limit` commits, newest first.
    async fn log(&self, limit: usize) -> Result<Vec<CommitSummary>>;

    /// Blame ranges for `lines` of `path`.
    async fn blame(&self, path: &Path, lines: RangeInclusive<u32>) -> Result<Vec<BlameRange>>;

    /// Stages `paths`.
    async fn stage(&self, paths: &[PathBuf]) -> Result<()>;

    /// Creates a commit from the staged changes and returns its hash.
    async fn commit(&self, message: &str) -> Result<String>;
}
