use super::{BlameRange, CommitSummary, RepositoryAccess};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Field separator used in `git log` output.
const LOG_SEPARATOR: char = '\u{1f}';

/// [`RepositoryAccess`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Creates an accessor for the repository at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root the commands run in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        debug!(root = %self.root.display(), args = ?args, "Running git");
        let output = Command::new("git").args(args).current_dir(&self.root).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(CoreError::Vcs {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Parses `git status --porcelain` output into paths.
fn parse_porcelain(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // renames are reported as "old -> new"
            let path = path.rsplit(" -> ").next().unwrap_or(path);
            PathBuf::from(path.trim_matches('"'))
        })
        .collect()
}

fn parse_log(output: &str) -> Vec<CommitSummary> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, LOG_SEPARATOR);
            Some(CommitSummary {
                hash: parts.next()?.to_string(),
                author: parts.next()?.to_string(),
                subject: parts.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Collapses `git blame --porcelain` headers into contiguous ranges.
fn parse_blame(output: &str) -> Vec<BlameRange> {
    let mut ranges: Vec<BlameRange> = Vec::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(commit), Some(_orig), Some(final_line)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if commit.len() != 40 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }
        let Ok(final_line) = final_line.parse::<u32>() else {
            continue;
        };
        match ranges.last_mut() {
            Some(last) if last.commit == commit && last.end_line + 1 == final_line => {
                last.end_line = final_line;
            }
            _ => ranges.push(BlameRange {
                commit: commit.to_string(),
                start_line: final_line,
                end_line: final_line,
            }),
        }
    }
    ranges
}

#[async_trait]
impl RepositoryAccess for GitCli {
    async fn changed_files(&self) -> Result<Vec<PathBuf>> {
        let output = self.git(&["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&output))
    }

    async fn diff(&self, base: Option<&str>) -> Result<String> {
        match base {
            Some(base) => self.git(&["diff", base]).await,
            None => self.git(&["diff", "HEAD"]).await,
        }
    }

    async fn log(&self, limit: usize) -> Result<Vec<CommitSummary>> {
        let count = format!("-{limit}");
        let format = format!("--pretty=format:%H{LOG_SEPARATOR}%an{LOG_SEPARATOR}%s");
        let output = self.git(&["log", &count, &format]).await?;
        Ok(parse_log(&output))
    }

    async fn blame(&self, path: &Path, lines: RangeInclusive<u32>) -> Result<Vec<BlameRange>> {
        let range = format!("{},{}", lines.start(), lines.end());
        let path = path.to_string_lossy();
        let output = self.git(&["blame", "--porcelain", "-L", &range, "--", &path]).await?;
        Ok(parse_blame(&output))
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git(&args).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        self.git(&["commit", "-m", message]).await?;
        let hash = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(hash.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain_handles_renames() {
        let output = " M src/lib.rs\n?? notes.md\nR  old.rs -> new.rs\n";
        let files = parse_porcelain(output);
        assert_eq!(
            files,
            vec![PathBuf::from("src/lib.rs"), PathBuf::from("notes.md"), PathBuf::from("new.rs")]
        );
    }

    #[test]
    fn test_parse_log() {
        let output = format!("abc{0}Ada{0}Fix parser\ndef{0}Bob{0}Add tests", LOG_SEPARATOR);
        let log = parse_log(&output);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].author, "Ada");
        assert_eq!(log[1].subject, "Add tests");
    }

    #[test]
    fn test_parse_blame_merges_contiguous_lines() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let output = format!(
            "{a} 1 1 2\nauthor Ada\n\tline one\n{a} 2 2\n\tline two\n{b} 5 3 1\nauthor Bob\n\tline three\n"
        );
        let ranges = parse_blame(&output);
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start_line, ranges[0].end_line), (1, 2));
        assert_eq!(ranges[1].commit, b);
        assert_eq!(ranges[1].start_line, 3);
    }

    #[tokio::test]
    async fn test_git_outside_repository_reports_vcs_error() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        match git.changed_files().await {
            Err(CoreError::Vcs { command, .. }) => assert_eq!(command, "status"),
            // git may be missing on the host entirely
            Err(CoreError::Io(_)) => {}
            other => panic!("expected a git failure, got {other:?}"),
        }
    }
}
