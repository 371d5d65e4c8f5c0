use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::trace;

use crate::config::settings::GitTreeLimits;

/// Size of the uncommitted change set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitTreeState {
    pub staged: usize,
    pub working: usize,
    /// Distinct files across staged, working and untracked
    pub unique: usize,
}

impl GitTreeState {
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.working == 0 && self.unique == 0
    }
}

#[async_trait]
pub trait GitStateProvider: Send + Sync {
    async fn git_tree_state(&self) -> Result<GitTreeState>;
}

/// True when any enabled limit is strictly exceeded. A zero limit is disabled.
pub fn is_tree_beyond_limit(state: &GitTreeState, limits: &GitTreeLimits) -> bool {
    !exceeded_limits(state, limits).is_empty()
}

/// Human-readable description of each exceeded limit
pub fn exceeded_limits(state: &GitTreeState, limits: &GitTreeLimits) -> Vec<String> {
    [
        ("staged", state.staged, limits.staged),
        ("unstaged", state.working, limits.unstaged),
        ("total", state.unique, limits.total),
    ]
    .into_iter()
    .filter(|(_, count, limit)| *limit > 0 && *count as u64 > *limit)
    .map(|(label, count, limit)| format!("{} {} (limit {})", count, label, limit))
    .collect()
}

/// Reads change counts from the `git` binary
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            repo_root: repo_root.as_ref().to_path_buf(),
        }
    }

    async fn list(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl GitStateProvider for GitCli {
    async fn git_tree_state(&self) -> Result<GitTreeState> {
        let staged = self.list(&["diff", "--cached", "--name-only"]).await?;
        let working = self.list(&["diff", "--name-only"]).await?;
        let untracked = self
            .list(&["ls-files", "--others", "--exclude-standard"])
            .await?;

        let unique: HashSet<&String> = staged.iter().chain(&working).chain(&untracked).collect();
        let state = GitTreeState {
            staged: staged.len(),
            working: working.len(),
            unique: unique.len(),
        };
        trace!("Git tree state: {:?}", state);
        Ok(state)
    }
}
