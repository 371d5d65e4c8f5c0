//! Persistence of guard state between processes.
//!
//! The default store keeps its keys in the repository's own git config, so
//! no extra storage is introduced.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, trace};

use super::guard::DirtyTreeRecord;

const KEY_ACTIVE: &str = "govern.guard.dirtyTreeActive";
const KEY_STAGED: &str = "govern.guard.dirtyTreeStaged";
const KEY_WORKING: &str = "govern.guard.dirtyTreeWorking";
const KEY_UNIQUE: &str = "govern.guard.dirtyTreeUnique";
const KEY_NOTIFIED: &str = "govern.guard.lastDirtyTreeNotification";

#[async_trait]
pub trait GuardStateStore: Send + Sync {
    async fn load_dirty_tree(&self) -> Result<Option<DirtyTreeRecord>>;

    async fn save_dirty_tree(&self, record: &DirtyTreeRecord) -> Result<()>;

    async fn clear_dirty_tree(&self) -> Result<()>;

    /// Store identifier for logging
    fn name(&self) -> &'static str;
}

/// Stores guard state under `govern.guard.*` with `git config --local`
pub struct GitConfigStore {
    repo_root: PathBuf,
}

impl GitConfigStore {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            repo_root: repo_root.as_ref().to_path_buf(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo_root).arg("config").arg("--local");
        cmd
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let output = self
            .command()
            .args(["--get", key])
            .output()
            .await
            .context("Failed to run git config")?;

        // Exit code 1 means the key is not set
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            Some(1) => Ok(None),
            _ => bail!(
                "git config --get {} failed: {}",
                key,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let output = self
            .command()
            .args([key, value])
            .output()
            .await
            .context("Failed to run git config")?;
        if !output.status.success() {
            bail!(
                "git config {} failed: {}",
                key,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        trace!("git config {}={}", key, value);
        Ok(())
    }

    async fn unset(&self, key: &str) -> Result<()> {
        let output = self
            .command()
            .args(["--unset", key])
            .output()
            .await
            .context("Failed to run git config")?;

        // Exit code 5 means the key was already absent
        match output.status.code() {
            Some(0) | Some(5) => Ok(()),
            _ => bail!(
                "git config --unset {} failed: {}",
                key,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    async fn get_count(&self, key: &str) -> Result<usize> {
        Ok(self
            .get(key)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }
}

#[async_trait]
impl GuardStateStore for GitConfigStore {
    async fn load_dirty_tree(&self) -> Result<Option<DirtyTreeRecord>> {
        let Some(active) = self.get(KEY_ACTIVE).await? else {
            return Ok(None);
        };

        let last_notified = self
            .get(KEY_NOTIFIED)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc));

        let record = DirtyTreeRecord {
            active: active == "true",
            staged: self.get_count(KEY_STAGED).await?,
            working: self.get_count(KEY_WORKING).await?,
            unique: self.get_count(KEY_UNIQUE).await?,
            last_notified,
        };
        debug!("Loaded dirty-tree record from git config: {:?}", record);
        Ok(Some(record))
    }

    async fn save_dirty_tree(&self, record: &DirtyTreeRecord) -> Result<()> {
        self.set(KEY_ACTIVE, if record.active { "true" } else { "false" })
            .await?;
        self.set(KEY_STAGED, &record.staged.to_string()).await?;
        self.set(KEY_WORKING, &record.working.to_string()).await?;
        self.set(KEY_UNIQUE, &record.unique.to_string()).await?;
        match record.last_notified {
            Some(at) => self.set(KEY_NOTIFIED, &at.to_rfc3339()).await?,
            None => self.unset(KEY_NOTIFIED).await?,
        }
        Ok(())
    }

    async fn clear_dirty_tree(&self) -> Result<()> {
        for key in [KEY_ACTIVE, KEY_STAGED, KEY_WORKING, KEY_UNIQUE, KEY_NOTIFIED] {
            self.unset(key).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "git-config"
    }
}

/// Process-local store, used when the guard runs outside a git checkout
#[derive(Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<DirtyTreeRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<DirtyTreeRecord> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl GuardStateStore for MemoryStateStore {
    async fn load_dirty_tree(&self) -> Result<Option<DirtyTreeRecord>> {
        Ok(self.snapshot())
    }

    async fn save_dirty_tree(&self, record: &DirtyTreeRecord) -> Result<()> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(record.clone());
        Ok(())
    }

    async fn clear_dirty_tree(&self) -> Result<()> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
