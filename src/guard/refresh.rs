use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// External collaborator that regenerates the evidence snapshot
#[async_trait]
pub trait EvidenceRefresher: Send + Sync {
    /// Whether the refresh command can be run at all
    fn is_available(&self) -> bool;

    /// Regenerate the evidence. Output is never used for control flow.
    async fn refresh(&self) -> Result<()>;
}

/// Runs a refresh script from the repository root
pub struct ScriptRefresher {
    program: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ScriptRefresher {
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        working_dir: impl AsRef<Path>,
        timeout: Duration,
    ) -> Self {
        Self {
            program,
            args,
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl EvidenceRefresher for ScriptRefresher {
    fn is_available(&self) -> bool {
        // Bare names resolve through PATH at spawn time
        if self.program.components().count() == 1 && !self.program.is_absolute() {
            return true;
        }
        self.program.is_file()
    }

    async fn refresh(&self) -> Result<()> {
        debug!("Running evidence refresh: {}", self.program.display());

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .context("Evidence refresh timed out")?
            .context("Failed to wait for evidence refresh")?;

        if !output.status.success() {
            bail!(
                "Evidence refresh exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
