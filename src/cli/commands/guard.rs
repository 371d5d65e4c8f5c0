use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CommandContext, CommandHandler, CommandResult};
use crate::guard::{GitCli, GitStateProvider, GuardCollaborators, RealtimeGuard, TreeStatus};
use crate::Result;

/// Fallback spacing of activity checks when both monitors are off
const ACTIVITY_FALLBACK: Duration = Duration::from_secs(30);

pub struct GuardCommand {
    pub once: bool,
}

#[async_trait]
impl CommandHandler for GuardCommand {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult> {
        let mut settings = context.settings.guard.clone();
        if self.once {
            // A single check reports only; refreshes belong to the monitor loop
            settings.auto_refresh_enabled = false;
        }

        let evidence_path = settings.evidence_file(&context.repo_root);
        let collaborators = GuardCollaborators::for_repo(&context.repo_root, &settings)?;
        let guard = RealtimeGuard::new(settings, evidence_path, collaborators);
        guard.restore_persisted_state().await;

        let stale = guard.evaluate_evidence_age("startup", None);
        let tree = guard.evaluate_git_tree().await;

        if self.once {
            let dirty = matches!(tree, TreeStatus::Dirty { .. });
            return Ok(match (stale, dirty) {
                (false, false) => CommandResult::Success(Some("Evidence fresh, tree clean".into())),
                (true, false) => CommandResult::Warning("Evidence is stale".into()),
                (false, true) => CommandResult::Warning("Working tree exceeds limits".into()),
                (true, true) => CommandResult::Warning(
                    "Evidence is stale and working tree exceeds limits".into(),
                ),
            });
        }

        let polling = guard.start_evidence_polling();
        let monitoring = guard.start_git_tree_monitoring();
        if !polling && !monitoring {
            warn!("Both guard monitors are disabled by configuration");
            return Ok(CommandResult::Success(Some("Nothing to monitor".into())));
        }

        info!("Guard running; press Ctrl-C to stop");
        let activity = track_user_activity(guard.clone(), Arc::new(GitCli::new(&context.repo_root)));

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }

        activity.abort();
        guard.stop();
        Ok(CommandResult::Success(Some("Guard stopped".into())))
    }

    fn name(&self) -> &'static str {
        "guard"
    }
}

/// Record user activity whenever the working tree counts change
fn track_user_activity(
    guard: RealtimeGuard,
    git: Arc<dyn GitStateProvider>,
) -> tokio::task::JoinHandle<()> {
    let settings = guard.settings();
    let period = [settings.git_tree_interval, settings.evidence_poll_interval]
        .into_iter()
        .filter(|d| !d.is_zero())
        .min()
        .unwrap_or(ACTIVITY_FALLBACK);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut last = None;
        loop {
            interval.tick().await;
            match git.git_tree_state().await {
                Ok(state) => {
                    if last.is_some_and(|previous| previous != state) {
                        guard.record_user_activity();
                    }
                    last = Some(state);
                }
                Err(e) => debug!("Activity check skipped: {:#}", e),
            }
        }
    })
}
