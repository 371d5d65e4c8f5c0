use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CommandContext, CommandHandler, CommandResult};
use crate::config::types::Stage;
use crate::metrics::{JsonlMetricsSink, MetricsSink};
use crate::scheduler::{AutonomousScheduler, GateOrchestrator, Orchestrator};
use crate::Result;

pub struct WatchCommand {
    pub stage: Stage,
    pub rules: PathBuf,
    pub facts: PathBuf,
    pub platform: String,
    pub metrics_dir: Option<PathBuf>,
}

#[async_trait]
impl CommandHandler for WatchCommand {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult> {
        let orchestrator: Arc<dyn Orchestrator> = Arc::new(GateOrchestrator::new(
            context.resolve(&self.rules),
            context.resolve(&self.facts),
            context.settings.guard.evidence_file(&context.repo_root),
            self.stage,
            self.platform.clone(),
        ));

        let metrics_dir = match &self.metrics_dir {
            Some(dir) => context.resolve(dir),
            None => context.repo_root.join(".govern").join("metrics"),
        };
        let metrics: Arc<dyn MetricsSink> = Arc::new(JsonlMetricsSink::new(metrics_dir));

        let scheduler = AutonomousScheduler::new(
            context.settings.scheduler.clone(),
            orchestrator,
            metrics,
        );

        // First analysis without waiting a full interval
        scheduler.tick().await;

        if !scheduler.start() {
            return Ok(CommandResult::Warning(
                "Scheduler tick interval is zero; ran a single analysis".into(),
            ));
        }

        info!("Watching gate inputs; press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
        scheduler.stop();

        Ok(CommandResult::Success(Some("Watch stopped".into())))
    }

    fn name(&self) -> &'static str {
        "watch"
    }
}
