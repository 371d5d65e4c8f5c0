//! Orchestrator collaborator - the context engine the scheduler drives
//!
//! Implementations decide when re-analysis is due, run it, and carry out the
//! resulting actions. Failures are reported as errors; the scheduler catches
//! them and never lets them escape a tick.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::action::Action;

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Whether the context changed enough to warrant a new analysis
    async fn should_reanalyze(&self) -> bool;

    /// Run the analysis and return the raw action payload
    async fn analyze_context(&self) -> Result<Value>;

    /// Carry out an `auto-execute` action
    async fn auto_execute(&self, payload: &Value) -> Result<()> {
        info!("Auto-execute requested: {}", payload);
        Ok(())
    }

    /// Surface an `ask` action to the user
    async fn ask(&self, prompt: Option<&str>, _payload: &Value) -> Result<()> {
        info!("Orchestrator asks: {}", prompt.unwrap_or("confirmation required"));
        Ok(())
    }

    /// Identifier for logging
    fn name(&self) -> &'static str;
}

/// Dispatch a parsed action. Never fails; handler errors are logged.
pub async fn dispatch_action(orchestrator: &dyn Orchestrator, action: &Action) {
    let result = match action {
        Action::AutoExecute { payload } => orchestrator.auto_execute(payload).await,
        Action::Ask { prompt, payload } => orchestrator.ask(prompt.as_deref(), payload).await,
        Action::Noop => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(
            "Orchestrator '{}' failed to handle {} action: {:#}",
            orchestrator.name(),
            action,
            e
        );
    }
}
