use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info};

use super::orchestrator::Orchestrator;
use crate::config::types::Stage;
use crate::engine::gate::{GateOutcome, GateReport};
use crate::engine::pipeline::run_gate;
use crate::guard::evidence::{write_snapshot, EvidenceSnapshot};

/// Re-runs the gate whenever the rule or fact file changes and rewrites the
/// evidence snapshot from the result
pub struct GateOrchestrator {
    rules_path: PathBuf,
    facts_path: PathBuf,
    evidence_path: PathBuf,
    stage: Stage,
    platform: String,
    session_id: String,
    last_analyzed: Mutex<Option<SystemTime>>,
}

impl GateOrchestrator {
    pub fn new(
        rules_path: PathBuf,
        facts_path: PathBuf,
        evidence_path: PathBuf,
        stage: Stage,
        platform: String,
    ) -> Self {
        Self {
            rules_path,
            facts_path,
            evidence_path,
            stage,
            platform,
            session_id: uuid::Uuid::new_v4().to_string(),
            last_analyzed: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Newest modification time of the inputs, `None` if either is missing
    async fn inputs_modified(&self) -> Option<SystemTime> {
        let rules = modified(&self.rules_path).await?;
        let facts = modified(&self.facts_path).await?;
        Some(rules.max(facts))
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()
}

#[async_trait]
impl Orchestrator for GateOrchestrator {
    async fn should_reanalyze(&self) -> bool {
        let Some(modified) = self.inputs_modified().await else {
            debug!("Gate inputs missing, nothing to analyze");
            return false;
        };
        let last = *self
            .last_analyzed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last != Some(modified)
    }

    async fn analyze_context(&self) -> Result<Value> {
        let modified = self.inputs_modified().await;

        // Gate evaluation and the evidence write are plain file IO
        let (rules, facts, evidence) = (
            self.rules_path.clone(),
            self.facts_path.clone(),
            self.evidence_path.clone(),
        );
        let (stage, session_id, platform) =
            (self.stage, self.session_id.clone(), self.platform.clone());
        let report = tokio::task::spawn_blocking(move || -> Result<GateReport> {
            let report =
                run_gate(&rules, &facts, stage, false).context("Gate evaluation failed")?;
            let snapshot =
                EvidenceSnapshot::from_findings(session_id, Utc::now(), &report.findings, &platform);
            write_snapshot(&evidence, &snapshot)
                .with_context(|| format!("Failed to write evidence to {}", evidence.display()))?;
            Ok(report)
        })
        .await
        .context("Gate analysis task did not complete")??;

        *self
            .last_analyzed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = modified;

        info!(
            "Gate {} at {}: {} blocking, {} warnings",
            report.outcome,
            self.stage,
            report.blocking.len(),
            report.warnings.len()
        );

        Ok(match report.outcome {
            GateOutcome::Block => json!({
                "action": "ask",
                "message": format!(
                    "{} blocking finding(s) at {}; fix them before continuing",
                    report.blocking.len(),
                    self.stage
                ),
            }),
            GateOutcome::Warn | GateOutcome::Pass => Value::Null,
        })
    }

    fn name(&self) -> &'static str {
        "gate"
    }
}
