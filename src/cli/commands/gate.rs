use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use super::{CommandContext, CommandHandler, CommandResult};
use crate::cli::app::OutputFormat;
use crate::config::types::Stage;
use crate::engine::gate::{GateOutcome, GateReport};
use crate::engine::pipeline::run_gate;
use crate::guard::evidence::{write_snapshot, EvidenceSnapshot};
use crate::Result;

pub struct GateCommand {
    pub stage: Stage,
    pub rules: PathBuf,
    pub facts: PathBuf,
    pub strict: bool,
    pub format: OutputFormat,
    pub evidence_out: Option<PathBuf>,
    pub platform: String,
}

#[async_trait]
impl CommandHandler for GateCommand {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult> {
        let report = run_gate(
            &context.resolve(&self.rules),
            &context.resolve(&self.facts),
            self.stage,
            self.strict,
        )?;

        if let Some(path) = &self.evidence_out {
            let path = context.resolve(path);
            let session_id = uuid::Uuid::new_v4().to_string();
            let snapshot =
                EvidenceSnapshot::from_findings(session_id, Utc::now(), &report.findings, &self.platform);
            write_snapshot(&path, &snapshot)?;
            info!("Evidence written to {}", path.display());
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print!("{}", render_text(&report)),
        }

        let summary = format!(
            "{}: {} blocking, {} warnings",
            report.outcome,
            report.blocking.len(),
            report.warnings.len()
        );
        Ok(match report.outcome {
            GateOutcome::Pass => CommandResult::Success(None),
            GateOutcome::Warn => CommandResult::Warning(summary),
            GateOutcome::Block => CommandResult::Blocked(summary),
        })
    }

    fn name(&self) -> &'static str {
        "gate"
    }
}

fn render_text(report: &GateReport) -> String {
    let mut out = format!(
        "Gate {}: {} ({} blocking, {} warnings, {} findings, {} rules evaluated)\n",
        report.policy.stage,
        report.outcome,
        report.blocking.len(),
        report.warnings.len(),
        report.findings.len(),
        report.rules_evaluated.len()
    );

    for (label, findings) in [("BLOCK", &report.blocking), ("WARN", &report.warnings)] {
        for finding in findings {
            out.push_str(&format!(
                "  {:<5} {:<8} {:<32} {}{}\n",
                label,
                finding.severity.as_str(),
                finding.code,
                finding
                    .file_path
                    .as_deref()
                    .map(|p| format!("{}: ", p))
                    .unwrap_or_default(),
                finding.message
            ));
        }
    }
    out
}
