use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use super::{CommandContext, CommandHandler, CommandResult};
use crate::cli::app::OutputFormat;
use crate::guard::evidence::{read_evidence_timestamp, validate_evidence_value};
use crate::guard::notify::format_duration;
use crate::state::guard::elapsed;
use crate::Result;

pub struct EvidenceCommand {
    pub path: Option<PathBuf>,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct EvidenceStatus {
    path: PathBuf,
    exists: bool,
    age_ms: Option<u64>,
    stale: bool,
    issues: Vec<String>,
}

#[async_trait]
impl CommandHandler for EvidenceCommand {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult> {
        let guard = &context.settings.guard;
        let path = match &self.path {
            Some(path) => context.resolve(path),
            None => guard.evidence_file(&context.repo_root),
        };

        let exists = path.is_file();
        let issues = if exists {
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()))
            {
                Ok(value) => validate_evidence_value(&value),
                Err(e) => vec![format!("evidence is unreadable: {}", e)],
            }
        } else {
            vec!["evidence file is missing".to_string()]
        };

        let age = read_evidence_timestamp(&path).map(|at| elapsed(Utc::now(), at));
        let stale = age.map_or(true, |age| age > guard.stale_threshold);
        let status = EvidenceStatus {
            path,
            exists,
            age_ms: age.map(|age| age.as_millis() as u64),
            stale,
            issues,
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            OutputFormat::Text => {
                println!("Evidence: {}", status.path.display());
                match age {
                    Some(age) => println!(
                        "  Age: {} ({}, threshold {})",
                        format_duration(age),
                        if stale { "STALE" } else { "fresh" },
                        format_duration(guard.stale_threshold)
                    ),
                    None => println!("  Age: unknown (STALE)"),
                }
                if status.issues.is_empty() {
                    println!("  Contract: valid");
                } else {
                    println!("  Contract: {} issue(s)", status.issues.len());
                    for issue in &status.issues {
                        println!("    - {}", issue);
                    }
                }
            }
        }

        Ok(if !status.issues.is_empty() {
            CommandResult::Blocked(format!("{} evidence contract issue(s)", status.issues.len()))
        } else if stale {
            CommandResult::Warning("Evidence is stale".to_string())
        } else {
            CommandResult::Success(None)
        })
    }

    fn name(&self) -> &'static str {
        "evidence"
    }
}
