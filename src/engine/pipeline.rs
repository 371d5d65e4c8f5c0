use std::path::Path;
use tracing::debug;

use crate::config::loader::RuleLoader;
use crate::config::types::Stage;
use crate::engine::evaluation::evaluate_rules_with_coverage;
use crate::engine::facts::load_facts;
use crate::engine::gate::GateReport;
use crate::Result;

/// Load rules and facts from disk and gate them at one stage
pub fn run_gate(rules_path: &Path, facts_path: &Path, stage: Stage, strict: bool) -> Result<GateReport> {
    let loader = if strict {
        RuleLoader::new().with_strict_validation()
    } else {
        RuleLoader::new()
    };

    let rule_file = loader.load_rule_file(rules_path)?;
    let policy = rule_file.policy_for(stage);
    let rules = rule_file.rules_for(&policy);
    let facts = load_facts(facts_path)?;
    debug!(
        "Gating {} facts against {} rules at {}",
        facts.len(),
        rules.len(),
        stage
    );

    let coverage = evaluate_rules_with_coverage(&rules, &facts);
    Ok(GateReport::build(policy, coverage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gate::GateOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_gate_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.yml");
        let facts = dir.path().join("facts.json");

        std::fs::write(
            &rules,
            r#"
rules:
  - id: backend.no-console
    severity: WARN
    when: { type: file_content, contains: ["console.log"] }
    then: { kind: finding, message: Remove console.log before pushing }
"#,
        )
        .unwrap();
        std::fs::write(
            &facts,
            r#"[
  {"kind": "file_content", "path": "src/a.ts", "content": "console.log(1)", "source": "fs"},
  {"kind": "file_content", "path": "src/b.ts", "content": "export {}", "source": "fs"}
]"#,
        )
        .unwrap();

        let report = run_gate(&rules, &facts, Stage::PrePush, false).unwrap();
        assert_eq!(report.outcome, GateOutcome::Warn);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].file_path.as_deref(), Some("src/a.ts"));
        assert_eq!(report.rules_evaluated, vec!["backend.no-console"]);
    }

    #[test]
    fn test_missing_rule_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_gate(
            &dir.path().join("absent.yml"),
            &dir.path().join("facts.json"),
            Stage::Ci,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read rule file"));
    }
}
