use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::conditions::Condition;
use super::policy::{GatePolicy, PolicyOverride};
use super::rules::{Consequence, Rule, RuleDefinition};
use super::types::Stage;
use crate::{GovernError, Result};

/// Rule file structure (YAML)
///
/// ```yaml
/// policies:
///   PRE_PUSH: { warn_on_or_above: INFO }
/// rules:
///   - id: backend.no-console
///     severity: WARN
///     when: { type: file_content, contains: ["console.log"] }
///     then: { kind: finding, message: "Remove console.log before pushing" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub policies: HashMap<Stage, PolicyOverride>,

    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleFile {
    /// Stage policy with any file-level override applied
    pub fn policy_for(&self, stage: Stage) -> GatePolicy {
        let policy = GatePolicy::for_stage(stage);
        match self.policies.get(&stage) {
            Some(override_) => policy.with_override(override_),
            None => policy,
        }
    }

    /// Concrete rules for a policy, filling missing severities from it
    pub fn rules_for(&self, policy: &GatePolicy) -> Vec<Rule> {
        let default_severity = policy.effective_default_severity();
        self.rules
            .iter()
            .cloned()
            .map(|definition| definition.into_rule(default_severity))
            .collect()
    }
}

/// Loads and validates rule files
pub struct RuleLoader {
    /// Reject files that declare no rules
    strict: bool,
}

impl RuleLoader {
    pub fn new() -> Self {
        Self { strict: false }
    }

    pub fn with_strict_validation(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn load_rule_file<P: AsRef<Path>>(&self, path: P) -> Result<RuleFile> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GovernError::Config(format!("Failed to read rule file {}: {}", path.display(), e))
        })?;
        self.parse(&contents).map_err(|e| match e {
            GovernError::Config(msg) => {
                GovernError::Config(format!("{} (in {})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn parse(&self, contents: &str) -> Result<RuleFile> {
        let file: RuleFile = serde_yaml_ng::from_str(contents)?;
        self.validate(&file)?;
        Ok(file)
    }

    fn validate(&self, file: &RuleFile) -> Result<()> {
        if self.strict && file.rules.is_empty() {
            return Err(GovernError::Config("Rule file declares no rules".to_string()));
        }

        let mut seen = HashSet::new();
        for (index, rule) in file.rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(GovernError::Config(format!(
                    "Rule at index {} has empty id",
                    index
                )));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(GovernError::Config(format!(
                    "Duplicate rule id '{}'",
                    rule.id
                )));
            }

            let Consequence::Finding { message, .. } = &rule.then;
            if message.trim().is_empty() {
                return Err(GovernError::Config(format!(
                    "Rule '{}' has an empty finding message",
                    rule.id
                )));
            }

            self.validate_condition(&rule.when, &rule.id)?;
        }

        for (stage, override_) in &file.policies {
            let policy = GatePolicy::for_stage(*stage).with_override(override_);
            if policy.warn_on_or_above > policy.block_on_or_above {
                return Err(GovernError::Config(format!(
                    "Policy for {} warns above its block threshold ({} > {})",
                    stage, policy.warn_on_or_above, policy.block_on_or_above
                )));
            }
        }

        Ok(())
    }

    fn validate_condition(&self, condition: &Condition, rule_id: &str) -> Result<()> {
        match condition {
            Condition::FileContent { regex, .. } => {
                for pattern in regex {
                    regex::Regex::new(pattern).map_err(|e| {
                        GovernError::Config(format!(
                            "Rule '{}' has invalid regex '{}': {}",
                            rule_id, pattern, e
                        ))
                    })?;
                }
                Ok(())
            }
            Condition::All { conditions } | Condition::Any { conditions } => conditions
                .iter()
                .try_for_each(|child| self.validate_condition(child, rule_id)),
            Condition::Not { condition } => self.validate_condition(condition, rule_id),
            Condition::FileChange { .. }
            | Condition::Dependency { .. }
            | Condition::Heuristic { .. } => Ok(()),
        }
    }
}

impl Default for RuleLoader {
    fn default() -> Self {
        Self::new()
    }
}
