use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::rules::{Consequence, Rule};
use crate::config::types::Severity;
use crate::engine::conditions::ConditionEvaluator;
use crate::engine::facts::Fact;

/// A concrete rule match, optionally tied to a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Condition kind that produced the match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    /// Provenance of the matched fact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Findings plus the rules that were actually evaluated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCoverage {
    pub findings: Vec<Finding>,
    /// Sorted, de-duplicated rule ids
    pub rules_evaluated: Vec<String>,
}

/// Matches a rule set against facts
pub struct RuleEvaluator {
    condition_evaluator: ConditionEvaluator,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            condition_evaluator: ConditionEvaluator::new(),
        }
    }

    /// Findings in rule declaration order, then fact order
    pub fn evaluate(&mut self, rules: &[Rule], facts: &[Fact]) -> Vec<Finding> {
        self.evaluate_with_coverage(rules, facts).findings
    }

    pub fn evaluate_with_coverage(&mut self, rules: &[Rule], facts: &[Fact]) -> RuleCoverage {
        let mut findings = Vec::new();
        let mut rules_evaluated = Vec::with_capacity(rules.len());

        for rule in rules {
            rules_evaluated.push(rule.id.clone());
            let before = findings.len();
            self.evaluate_rule(rule, facts, &mut findings);
            trace!(rule_id = %rule.id, matches = findings.len() - before, "Rule evaluated");
        }

        rules_evaluated.sort();
        rules_evaluated.dedup();

        debug!(
            "Evaluated {} rules against {} facts: {} findings",
            rules_evaluated.len(),
            facts.len(),
            findings.len()
        );

        RuleCoverage {
            findings,
            rules_evaluated,
        }
    }

    fn evaluate_rule(&mut self, rule: &Rule, facts: &[Fact], findings: &mut Vec<Finding>) {
        let Consequence::Finding { message, code } = &rule.then;
        let code = code.clone().unwrap_or_else(|| rule.id.clone());
        let scope = rule.scope.as_ref();
        let matched_by = rule.when.kind_name().to_string();

        match self
            .condition_evaluator
            .matching_facts(&rule.when, facts, scope)
        {
            // Leaf condition: one finding per matching fact
            Some(matches) => {
                findings.extend(matches.into_iter().map(|fact| Finding {
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    code: code.clone(),
                    message: message.clone(),
                    file_path: fact.target_path().map(str::to_string),
                    matched_by: Some(matched_by.clone()),
                    source: Some(fact.source().to_string()),
                }));
            }
            // Composite condition: at most one untargeted finding
            None => {
                if self.condition_evaluator.evaluate(&rule.when, facts, scope) {
                    findings.push(Finding {
                        rule_id: rule.id.clone(),
                        severity: rule.severity,
                        code,
                        message: message.clone(),
                        file_path: None,
                        matched_by: Some(matched_by),
                        source: None,
                    });
                }
            }
        }
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn evaluate_rules(rules: &[Rule], facts: &[Fact]) -> Vec<Finding> {
    RuleEvaluator::new().evaluate(rules, facts)
}

pub fn evaluate_rules_with_coverage(rules: &[Rule], facts: &[Fact]) -> RuleCoverage {
    RuleEvaluator::new().evaluate_with_coverage(rules, facts)
}
