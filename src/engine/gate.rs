//! Stage gate: reduces findings to PASS / WARN / BLOCK under a policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::config::policy::GatePolicy;
use crate::config::types::{is_severity_at_least, Severity};
use crate::engine::evaluation::{Finding, RuleCoverage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOutcome {
    Pass,
    Warn,
    Block,
}

impl GateOutcome {
    /// Process exit code for hook integrations; only BLOCK fails
    pub fn exit_code(&self) -> i32 {
        match self {
            GateOutcome::Pass | GateOutcome::Warn => 0,
            GateOutcome::Block => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Pass => "PASS",
            GateOutcome::Warn => "WARN",
            GateOutcome::Block => "BLOCK",
        }
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome plus the disjoint blocking / warning partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub outcome: GateOutcome,
    pub blocking: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

pub fn evaluate_gate(findings: &[Finding], policy: &GatePolicy) -> GateResult {
    let mut blocking = Vec::new();
    let mut warnings = Vec::new();

    for finding in findings {
        if is_severity_at_least(finding.severity, policy.block_on_or_above) {
            blocking.push(finding.clone());
        } else if is_severity_at_least(finding.severity, policy.warn_on_or_above) {
            warnings.push(finding.clone());
        }
    }

    let outcome = if !blocking.is_empty() {
        GateOutcome::Block
    } else if !warnings.is_empty() {
        GateOutcome::Warn
    } else {
        GateOutcome::Pass
    };

    GateResult {
        outcome,
        blocking,
        warnings,
    }
}

/// Machine-readable gate report for CI consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub policy: GatePolicy,
    pub outcome: GateOutcome,
    pub blocking: Vec<Finding>,
    pub warnings: Vec<Finding>,
    /// Every finding, including those below the warn threshold
    pub findings: Vec<Finding>,
    pub rules_evaluated: Vec<String>,
    pub counts: SeverityCounts,
}

impl GateReport {
    pub fn build(policy: GatePolicy, coverage: RuleCoverage) -> Self {
        let result = evaluate_gate(&coverage.findings, &policy);
        let counts = SeverityCounts::tally(&coverage.findings);

        info!(
            stage = %policy.stage,
            outcome = %result.outcome,
            blocking = result.blocking.len(),
            warnings = result.warnings.len(),
            "Gate evaluated"
        );

        Self {
            policy,
            outcome: result.outcome,
            blocking: result.blocking,
            warnings: result.warnings,
            findings: coverage.findings,
            rules_evaluated: coverage.rules_evaluated,
            counts,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Info => counts.info += 1,
                Severity::Warn => counts.warn += 1,
                Severity::Error => counts.error += 1,
                Severity::Critical => counts.critical += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.info + self.warn + self.error + self.critical
    }
}
