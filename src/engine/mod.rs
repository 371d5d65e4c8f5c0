//! Evaluation pipeline: facts -> rule findings -> stage gate.

pub mod conditions;
pub mod evaluation;
pub mod facts;
pub mod gate;
pub mod pipeline;

pub use conditions::{condition_matches, matches_scope, ConditionEvaluator};
pub use evaluation::{evaluate_rules, evaluate_rules_with_coverage, Finding, RuleCoverage, RuleEvaluator};
pub use facts::{load_facts, ChangeType, Fact};
pub use gate::{evaluate_gate, GateOutcome, GateReport, GateResult, SeverityCounts};
pub use pipeline::run_gate;
