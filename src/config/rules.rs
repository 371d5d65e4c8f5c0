use serde::{Deserialize, Serialize};

use super::conditions::{Condition, Scope};
use super::types::Severity;

/// A named condition -> consequence pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub severity: Severity,

    pub when: Condition,

    pub then: Consequence,

    /// Path scope applied to content conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

/// What a matching rule produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Consequence {
    Finding {
        message: String,
        /// Defaults to the rule id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// Rule as written in a rule file, where severity may be left to the stage policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    pub when: Condition,

    pub then: Consequence,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl RuleDefinition {
    pub fn into_rule(self, default_severity: Severity) -> Rule {
        Rule {
            id: self.id,
            description: self.description,
            severity: self.severity.unwrap_or(default_severity),
            when: self.when,
            then: self.then,
            scope: self.scope,
        }
    }
}
