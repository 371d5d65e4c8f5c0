use serde::{Deserialize, Serialize};

use super::types::{Severity, Stage};

/// Severity thresholds applied at one workflow stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub stage: Stage,
    pub block_on_or_above: Severity,
    pub warn_on_or_above: Severity,
    /// Severity given to rules that do not declare one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_severity: Option<Severity>,
}

impl GatePolicy {
    /// Built-in thresholds for a stage
    pub fn for_stage(stage: Stage) -> Self {
        let default_severity = match stage {
            Stage::Staged => Some(Severity::Info),
            Stage::PreCommit | Stage::PrePush | Stage::Ci => Some(Severity::Warn),
        };

        Self {
            stage,
            block_on_or_above: Severity::Error,
            warn_on_or_above: Severity::Warn,
            default_severity,
        }
    }

    pub fn effective_default_severity(&self) -> Severity {
        self.default_severity.unwrap_or(Severity::Warn)
    }

    /// Apply a partial override from a rule file
    pub fn with_override(mut self, override_: &PolicyOverride) -> Self {
        if let Some(block) = override_.block_on_or_above {
            self.block_on_or_above = block;
        }
        if let Some(warn) = override_.warn_on_or_above {
            self.warn_on_or_above = warn;
        }
        if override_.default_severity.is_some() {
            self.default_severity = override_.default_severity;
        }
        self
    }
}

/// Per-stage threshold override; absent fields keep the built-in value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default)]
    pub block_on_or_above: Option<Severity>,
    #[serde(default)]
    pub warn_on_or_above: Option<Severity>,
    #[serde(default)]
    pub default_severity: Option<Severity>,
}
