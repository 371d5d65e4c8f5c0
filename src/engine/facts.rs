//! Facts - immutable observations about repository state.
//!
//! Facts are produced once per evaluation cycle by external collectors
//! (diff readers, dependency scanners, heuristic analyzers) and handed to
//! the rule evaluator as a flat list. Nothing in the engine mutates them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::types::Severity;
use crate::Result;

/// Kind of change recorded by a `FileChange` fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A single observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fact {
    /// A path touched by the change set
    FileChange {
        path: String,
        change_type: ChangeType,
        #[serde(default = "default_source")]
        source: String,
    },

    /// Full content of a file in the change set
    FileContent {
        path: String,
        content: String,
        #[serde(default = "default_source")]
        source: String,
    },

    /// An import/dependency edge between two modules
    Dependency {
        from: String,
        to: String,
        #[serde(default = "default_source")]
        source: String,
    },

    /// A hit reported by an external heuristic analyzer
    Heuristic {
        rule_id: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
        #[serde(default = "default_source")]
        source: String,
    },
}

fn default_source() -> String {
    "unknown".to_string()
}

impl Fact {
    /// Provenance of the fact
    pub fn source(&self) -> &str {
        match self {
            Fact::FileChange { source, .. }
            | Fact::FileContent { source, .. }
            | Fact::Dependency { source, .. }
            | Fact::Heuristic { source, .. } => source,
        }
    }

    /// The file a finding derived from this fact should point at
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Fact::FileChange { path, .. } | Fact::FileContent { path, .. } => Some(path),
            Fact::Dependency { from, .. } => Some(from),
            Fact::Heuristic { file_path, .. } => file_path.as_deref(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Fact::FileChange { .. } => "file_change",
            Fact::FileContent { .. } => "file_content",
            Fact::Dependency { .. } => "dependency",
            Fact::Heuristic { .. } => "heuristic",
        }
    }
}

/// Load a fact list from a JSON file (`[{"kind": "file_change", ...}, ...]`)
pub fn load_facts(path: &Path) -> Result<Vec<Fact>> {
    let content = std::fs::read_to_string(path)?;
    let facts: Vec<Fact> = serde_json::from_str(&content)?;
    Ok(facts)
}
