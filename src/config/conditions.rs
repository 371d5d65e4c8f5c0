use serde::{Deserialize, Serialize};

use crate::engine::facts::ChangeType;

/// Predicate over the fact list.
///
/// Leaf kinds inspect one fact kind each and carry an optional `where`
/// filter; `all`/`any`/`not` combine child conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Example: { type: file_change, where: { path_prefix: "src/domain/", change_type: added } }
    FileChange {
        #[serde(default, rename = "where")]
        filter: FileChangeFilter,
    },

    /// Example: { type: file_content, contains: ["console.log"], regex: ["TODO\\(\\w+\\)"] }
    FileContent {
        /// Every token must be a substring of the content
        #[serde(default)]
        contains: Vec<String>,
        /// Every pattern must match the content
        #[serde(default)]
        regex: Vec<String>,
        #[serde(default, rename = "where")]
        filter: PathFilter,
    },

    /// Example: { type: dependency, where: { from: "domain", to: "infrastructure" } }
    Dependency {
        #[serde(default, rename = "where")]
        filter: DependencyFilter,
    },

    /// Example: { type: heuristic, where: { rule_id: "ios.force_unwrap" } }
    Heuristic {
        #[serde(default, rename = "where")]
        filter: HeuristicFilter,
    },

    /// Logical AND (vacuously true when empty)
    All { conditions: Vec<Condition> },

    /// Logical OR (false when empty)
    Any { conditions: Vec<Condition> },

    /// Logical NOT
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Leaf conditions can enumerate the individual facts they match
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Condition::FileChange { .. }
                | Condition::FileContent { .. }
                | Condition::Dependency { .. }
                | Condition::Heuristic { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Condition::FileChange { .. } => "file_change",
            Condition::FileContent { .. } => "file_content",
            Condition::Dependency { .. } => "dependency",
            Condition::Heuristic { .. } => "heuristic",
            Condition::All { .. } => "all",
            Condition::Any { .. } => "any",
            Condition::Not { .. } => "not",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileChangeFilter {
    /// Literal path prefix (not a glob)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Matches codes starting with this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

/// Path scope for content conditions. Exclude wins over include; an empty
/// include list admits every path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}
