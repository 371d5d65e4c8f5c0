use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::GovernError;

/// Finding severity, ordered `Info < Warn < Error < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warn", alias = "WARNING", alias = "warning")]
    Warn,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "critical")]
    Critical,
}

impl Severity {
    /// All levels in ascending order
    pub fn all() -> [Self; 4] {
        [Self::Info, Self::Warn, Self::Error, Self::Critical]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// True when `severity` is at or above `threshold`
pub fn is_severity_at_least(severity: Severity, threshold: Severity) -> bool {
    severity >= threshold
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = GovernError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(GovernError::Config(format!("Unknown severity '{}'", other))),
        }
    }
}

/// Workflow points where the gate runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Staged,
    PreCommit,
    PrePush,
    Ci,
}

impl Stage {
    pub fn all() -> [Self; 4] {
        [Self::Staged, Self::PreCommit, Self::PrePush, Self::Ci]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "STAGED",
            Self::PreCommit => "PRE_COMMIT",
            Self::PrePush => "PRE_PUSH",
            Self::Ci => "CI",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = GovernError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "STAGED" => Ok(Self::Staged),
            "PRE_COMMIT" => Ok(Self::PreCommit),
            "PRE_PUSH" => Ok(Self::PrePush),
            "CI" => Ok(Self::Ci),
            other => Err(GovernError::Config(format!("Unknown stage '{}'", other))),
        }
    }
}
