//! Evidence snapshot file model
//!
//! The snapshot is produced by the external refresh collaborator. This module
//! reads it, validates it against the file contract, and can derive one from
//! gate findings for refresh scripts that call back into `govern gate`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::config::types::Severity;
use crate::engine::evaluation::Finding;
use crate::{GovernError, Result};

/// Platforms accepted as the first `rule_id` segment
pub const PLATFORMS: [&str; 4] = ["backend", "frontend", "ios", "android"];

const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "session_id", "ai_gate", "severity_metrics"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl From<Severity> for EvidenceSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => EvidenceSeverity::Critical,
            Severity::Error => EvidenceSeverity::High,
            Severity::Warn => EvidenceSeverity::Medium,
            Severity::Info => EvidenceSeverity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Allowed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: EvidenceSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiGate {
    pub status: GateStatus,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityMetrics {
    #[serde(rename = "CRITICAL")]
    pub critical: usize,
    #[serde(rename = "HIGH")]
    pub high: usize,
    #[serde(rename = "MEDIUM")]
    pub medium: usize,
    #[serde(rename = "LOW")]
    pub low: usize,
    pub total: usize,
}

impl SeverityMetrics {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let mut metrics = Self::default();
        for violation in violations {
            match violation.severity {
                EvidenceSeverity::Critical => metrics.critical += 1,
                EvidenceSeverity::High => metrics.high += 1,
                EvidenceSeverity::Medium => metrics.medium += 1,
                EvidenceSeverity::Low => metrics.low += 1,
            }
        }
        metrics.total = metrics.critical + metrics.high + metrics.medium + metrics.low;
        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    /// ISO-8601 with millisecond precision and `Z` suffix
    pub timestamp: String,
    pub session_id: String,
    pub ai_gate: AiGate,
    pub severity_metrics: SeverityMetrics,
    /// Fields owned by other producers, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvidenceSnapshot {
    /// Build a snapshot, deriving metrics and gate status.
    /// Any CRITICAL or HIGH violation blocks.
    pub fn from_violations(
        session_id: impl Into<String>,
        at: DateTime<Utc>,
        violations: Vec<Violation>,
    ) -> Self {
        let severity_metrics = SeverityMetrics::from_violations(&violations);
        let status = if severity_metrics.critical + severity_metrics.high > 0 {
            GateStatus::Blocked
        } else {
            GateStatus::Allowed
        };

        Self {
            timestamp: format_timestamp(at),
            session_id: session_id.into(),
            ai_gate: AiGate { status, violations },
            severity_metrics,
            extra: Map::new(),
        }
    }

    /// Convert gate findings, prefixing `default_platform` to rule ids that
    /// do not already start with a known platform.
    pub fn from_findings(
        session_id: impl Into<String>,
        at: DateTime<Utc>,
        findings: &[Finding],
        default_platform: &str,
    ) -> Self {
        let violations = findings
            .iter()
            .map(|finding| Violation {
                rule_id: platform_rule_id(&finding.rule_id, default_platform),
                severity: finding.severity.into(),
                message: finding.message.clone(),
                file: finding.file_path.clone(),
                line: None,
            })
            .collect();
        Self::from_violations(session_id, at, violations)
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Every contract breach found in this snapshot; empty when valid
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        match parse_timestamp(&self.timestamp) {
            Some(at) if format_timestamp(at) == self.timestamp => {}
            Some(_) => issues.push(format!(
                "timestamp '{}' is not in canonical ISO-8601 form",
                self.timestamp
            )),
            None => issues.push(format!("timestamp '{}' is not a valid date", self.timestamp)),
        }

        if self.session_id.trim().is_empty() {
            issues.push("session_id is empty".to_string());
        }

        let expected = SeverityMetrics::from_violations(&self.ai_gate.violations);
        let declared = self.severity_metrics;
        if declared.critical + declared.high + declared.medium + declared.low != declared.total {
            issues.push(format!(
                "severity_metrics.total {} does not equal the sum of its counts",
                declared.total
            ));
        }
        if declared != expected {
            issues.push(format!(
                "severity_metrics {:?} do not match violations {:?}",
                declared, expected
            ));
        }

        for (index, violation) in self.ai_gate.violations.iter().enumerate() {
            let platform = violation.rule_id.split('.').next().unwrap_or_default();
            if !PLATFORMS.contains(&platform) || !violation.rule_id.contains('.') {
                issues.push(format!(
                    "violation {} rule_id '{}' must start with one of {}",
                    index,
                    violation.rule_id,
                    PLATFORMS.join("|")
                ));
            }
            if violation.message.chars().count() <= 10 {
                issues.push(format!("violation {} message is too short", index));
            }
            if violation.message.contains("undefined") || violation.message.contains("null") {
                issues.push(format!(
                    "violation {} message contains a placeholder value",
                    index
                ));
            }
        }

        issues
    }
}

/// Validate raw evidence JSON, including null or missing top-level fields
pub fn validate_evidence_value(value: &Value) -> Vec<String> {
    let Some(object) = value.as_object() else {
        return vec!["evidence must be a JSON object".to_string()];
    };

    let mut issues: Vec<String> = object
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| format!("top-level field '{}' is null", k))
        .collect();
    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            issues.push(format!("top-level field '{}' is missing", field));
        }
    }
    if !issues.is_empty() {
        return issues;
    }

    match serde_json::from_value::<EvidenceSnapshot>(value.clone()) {
        Ok(snapshot) => snapshot.validate(),
        Err(e) => vec![format!("evidence does not match the snapshot shape: {}", e)],
    }
}

pub fn load_snapshot(path: &Path) -> Result<EvidenceSnapshot> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GovernError::Evidence(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write a snapshot by replacing the file atomically.
///
/// A snapshot that breaks the evidence contract is refused and the existing
/// file is left untouched.
pub fn write_snapshot(path: &Path, snapshot: &EvidenceSnapshot) -> Result<()> {
    let issues = snapshot.validate();
    if !issues.is_empty() {
        return Err(GovernError::Evidence(format!(
            "Refusing to write {}: {}",
            path.display(),
            issues.join("; ")
        )));
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Evidence timestamp, or `None` when the file is absent, unparsable, or
/// carries an invalid date. Never fails.
pub fn read_evidence_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("Evidence file {} unreadable: {}", path.display(), e);
            return None;
        }
    };

    let value: Value = match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(e) => {
            debug!("Evidence file {} is not JSON: {}", path.display(), e);
            return None;
        }
    };

    let timestamp = value.get("timestamp").and_then(Value::as_str);
    let parsed = timestamp.and_then(parse_timestamp);
    if parsed.is_none() {
        debug!("Evidence file {} has no valid timestamp", path.display());
    }
    parsed
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn platform_rule_id(rule_id: &str, default_platform: &str) -> String {
    let first = rule_id.split('.').next().unwrap_or_default();
    if rule_id.contains('.') && PLATFORMS.contains(&first) {
        rule_id.to_string()
    } else {
        format!("{}.{}", default_platform, rule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn violation(rule_id: &str, severity: EvidenceSeverity) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            severity,
            message: "Domain layer imports infrastructure".to_string(),
            file: Some("src/domain/user.ts".to_string()),
            line: Some(4),
        }
    }

    #[test]
    fn test_single_critical_blocks() {
        let snapshot = EvidenceSnapshot::from_violations(
            "session-1",
            at(),
            vec![violation("backend.arch.layering", EvidenceSeverity::Critical)],
        );
        assert_eq!(
            snapshot.severity_metrics,
            SeverityMetrics {
                critical: 1,
                high: 0,
                medium: 0,
                low: 0,
                total: 1
            }
        );
        assert_eq!(snapshot.ai_gate.status, GateStatus::Blocked);
        assert!(snapshot.validate().is_empty(), "{:?}", snapshot.validate());
    }

    #[test]
    fn test_medium_and_low_allow() {
        let snapshot = EvidenceSnapshot::from_violations(
            "session-1",
            at(),
            vec![
                violation("frontend.style", EvidenceSeverity::Medium),
                violation("ios.naming", EvidenceSeverity::Low),
            ],
        );
        assert_eq!(snapshot.ai_gate.status, GateStatus::Allowed);
        assert_eq!(snapshot.severity_metrics.total, 2);
    }

    #[test]
    fn test_timestamp_is_canonical() {
        let snapshot = EvidenceSnapshot::from_violations("s", at(), vec![]);
        assert_eq!(snapshot.timestamp, "2025-03-01T12:00:00.000Z");
        assert_eq!(snapshot.parsed_timestamp(), Some(at()));
    }

    #[test]
    fn test_validate_reports_each_breach() {
        let mut snapshot = EvidenceSnapshot::from_violations(
            "",
            at(),
            vec![Violation {
                rule_id: "desktop.thing".to_string(),
                severity: EvidenceSeverity::High,
                message: "undefined".to_string(),
                file: None,
                line: None,
            }],
        );
        snapshot.timestamp = "2025-03-01T12:00:00Z".to_string();
        snapshot.severity_metrics.total = 5;

        let issues = snapshot.validate();
        assert!(issues.iter().any(|i| i.contains("canonical")));
        assert!(issues.iter().any(|i| i.contains("session_id")));
        assert!(issues.iter().any(|i| i.contains("sum")));
        assert!(issues.iter().any(|i| i.contains("rule_id")));
        assert!(issues.iter().any(|i| i.contains("too short")));
        assert!(issues.iter().any(|i| i.contains("placeholder")));
    }

    #[test]
    fn test_null_top_level_field_rejected() {
        let issues = validate_evidence_value(&json!({
            "timestamp": "2025-03-01T12:00:00.000Z",
            "session_id": null,
            "ai_gate": {"status": "ALLOWED", "violations": []}
        }));
        assert!(issues.iter().any(|i| i.contains("'session_id' is null")));
        assert!(issues.iter().any(|i| i.contains("'severity_metrics' is missing")));
    }

    #[test]
    fn test_from_findings_maps_severity_and_platform() {
        let findings = vec![
            Finding {
                rule_id: "no-console".to_string(),
                severity: Severity::Error,
                code: "no-console".to_string(),
                message: "console.log left in source".to_string(),
                file_path: Some("src/app.ts".to_string()),
                matched_by: None,
                source: None,
            },
            Finding {
                rule_id: "android.min-sdk".to_string(),
                severity: Severity::Info,
                code: "android.min-sdk".to_string(),
                message: "minSdk lower than recommended".to_string(),
                file_path: None,
                matched_by: None,
                source: None,
            },
        ];
        let snapshot = EvidenceSnapshot::from_findings("s-2", at(), &findings, "backend");
        let ids: Vec<_> = snapshot
            .ai_gate
            .violations
            .iter()
            .map(|v| (v.rule_id.as_str(), v.severity))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("backend.no-console", EvidenceSeverity::High),
                ("android.min-sdk", EvidenceSeverity::Low),
            ]
        );
        assert_eq!(snapshot.ai_gate.status, GateStatus::Blocked);
    }

    #[test]
    fn test_read_timestamp_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".AI_EVIDENCE.json");
        assert_eq!(read_evidence_timestamp(&path), None);

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(read_evidence_timestamp(&path), None);

        std::fs::write(&path, r#"{"timestamp": "yesterday"}"#).unwrap();
        assert_eq!(read_evidence_timestamp(&path), None);

        let snapshot = EvidenceSnapshot::from_violations("s", at(), vec![]);
        write_snapshot(&path, &snapshot).unwrap();
        assert_eq!(read_evidence_timestamp(&path), Some(at()));
        assert_eq!(load_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_write_refuses_contract_breaking_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".AI_EVIDENCE.json");
        let snapshot = EvidenceSnapshot::from_violations("", at(), vec![]);

        let err = write_snapshot(&path, &snapshot).unwrap_err();
        assert!(matches!(err, GovernError::Evidence(ref m) if m.contains("session_id")));
        assert!(!path.exists());
    }
}
