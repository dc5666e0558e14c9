use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for uploaded submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for the project a submission and its rule sets belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a submission. `Reviewed` is only ever set by an external action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Evaluating,
    Passed,
    Failed,
    Reviewed,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Evaluating => "EVALUATING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Reviewed => "REVIEWED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Reviewed)
    }
}

/// One uploaded archive plus its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub project_id: ProjectId,
    /// Remote URL or local path of the zip archive.
    pub archive: String,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<EvaluationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn pending(id: SubmissionId, project_id: ProjectId, archive: impl Into<String>) -> Self {
        Self {
            id,
            project_id,
            archive: archive.into(),
            status: SubmissionStatus::Pending,
            results: None,
            evaluated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

/// Rule types understood by the evaluation engine. Rule types owned by other
/// services deserialize as `Unsupported` and are ignored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    FilePattern,
    Content,
    #[serde(other)]
    Unsupported,
}

/// A single check definition. The payload is kept as raw JSON until the
/// evaluator for `kind` normalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Named, ordered collection of rules bound to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub id: String,
    pub name: String,
    pub project_id: ProjectId,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Flattens every rule set into one evaluation list, preserving set then rule order.
pub fn flatten_rules(rule_sets: &[RuleSet]) -> Vec<Rule> {
    rule_sets
        .iter()
        .flat_map(|set| set.rules.iter().cloned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingLocation {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl FindingLocation {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            excerpt: None,
        }
    }
}

/// One reported violation produced by evaluating a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub locations: Vec<FindingLocation>,
}

pub const SYSTEM_ERROR_RULE_ID: &str = "system-error";
pub const RULE_EVALUATION_ERROR_RULE_ID: &str = "rule-evaluation-error";

impl Finding {
    pub fn for_rule(rule: &Rule, message: String, locations: Vec<FindingLocation>) -> Self {
        Self {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            message,
            locations,
        }
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            rule_id: SYSTEM_ERROR_RULE_ID.to_string(),
            severity: Severity::Error,
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self {
            rule_id: RULE_EVALUATION_ERROR_RULE_ID.to_string(),
            severity: Severity::Error,
            message: message.into(),
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub findings: Vec<Finding>,
    pub has_errors: bool,
}

impl EvaluationResult {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let has_errors = findings
            .iter()
            .any(|finding| finding.severity == Severity::Error);
        Self {
            findings,
            has_errors,
        }
    }

    pub fn verdict(&self) -> SubmissionStatus {
        if self.has_errors {
            SubmissionStatus::Failed
        } else {
            SubmissionStatus::Passed
        }
    }
}

/// A decoded archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: String,
    pub content: String,
}

impl ArchiveFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn base_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.base_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn has_errors_tracks_error_severity_only() {
        let warning = Finding {
            rule_id: "r1".to_string(),
            severity: Severity::Warning,
            message: "style".to_string(),
            locations: Vec::new(),
        };
        let result = EvaluationResult::from_findings(vec![warning.clone()]);
        assert!(!result.has_errors);
        assert_eq!(result.verdict(), SubmissionStatus::Passed);

        let result = EvaluationResult::from_findings(vec![
            warning,
            Finding::system_error("no ruleset configured"),
        ]);
        assert!(result.has_errors);
        assert_eq!(result.verdict(), SubmissionStatus::Failed);
    }

    #[test]
    fn rules_deserialize_with_unknown_types() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "ai-1",
            "type": "AI_REVIEW",
            "severity": "INFO",
            "message": "model review",
            "payload": {}
        }))
        .expect("rule parses");
        assert_eq!(rule.kind, RuleKind::Unsupported);

        let rule: Rule = serde_json::from_value(json!({
            "id": "fp-1",
            "type": "FILE_PATTERN",
            "severity": "ERROR"
        }))
        .expect("rule parses");
        assert_eq!(rule.kind, RuleKind::FilePattern);
        assert!(rule.payload.is_null());
    }

    #[test]
    fn archive_file_extension_ignores_dotfiles() {
        assert_eq!(
            ArchiveFile::new("src/App.TSX", "").extension().as_deref(),
            Some("tsx")
        );
        assert_eq!(ArchiveFile::new(".env", "").extension(), None);
        assert_eq!(ArchiveFile::new("Makefile", "").extension(), None);
        assert_eq!(ArchiveFile::new("a/b/.eslintrc.json", "").base_name(), ".eslintrc.json");
    }

    #[test]
    fn results_serialize_in_camel_case() {
        let result = EvaluationResult::from_findings(vec![Finding::evaluation_error("boom")]);
        let value = serde_json::to_value(&result).expect("serializes");
        assert_eq!(value["hasErrors"], json!(true));
        assert_eq!(value["findings"][0]["ruleId"], json!("rule-evaluation-error"));
    }
}
