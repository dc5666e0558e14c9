mod content;
mod file_pattern;
mod globs;
mod languages;
mod payload;

use tracing::{debug, warn};

use super::domain::{ArchiveFile, EvaluationResult, Finding, Rule, RuleKind};

/// A rule option that could not be compiled. The offending entry is skipped and
/// the rest of the rule still runs.
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid glob '{glob}': {source}")]
    InvalidGlob {
        glob: String,
        #[source]
        source: globset::Error,
    },
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),
}

/// Failure that aborts evaluation of the whole archive.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("rule {rule_id} has a malformed {kind} payload: {source}")]
    MalformedPayload {
        rule_id: String,
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn rule_message(rule: &Rule, fallback: String) -> String {
    if rule.message.trim().is_empty() {
        fallback
    } else {
        rule.message.clone()
    }
}

/// Stateless evaluator composing the file-pattern and content checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn has_evaluable_rules(rules: &[Rule]) -> bool {
        rules
            .iter()
            .any(|rule| matches!(rule.kind, RuleKind::FilePattern | RuleKind::Content))
    }

    /// Result used when nothing in the rule list can be evaluated here.
    pub fn no_evaluable_rules() -> EvaluationResult {
        EvaluationResult::from_findings(vec![Finding::system_error(
            "no evaluable rules found for this submission",
        )])
    }

    /// Runs every FILE_PATTERN rule, then every CONTENT rule, each group in input order.
    pub fn evaluate(
        &self,
        files: &[ArchiveFile],
        rules: &[Rule],
    ) -> Result<EvaluationResult, EvaluationError> {
        if !Self::has_evaluable_rules(rules) {
            return Ok(Self::no_evaluable_rules());
        }

        let mut findings = Vec::new();

        for rule in rules.iter().filter(|rule| rule.kind == RuleKind::FilePattern) {
            let normalized = payload::normalize_file_pattern(rule)?;
            report_problems(rule, &normalized.problems);
            findings.extend(file_pattern::evaluate(rule, &normalized.spec, files));
        }

        for rule in rules.iter().filter(|rule| rule.kind == RuleKind::Content) {
            let normalized = payload::normalize_content(rule)?;
            report_problems(rule, &normalized.problems);
            findings.extend(content::evaluate(rule, &normalized.spec, files));
        }

        let skipped = rules
            .iter()
            .filter(|rule| rule.kind == RuleKind::Unsupported)
            .count();
        if skipped > 0 {
            debug!(skipped, "ignored rules of unsupported types");
        }

        Ok(EvaluationResult::from_findings(findings))
    }
}

fn report_problems(rule: &Rule, problems: &[RuleConfigError]) {
    for problem in problems {
        warn!(rule_id = %rule.id, error = %problem, "skipping invalid rule option");
        metrics::counter!("codegate_rule_config_errors_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::submissions::domain::{Severity, SYSTEM_ERROR_RULE_ID};
    use serde_json::json;

    #[test]
    fn unsupported_only_rule_lists_yield_system_error() {
        let rules = vec![Rule {
            id: "ai".to_string(),
            kind: RuleKind::Unsupported,
            severity: Severity::Info,
            message: String::new(),
            payload: json!({}),
        }];
        let result = RuleEngine::new()
            .evaluate(&[ArchiveFile::new("a.ts", "")], &rules)
            .expect("evaluates");
        assert!(result.has_errors);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].rule_id, SYSTEM_ERROR_RULE_ID);
    }
}
