use super::super::domain::{ArchiveFile, Finding, FindingLocation, Rule};
use super::globs::any_match;
use super::payload::FilePatternSpec;
use super::rule_message;

/// Runs the required, blocked, then allow-list checks for one rule.
pub(crate) fn evaluate(rule: &Rule, spec: &FilePatternSpec, files: &[ArchiveFile]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for glob in &spec.require {
        if !files.iter().any(|file| glob.matches(file)) {
            let message = rule_message(
                rule,
                format!("required file matching '{}' is missing", glob.pattern()),
            );
            findings.push(Finding::for_rule(rule, message, Vec::new()));
        }
    }

    for glob in &spec.block {
        for file in files.iter().filter(|file| glob.matches(file)) {
            let message = rule_message(
                rule,
                format!("file matches blocked pattern '{}'", glob.pattern()),
            );
            findings.push(Finding::for_rule(
                rule,
                message,
                vec![FindingLocation::file(&file.path)],
            ));
        }
    }

    if !spec.allow.is_empty() {
        for file in files.iter().filter(|file| !any_match(&spec.allow, file)) {
            let message = rule_message(rule, "file is not covered by the allow list".to_string());
            findings.push(Finding::for_rule(
                rule,
                message,
                vec![FindingLocation::file(&file.path)],
            ));
        }
    }

    findings
}
