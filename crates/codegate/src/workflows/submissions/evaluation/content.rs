use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use super::super::domain::{ArchiveFile, Finding, FindingLocation, Rule};
use super::globs::any_match;
use super::languages::syntax_problem;
use super::payload::{ContentMatcher, ContentSpec};
use super::rule_message;

pub(crate) const EXCERPT_LIMIT: usize = 200;

const PICTOGRAPH_PATTERN: &str = r"\p{Extended_Pictographic}";
const PICTOGRAPH_FALLBACK: &str =
    r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{1F1E6}-\x{1F1FF}]";

/// Regex used by the emoji scan. Falls back to fixed code-point ranges when the
/// Unicode property tables are unavailable.
fn pictographs() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(PICTOGRAPH_PATTERN) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(error = %err, "pictograph class unavailable, using code point ranges");
                Regex::new(PICTOGRAPH_FALLBACK).ok()
            }
        })
        .as_ref()
}

/// Inspects every file selected by `paths`, in archive order.
pub(crate) fn evaluate(rule: &Rule, spec: &ContentSpec, files: &[ArchiveFile]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in files {
        if !spec.paths.is_empty() && !any_match(&spec.paths, file) {
            continue;
        }

        for matcher in &spec.matchers {
            if let Some(finding) = scan_matcher(rule, matcher, file) {
                findings.push(finding);
            }
        }

        if let Some(language) = spec.language {
            if !language.accepts(file) {
                let message = rule_message(
                    rule,
                    format!("file is not a {} source file", language.name),
                );
                findings.push(Finding::for_rule(
                    rule,
                    message,
                    vec![FindingLocation::file(&file.path)],
                ));
            }
        }

        if spec.no_emoji {
            if let Some(location) = pictographs().and_then(|regex| first_line_match(regex, file)) {
                let message = rule_message(rule, "file contains emoji".to_string());
                findings.push(Finding::for_rule(rule, message, vec![location]));
            }
        }

        if spec.syntax {
            if let Some(problem) = syntax_problem(file) {
                let message = if rule.message.trim().is_empty() {
                    format!("syntax error: {problem}")
                } else {
                    format!("{}: {problem}", rule.message)
                };
                findings.push(Finding::for_rule(
                    rule,
                    message,
                    vec![FindingLocation::file(&file.path)],
                ));
            }
        }
    }

    findings
}

fn scan_matcher(rule: &Rule, matcher: &ContentMatcher, file: &ArchiveFile) -> Option<Finding> {
    if matcher.should_match {
        if matcher.regex.is_match(&file.content) {
            return None;
        }
        let message = rule_message(
            rule,
            format!("required content '{}' not found", matcher.pattern),
        );
        return Some(Finding::for_rule(
            rule,
            message,
            vec![FindingLocation::file(&file.path)],
        ));
    }

    // Banned content: only the first matching line of each file is reported.
    let location = first_line_match(&matcher.regex, file)?;
    let message = rule_message(rule, format!("banned content '{}' found", matcher.pattern));
    Some(Finding::for_rule(rule, message, vec![location]))
}

fn first_line_match(regex: &Regex, file: &ArchiveFile) -> Option<FindingLocation> {
    file.content
        .lines()
        .enumerate()
        .find(|(_, line)| regex.is_match(line))
        .map(|(index, line)| FindingLocation {
            file: file.path.clone(),
            line: Some(index + 1),
            excerpt: Some(excerpt(line)),
        })
}

fn excerpt(line: &str) -> String {
    line.trim().chars().take(EXCERPT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::submissions::domain::{RuleKind, Severity};
    use crate::workflows::submissions::evaluation::payload::normalize_content;
    use serde_json::{json, Value};

    fn run(payload: Value, files: &[ArchiveFile]) -> Vec<Finding> {
        let rule = Rule {
            id: "content".to_string(),
            kind: RuleKind::Content,
            severity: Severity::Error,
            message: String::new(),
            payload,
        };
        let normalized = normalize_content(&rule).expect("normalizes");
        evaluate(&rule, &normalized.spec, files)
    }

    #[test]
    fn banned_pattern_reports_line_and_excerpt() {
        let source = "a\nb\nc\nd\n    eval(x)\nf\n";
        let findings = run(
            json!({ "banned": ["eval\\("] }),
            &[ArchiveFile::new("src/run.js", source)],
        );
        assert_eq!(findings.len(), 1);
        let location = &findings[0].locations[0];
        assert_eq!(location.file, "src/run.js");
        assert_eq!(location.line, Some(5));
        assert!(location.excerpt.as_deref().expect("excerpt").contains("eval("));
    }

    #[test]
    fn banned_pattern_reports_first_match_only() {
        let source = "eval(a)\nok\neval(b)\n";
        let findings = run(
            json!({ "patterns": ["eval\\("] }),
            &[
                ArchiveFile::new("one.js", source),
                ArchiveFile::new("two.js", "eval(c)"),
            ],
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].locations[0].line, Some(1));
        assert_eq!(findings[1].locations[0].file, "two.js");
    }

    #[test]
    fn excerpts_are_truncated() {
        let long_line = format!("secret = '{}'", "x".repeat(500));
        let findings = run(
            json!({ "banned": ["secret"] }),
            &[ArchiveFile::new("config.py", &long_line)],
        );
        let excerpt = findings[0].locations[0].excerpt.clone().expect("excerpt");
        assert_eq!(excerpt.chars().count(), EXCERPT_LIMIT);
    }

    #[test]
    fn required_content_scans_whole_file() {
        let payload = json!({ "pattern": "Copyright \\d{4}", "shouldMatch": true });
        let files = [
            ArchiveFile::new("a.rs", "// Copyright 2024\nfn main() {}"),
            ArchiveFile::new("b.rs", "fn main() {}"),
        ];
        let findings = run(payload, &files);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations, vec![FindingLocation::file("b.rs")]);
    }

    #[test]
    fn multiline_required_pattern_spans_lines() {
        let payload = json!({ "pattern": "begin.*end", "flags": "s", "shouldMatch": true });
        let findings = run(payload, &[ArchiveFile::new("x.txt", "begin\nmiddle\nend")]);
        assert!(findings.is_empty());
    }

    #[test]
    fn paths_restrict_inspected_files() {
        let findings = run(
            json!({ "banned": ["console\\.log"], "paths": ["src/**/*.ts"] }),
            &[
                ArchiveFile::new("src/app/main.ts", "console.log(1)"),
                ArchiveFile::new("scripts/dev.ts", "console.log(2)"),
            ],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations[0].file, "src/app/main.ts");
    }

    #[test]
    fn language_flags_foreign_extensions() {
        let findings = run(
            json!({ "language": "typescript" }),
            &[
                ArchiveFile::new("src/a.ts", ""),
                ArchiveFile::new("src/b.js", ""),
            ],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations[0].file, "src/b.js");
        assert!(findings[0].message.contains("typescript"));
    }

    #[test]
    fn no_emoji_reports_once_per_file() {
        let findings = run(
            json!({ "noEmoji": true }),
            &[
                ArchiveFile::new("notes.md", "plain\nlaunch 🚀 now 🎉\n"),
                ArchiveFile::new("clean.md", "nothing to see"),
            ],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations[0].line, Some(2));
    }

    #[test]
    fn syntax_flag_reports_parse_failures() {
        let findings = run(
            json!({ "syntax": true }),
            &[
                ArchiveFile::new("src/ok.js", "function f() { return 1; }\n"),
                ArchiveFile::new("src/bad.ts", "function (\n"),
                ArchiveFile::new("README.md", "function (\n"),
            ],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations[0].file, "src/bad.ts");
        assert!(findings[0].message.starts_with("syntax error: "));
    }

    #[test]
    fn invalid_matcher_does_not_block_valid_ones() {
        let findings = run(
            json!({ "banned": ["(", "debugger"] }),
            &[ArchiveFile::new("a.js", "debugger;")],
        );
        assert_eq!(findings.len(), 1);
    }
}
