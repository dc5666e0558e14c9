//! Normalization of the JSON rule payloads into one canonical shape per rule type.
//!
//! Payloads arrive in several dialects (explicit lists, the `{pattern, exists}`
//! shorthand, legacy `banned`/`patterns` arrays). Everything is folded into
//! [`FilePatternSpec`] or [`ContentSpec`] before an evaluator runs, so the
//! evaluators never look at raw JSON.

use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use super::super::domain::Rule;
use super::globs::{compile_all, PathGlob};
use super::languages::Language;
use super::{EvaluationError, RuleConfigError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePatternPayload {
    #[serde(default)]
    require: Option<Vec<String>>,
    #[serde(default)]
    block: Option<Vec<String>>,
    #[serde(default)]
    allow: Option<Vec<String>>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    exists: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPayload {
    #[serde(default)]
    banned: Option<Vec<String>>,
    #[serde(default)]
    patterns: Option<Vec<String>>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    flags: Option<String>,
    #[serde(default)]
    should_match: Option<bool>,
    #[serde(default)]
    paths: Option<Vec<String>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    no_emoji: Option<bool>,
    #[serde(default)]
    syntax: Option<bool>,
}

/// Canonical FILE_PATTERN rule.
#[derive(Debug, Clone, Default)]
pub(crate) struct FilePatternSpec {
    pub(crate) require: Vec<PathGlob>,
    pub(crate) block: Vec<PathGlob>,
    pub(crate) allow: Vec<PathGlob>,
}

/// A compiled regex and whether its presence is required or banned.
#[derive(Debug, Clone)]
pub(crate) struct ContentMatcher {
    pub(crate) pattern: String,
    pub(crate) regex: Regex,
    pub(crate) should_match: bool,
}

/// Canonical CONTENT rule.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContentSpec {
    pub(crate) matchers: Vec<ContentMatcher>,
    pub(crate) paths: Vec<PathGlob>,
    pub(crate) language: Option<Language>,
    pub(crate) no_emoji: bool,
    pub(crate) syntax: bool,
}

/// A normalized rule plus the configuration problems found along the way.
#[derive(Debug)]
pub(crate) struct Normalized<T> {
    pub(crate) spec: T,
    pub(crate) problems: Vec<RuleConfigError>,
}

fn parse_payload<T>(rule: &Rule, kind: &'static str) -> Result<T, EvaluationError>
where
    T: DeserializeOwned + Default,
{
    if rule.payload.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(rule.payload.clone()).map_err(|source| {
        EvaluationError::MalformedPayload {
            rule_id: rule.id.clone(),
            kind,
            source,
        }
    })
}

pub(crate) fn normalize_file_pattern(
    rule: &Rule,
) -> Result<Normalized<FilePatternSpec>, EvaluationError> {
    let payload: FilePatternPayload = parse_payload(rule, "FILE_PATTERN")?;

    let mut require = payload.require.unwrap_or_default();
    let mut block = payload.block.unwrap_or_default();
    let allow = payload.allow.unwrap_or_default();

    if let Some(pattern) = payload.pattern.filter(|pattern| !pattern.trim().is_empty()) {
        if payload.exists.unwrap_or(true) {
            require.push(pattern);
        } else {
            block.push(pattern);
        }
    }

    let mut problems = Vec::new();
    let (require, mut errors) = compile_all(&require);
    problems.append(&mut errors);
    let (block, mut errors) = compile_all(&block);
    problems.append(&mut errors);
    let (allow, mut errors) = compile_all(&allow);
    problems.append(&mut errors);

    Ok(Normalized {
        spec: FilePatternSpec {
            require,
            block,
            allow,
        },
        problems,
    })
}

pub(crate) fn normalize_content(rule: &Rule) -> Result<Normalized<ContentSpec>, EvaluationError> {
    let payload: ContentPayload = parse_payload(rule, "CONTENT")?;
    let mut problems = Vec::new();
    let mut matchers = Vec::new();

    let legacy = payload
        .banned
        .into_iter()
        .flatten()
        .chain(payload.patterns.into_iter().flatten());
    for pattern in legacy {
        match compile_matcher(&pattern, "") {
            Ok(regex) => matchers.push(ContentMatcher {
                pattern,
                regex,
                should_match: false,
            }),
            Err(err) => problems.push(err),
        }
    }

    if let Some(pattern) = payload.pattern.filter(|pattern| !pattern.is_empty()) {
        let flags = payload.flags.unwrap_or_default();
        match compile_matcher(&pattern, &flags) {
            Ok(regex) => matchers.push(ContentMatcher {
                pattern,
                regex,
                should_match: payload.should_match.unwrap_or(false),
            }),
            Err(err) => problems.push(err),
        }
    }

    let (paths, mut errors) = compile_all(&payload.paths.unwrap_or_default());
    problems.append(&mut errors);

    let language = match payload.language.filter(|name| !name.trim().is_empty()) {
        Some(name) => match Language::lookup(&name) {
            Some(language) => Some(language),
            None => {
                problems.push(RuleConfigError::UnknownLanguage(name));
                None
            }
        },
        None => None,
    };

    Ok(Normalized {
        spec: ContentSpec {
            matchers,
            paths,
            language,
            no_emoji: payload.no_emoji.unwrap_or(false),
            syntax: payload.syntax.unwrap_or(false),
        },
        problems,
    })
}

/// Builds a regex from a pattern and a JavaScript-style flag string.
pub(crate) fn compile_matcher(pattern: &str, flags: &str) -> Result<Regex, RuleConfigError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'u' => {
                builder.unicode(true);
            }
            // global, sticky and indices only change iteration in JS
            'g' | 'y' | 'd' => {}
            other => warn!(pattern, flag = %other, "ignoring unsupported regex flag"),
        }
    }

    builder
        .build()
        .map_err(|source| RuleConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}
