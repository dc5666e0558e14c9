use std::panic::{self, AssertUnwindSafe};

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;

use super::super::domain::ArchiveFile;

/// Extensions that the syntax check understands.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts"];

const GENERIC_SYNTAX_FAILURE: &str = "file could not be parsed";

/// Language name to accepted extensions. Lookups are case-insensitive and a few
/// common aliases are accepted.
const LANGUAGES: &[(&str, &[&str])] = &[
    ("javascript", &["js", "jsx", "mjs", "cjs"]),
    ("typescript", &["ts", "tsx", "mts", "cts"]),
    ("python", &["py", "pyi"]),
    ("java", &["java"]),
    ("kotlin", &["kt", "kts"]),
    ("go", &["go"]),
    ("rust", &["rs"]),
    ("ruby", &["rb"]),
    ("php", &["php"]),
    ("csharp", &["cs"]),
    ("c", &["c", "h"]),
    ("cpp", &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "h"]),
    ("swift", &["swift"]),
];

const ALIASES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("ts", "typescript"),
    ("py", "python"),
    ("golang", "go"),
    ("c#", "csharp"),
    ("c++", "cpp"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Language {
    pub(crate) name: &'static str,
    extensions: &'static [&'static str],
}

impl Language {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, target)| *target)
            .unwrap_or(lowered.as_str());

        LANGUAGES
            .iter()
            .find(|(language, _)| *language == canonical)
            .map(|&(name, extensions)| Self { name, extensions })
    }

    pub(crate) fn accepts(&self, file: &ArchiveFile) -> bool {
        file.extension()
            .map(|ext| self.extensions.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

pub(crate) fn is_script(file: &ArchiveFile) -> bool {
    file.extension()
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Parses a JS/TS-family file and returns the first problem, if any. Files
/// outside that family are never reported.
pub(crate) fn syntax_problem(file: &ArchiveFile) -> Option<String> {
    if !is_script(file) {
        return None;
    }
    let source_type = SourceType::from_path(&file.path).ok()?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, &file.content, source_type).parse();
        match parsed.errors.first() {
            Some(diagnostic) => Some(diagnostic.to_string()),
            None if parsed.panicked => Some(GENERIC_SYNTAX_FAILURE.to_string()),
            None => None,
        }
    }));

    outcome.unwrap_or_else(|_| Some(GENERIC_SYNTAX_FAILURE.to_string()))
}
