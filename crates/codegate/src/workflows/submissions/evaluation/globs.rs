use globset::{GlobBuilder, GlobMatcher};

use super::super::domain::ArchiveFile;
use super::RuleConfigError;

/// Compiled file-path glob. Globs without a `/` match the base name (so `*.ts`
/// finds `src/a.ts`); globs with one match the whole relative path, where `*`
/// stays within a segment and `**` crosses them. Dotfiles are never hidden.
#[derive(Debug, Clone)]
pub(crate) struct PathGlob {
    pattern: String,
    matcher: GlobMatcher,
    base_name_only: bool,
}

impl PathGlob {
    pub(crate) fn compile(pattern: &str) -> Result<Self, RuleConfigError> {
        let normalized = pattern.trim().trim_start_matches("./");
        let glob = GlobBuilder::new(normalized)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|source| RuleConfigError::InvalidGlob {
                glob: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
            base_name_only: !normalized.contains('/'),
        })
    }

    pub(crate) fn pattern(&self) -> &str {
        &self.pattern
    }

    pub(crate) fn matches(&self, file: &ArchiveFile) -> bool {
        if self.base_name_only {
            self.matcher.is_match(file.base_name())
        } else {
            self.matcher.is_match(&file.path)
        }
    }
}

/// Compiles every glob, returning the usable ones plus one error per rejected glob.
pub(crate) fn compile_all(patterns: &[String]) -> (Vec<PathGlob>, Vec<RuleConfigError>) {
    let mut globs = Vec::with_capacity(patterns.len());
    let mut problems = Vec::new();
    for pattern in patterns {
        match PathGlob::compile(pattern) {
            Ok(glob) => globs.push(glob),
            Err(err) => problems.push(err),
        }
    }
    (globs, problems)
}

pub(crate) fn any_match(globs: &[PathGlob], file: &ArchiveFile) -> bool {
    globs.iter().any(|glob| glob.matches(file))
}
