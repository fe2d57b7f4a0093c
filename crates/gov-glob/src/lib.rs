// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Ordered, first-match-wins glob matching for path-based policy.

use globset::{Glob, GlobMatcher};
use gov_error::{ErrorCode, GovError};

/// A glob pattern failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid glob pattern '{pattern}': {source}")]
pub struct GlobError {
    /// The offending pattern.
    pub pattern: String,
    #[source]
    source: globset::Error,
}

impl From<GlobError> for GovError {
    fn from(err: GlobError) -> Self {
        GovError::new(ErrorCode::SchemaInvalidRegistry, err.to_string())
            .with_context("pattern", err.pattern.clone())
    }
}

// ---------------------------------------------------------------------------
// PathRuleSet: ordered, first-match-wins
// ---------------------------------------------------------------------------

/// An ordered list of `(glob pattern, label)` pairs, evaluated in
/// declaration order. The label attached to the first pattern that matches a
/// candidate path wins; later rules are never consulted once one matches.
///
/// This is the shape the tool registry's `path_rules` and the executor's
/// path-rule gate need: each rule carries a sensitivity label or an
/// allow/block/require-approval action, and earlier, more specific rules are
/// meant to shadow later, more general ones.
#[derive(Debug, Clone)]
pub struct PathRuleSet<T> {
    rules: Vec<(GlobMatcher, T)>,
}

impl<T: Clone> PathRuleSet<T> {
    /// Compile an ordered list of `(pattern, label)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`GlobError`] for the first pattern that fails to compile.
    pub fn compile(rules: impl IntoIterator<Item = (String, T)>) -> Result<Self, GlobError> {
        let compiled = rules
            .into_iter()
            .map(|(pattern, label)| {
                let matcher = Glob::new(&pattern)
                    .map_err(|source| GlobError {
                        pattern: pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                Ok((matcher, label))
            })
            .collect::<Result<Vec<_>, GlobError>>()?;
        Ok(Self { rules: compiled })
    }

    /// Return the label of the first rule whose pattern matches `path`, or
    /// `None` if no rule matches.
    #[must_use]
    pub fn first_match(&self, path: &str) -> Option<&T> {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.is_match(path))
            .map(|(_, label)| label)
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` if no rules are compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rule_set_first_match_wins() {
        let rules = PathRuleSet::compile(vec![
            ("/tmp/scratch/**".to_string(), "public"),
            ("/tmp/**".to_string(), "confidential"),
        ])
        .unwrap();
        assert_eq!(rules.first_match("/tmp/scratch/a.txt"), Some(&"public"));
        assert_eq!(rules.first_match("/tmp/secrets/a.txt"), Some(&"confidential"));
        assert_eq!(rules.first_match("/etc/passwd"), None);
    }

    #[test]
    fn path_rule_set_reports_len_and_emptiness() {
        let empty: PathRuleSet<&str> = PathRuleSet::compile(vec![]).unwrap();
        assert!(empty.is_empty());
        let rules =
            PathRuleSet::compile(vec![("**/*.rs".to_string(), "code")]).unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn path_rule_set_matches_nested_paths() {
        let rules = PathRuleSet::compile(vec![("src/**".to_string(), "code")]).unwrap();
        assert_eq!(rules.first_match("src/a/b/c/d.rs"), Some(&"code"));
    }

    #[test]
    fn path_rule_set_matches_unicode_paths() {
        let rules = PathRuleSet::compile(vec![("src/**".to_string(), "code")]).unwrap();
        assert_eq!(rules.first_match("src/données/fichier.rs"), Some(&"code"));
    }

    #[test]
    fn path_rule_set_rejects_invalid_patterns() {
        let err = PathRuleSet::compile(vec![("[".to_string(), "x")]).unwrap_err();
        assert_eq!(err.pattern, "[");
        assert!(err.to_string().contains("invalid glob pattern"));
    }

    #[test]
    fn glob_error_converts_to_schema_invalid_registry() {
        let err = PathRuleSet::compile(vec![("[".to_string(), "x")]).unwrap_err();
        let gov: GovError = err.into();
        assert_eq!(gov.code, ErrorCode::SchemaInvalidRegistry);
    }
}
