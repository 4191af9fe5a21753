//! Filter rule parsing and compilation
//!
//! A filter spec is `in:<glob>` or `ex:<glob>`. Patterns are normalized
//! (backslashes become forward slashes, trailing slash stripped) and
//! compiled into a small set of glob variants so that common intents work
//! without ceremony:
//!
//! - a pattern starting `**/` also matches the same suffix at the root,
//! - an exclude whose last segment is a literal directory name also gets
//!   an implicit `<pattern>/**` variant, so excluding a directory by name
//!   excludes its whole subtree.

use crate::prune::{PruneHint, SimplePrefix};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use velosync_types::{Error, Result};

/// Whether a rule includes or excludes matching entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Matching entries are included
    Include,
    /// Matching entries are excluded
    Exclude,
}

/// One compiled filter rule
#[derive(Debug)]
pub struct FilterRule {
    kind: FilterKind,
    pattern: String,
    matcher: GlobSet,
    catch_all: bool,
    prune: Option<PruneHint>,
    simple_prefix: Option<SimplePrefix>,
    simple: bool,
}

impl FilterRule {
    /// Parse and compile one filter spec string
    pub fn parse(spec: &str) -> Result<Self> {
        let (kind, raw) = if let Some(rest) = spec.strip_prefix("in:") {
            (FilterKind::Include, rest)
        } else if let Some(rest) = spec.strip_prefix("ex:") {
            (FilterKind::Exclude, rest)
        } else {
            return Err(Error::filter(
                spec,
                "filter must start with 'in:' or 'ex:'",
            ));
        };

        let pattern = normalize(raw);
        if pattern.is_empty() {
            return Err(Error::filter(spec, "filter pattern is empty"));
        }

        let variants = expand_variants(kind, &pattern);
        let mut builder = GlobSetBuilder::new();
        for variant in &variants {
            let glob = GlobBuilder::new(variant)
                .literal_separator(true)
                .build()
                .map_err(|e| Error::filter(spec, e.to_string()))?;
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|e| Error::filter(spec, e.to_string()))?;

        let catch_all = pattern == "**" || pattern == "**/*";
        let simple = is_simple(&pattern);

        let prune = match kind {
            FilterKind::Exclude => PruneHint::from_pattern(&pattern),
            FilterKind::Include => None,
        };
        let simple_prefix = match kind {
            FilterKind::Include if simple => Some(SimplePrefix::compile(&pattern)?),
            _ => None,
        };

        Ok(Self {
            kind,
            pattern,
            matcher,
            catch_all,
            prune,
            simple_prefix,
            simple,
        })
    }

    /// The rule's kind
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// The normalized pattern as the user wrote it
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern is equivalent to "exclude everything"
    pub fn is_catch_all(&self) -> bool {
        self.catch_all
    }

    /// Whether the rule matches the given slash-separated relative path
    pub fn matches(&self, rel: &str) -> bool {
        self.matcher.is_match(rel)
    }

    /// Subtree-pruning hint for exclude rules shaped `<literals>/**`
    pub fn prune_hint(&self) -> Option<&PruneHint> {
        self.prune.as_ref()
    }

    /// Pruning prefix for simple include patterns (single-segment
    /// wildcards only, no `**` or character classes)
    pub fn simple_prefix(&self) -> Option<&SimplePrefix> {
        self.simple_prefix.as_ref()
    }

    /// Whether the pattern qualifies as "simple" for pruning purposes
    pub fn is_simple(&self) -> bool {
        self.simple
    }
}

/// Normalize a raw pattern: Windows separators become `/`, a trailing
/// slash is stripped.
fn normalize(raw: &str) -> String {
    let mut pattern = raw.replace('\\', "/");
    while pattern.len() > 1 && pattern.ends_with('/') {
        pattern.pop();
    }
    if pattern == "/" {
        pattern.clear();
    }
    pattern
}

/// Build the matching variants for a normalized pattern
fn expand_variants(kind: FilterKind, pattern: &str) -> Vec<String> {
    let mut variants = vec![pattern.to_string()];

    // "**/x" should also match "x" at the root
    if let Some(suffix) = pattern.strip_prefix("**/") {
        if !suffix.is_empty() {
            variants.push(suffix.to_string());
        }
    }

    // Excluding a directory by literal name excludes its subtree
    if kind == FilterKind::Exclude {
        let last = pattern.rsplit('/').next().unwrap_or(pattern);
        if !last.is_empty() && !has_glob_meta(last) {
            let existing: Vec<String> = variants.clone();
            for v in existing {
                variants.push(format!("{v}/**"));
            }
        }
    }

    variants
}

fn has_glob_meta(segment: &str) -> bool {
    segment.contains(['*', '?', '[', ']', '{', '}'])
}

/// A pattern is simple when it uses only literal segments and
/// single-segment wildcards (`*`, `?`), with no `**` and no classes.
fn is_simple(pattern: &str) -> bool {
    !pattern.contains("**") && !pattern.contains(['[', ']', '{', '}'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_prefix() {
        assert!(FilterRule::parse("include:foo").is_err());
        assert!(FilterRule::parse("foo").is_err());
        assert!(FilterRule::parse("ex:").is_err());
    }

    #[test]
    fn normalizes_backslashes_and_trailing_slash() {
        let rule = FilterRule::parse("ex:aaa\\bbb/").unwrap();
        assert_eq!(rule.pattern(), "aaa/bbb");
        assert!(rule.matches("aaa/bbb"));
    }

    #[test]
    fn root_variant_for_leading_double_star() {
        let rule = FilterRule::parse("in:**/build").unwrap();
        assert!(rule.matches("build"));
        assert!(rule.matches("a/b/build"));
        assert!(!rule.matches("buildx"));
    }

    #[test]
    fn literal_exclude_covers_subtree() {
        let rule = FilterRule::parse("ex:node_modules").unwrap();
        assert!(rule.matches("node_modules"));
        assert!(rule.matches("node_modules/pkg/index.js"));
        assert!(!rule.matches("src/main.rs"));
    }

    #[test]
    fn include_does_not_get_subtree_variant() {
        let rule = FilterRule::parse("in:foo/bar").unwrap();
        assert!(rule.matches("foo/bar"));
        assert!(!rule.matches("foo/bar/baz"));
    }

    #[test]
    fn single_star_does_not_cross_separator() {
        let rule = FilterRule::parse("ex:*.log").unwrap();
        assert!(rule.matches("run.log"));
        assert!(!rule.matches("logs/run.log"));
    }

    #[test]
    fn catch_all_detection() {
        assert!(FilterRule::parse("ex:**").unwrap().is_catch_all());
        assert!(FilterRule::parse("ex:**/*").unwrap().is_catch_all());
        assert!(!FilterRule::parse("ex:*").unwrap().is_catch_all());
    }

    #[test]
    fn prune_hint_only_for_literal_subtree_excludes() {
        assert!(FilterRule::parse("ex:bbb/**").unwrap().prune_hint().is_some());
        assert!(FilterRule::parse("ex:bbb").unwrap().prune_hint().is_some());
        assert!(FilterRule::parse("ex:a/*/c/**").unwrap().prune_hint().is_none());
        assert!(FilterRule::parse("ex:**").unwrap().prune_hint().is_none());
    }
}
