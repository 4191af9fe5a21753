//! Subtree-pruning hints
//!
//! Pruning certifies that no descendant of a directory can ever be
//! included, so the whole subtree may be skipped without further
//! filesystem calls. It is a traversal optimization only and must never
//! change per-file inclusion semantics, so every hint here is built
//! conservatively: any ambiguity resolves to "do not prune".

use globset::{Glob, GlobMatcher};
use velosync_types::{Error, Result};

/// Hint derived from an exclude rule that covers a whole subtree,
/// i.e. one whose effective pattern is `<literal segments>/**`,
/// optionally anchored anywhere via a leading `**/`.
#[derive(Debug)]
pub struct PruneHint {
    segments: Vec<String>,
    anchored_anywhere: bool,
}

impl PruneHint {
    /// Build a hint from a normalized exclude pattern, if it qualifies.
    ///
    /// Qualifying shapes: `a/b/**`, `**/a/b/**`, and bare literal
    /// patterns like `a/b` (which carry an implicit `/**` variant).
    pub fn from_pattern(pattern: &str) -> Option<Self> {
        let (rest, anchored_anywhere) = match pattern.strip_prefix("**/") {
            Some(rest) => (rest, true),
            None => (pattern, false),
        };
        let rest = rest.strip_suffix("/**").unwrap_or(rest);
        if rest.is_empty() {
            return None;
        }

        let segments: Vec<&str> = rest.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || s.contains(['*', '?', '[', ']', '{', '}']))
        {
            return None;
        }

        Some(Self {
            segments: segments.into_iter().map(str::to_string).collect(),
            anchored_anywhere,
        })
    }

    /// Whether the hint certifies the directory at `dir_segments` as an
    /// excluded subtree root.
    pub fn matches(&self, dir_segments: &[&str]) -> bool {
        if self.anchored_anywhere {
            dir_segments.len() >= self.segments.len()
                && self
                    .segments
                    .iter()
                    .rev()
                    .zip(dir_segments.iter().rev())
                    .all(|(pat, seg)| pat == seg)
        } else {
            dir_segments.len() == self.segments.len()
                && self.segments.iter().zip(dir_segments).all(|(pat, seg)| pat == seg)
        }
    }
}

/// Per-segment matchers for a simple include pattern (literals and
/// single-segment wildcards only).
///
/// Used by the catch-all pruning rule: a directory can only lead to a
/// match of this include when its path segments are a compatible prefix
/// of the pattern's segments.
#[derive(Debug)]
pub struct SimplePrefix {
    matchers: Vec<GlobMatcher>,
}

impl SimplePrefix {
    /// Compile per-segment matchers for a simple pattern
    pub fn compile(pattern: &str) -> Result<Self> {
        let mut matchers = Vec::new();
        for segment in pattern.split('/') {
            let glob = Glob::new(segment)
                .map_err(|e| Error::filter(pattern, e.to_string()))?;
            matchers.push(glob.compile_matcher());
        }
        Ok(Self { matchers })
    }

    /// Whether a descendant of the directory at `dir_segments` could
    /// still match this include pattern.
    pub fn compatible(&self, dir_segments: &[&str]) -> bool {
        // The pattern matches paths of exactly `matchers.len()` segments,
        // so anything strictly below a directory at that depth or deeper
        // is out of reach.
        if dir_segments.len() >= self.matchers.len() {
            return false;
        }
        self.matchers
            .iter()
            .zip(dir_segments)
            .all(|(m, seg)| m.is_match(seg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_matches_exact_path() {
        let hint = PruneHint::from_pattern("aaa/bbb/**").unwrap();
        assert!(hint.matches(&["aaa", "bbb"]));
        assert!(!hint.matches(&["aaa"]));
        assert!(!hint.matches(&["aaa", "bbb", "ccc"]));
        assert!(!hint.matches(&["xxx", "bbb"]));
    }

    #[test]
    fn anchored_hint_matches_suffix() {
        let hint = PruneHint::from_pattern("**/target/**").unwrap();
        assert!(hint.matches(&["target"]));
        assert!(hint.matches(&["a", "b", "target"]));
        assert!(!hint.matches(&["target2"]));
        assert!(!hint.matches(&["target", "sub"]));
    }

    #[test]
    fn wildcard_segments_disqualify() {
        assert!(PruneHint::from_pattern("a/*/c/**").is_none());
        assert!(PruneHint::from_pattern("**").is_none());
        assert!(PruneHint::from_pattern("a/b[0-9]/**").is_none());
    }

    #[test]
    fn prefix_compatibility() {
        let prefix = SimplePrefix::compile("keep*/data/?.txt").unwrap();
        assert!(prefix.compatible(&[]));
        assert!(prefix.compatible(&["keep-1"]));
        assert!(prefix.compatible(&["keep-1", "data"]));
        assert!(!prefix.compatible(&["other"]));
        // At pattern depth or deeper no descendant can match
        assert!(!prefix.compatible(&["keep-1", "data", "a.txt"]));
    }
}
