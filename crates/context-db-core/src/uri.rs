//! Canonical resource URIs.
//!
//! Every resource is addressed as `<scheme>://resources/<seg>/<seg>/...`.
//! This string is the only persisted address and must be stable across
//! restarts, so construction always goes through [`ResourceUri::parse`],
//! [`ResourceUri::root`], or [`ResourceUri::join`], which keep it normalized
//! (no empty segments, no trailing slash).
//!
//! The namespace tree is never stored. Parent/child relations and
//! directory-ness are computed from segment prefixes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Fixed top-level namespace under the scheme.
pub const RESOURCES_ROOT: &str = "resources";

/// A normalized resource URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUri(String);

impl ResourceUri {
    /// The virtual root, e.g. `ctx://resources`.
    pub fn root(scheme: &str) -> Self {
        Self(format!("{}://{}", scheme, RESOURCES_ROOT))
    }

    /// Parse and normalize a URI string.
    ///
    /// Accepts `<scheme>://resources` optionally followed by `/`-separated
    /// non-empty segments. A single trailing `/` is dropped.
    pub fn parse(s: &str) -> Result<Self, ContextError> {
        let invalid = || ContextError::InvalidUri(s.to_string());
        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        if !is_valid_scheme(scheme) {
            return Err(invalid());
        }
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let mut parts = rest.split('/');
        if parts.next() != Some(RESOURCES_ROOT) {
            return Err(invalid());
        }
        let mut uri = Self::root(scheme);
        for seg in parts {
            if seg.is_empty() || seg == "." || seg == ".." {
                return Err(invalid());
            }
            uri.0.push('/');
            uri.0.push_str(seg);
        }
        Ok(uri)
    }

    /// Append one (already sanitized) segment.
    pub fn join(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map(|(s, _)| s).unwrap_or_default()
    }

    /// Path segments below `resources`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path().split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, or `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn is_root(&self) -> bool {
        self.path().is_empty()
    }

    /// Parent URI; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/')?;
        Some(Self(self.0[..idx].to_string()))
    }

    /// True when `self` is a strict, segment-aligned prefix of `other`.
    pub fn is_ancestor_of(&self, other: &ResourceUri) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// True when `other` is `self` or lies below it.
    pub fn contains(&self, other: &ResourceUri) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// The segment directly below `self` on the way to `descendant`.
    pub fn child_toward<'a>(&self, descendant: &'a ResourceUri) -> Option<&'a str> {
        if !self.is_ancestor_of(descendant) {
            return None;
        }
        descendant.0[self.0.len() + 1..].split('/').next()
    }

    fn path(&self) -> &str {
        let after_scheme = self.0.split_once("://").map(|(_, r)| r).unwrap_or("");
        after_scheme
            .strip_prefix(RESOURCES_ROOT)
            .unwrap_or(after_scheme)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Schemes are non-empty lowercase ASCII alphanumerics.
pub fn is_valid_scheme(scheme: &str) -> bool {
    !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Reduce an arbitrary name to a URI-safe segment.
///
/// Keeps `[A-Za-z0-9._-]`, collapses every other run of characters into a
/// single `_`, and trims `_` from both ends. Returns `None` when nothing
/// usable remains (including `.` and `..`).
pub fn sanitize_segment(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sub = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            last_was_sub = false;
        } else if !last_was_sub {
            out.push('_');
            last_was_sub = true;
        }
    }
    let trimmed = out.trim_matches('_');
    match trimmed {
        "" | "." | ".." => None,
        s => Some(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> ResourceUri {
        ResourceUri::parse(s).unwrap()
    }

    #[test]
    fn test_parse_root_and_trailing_slash() {
        assert_eq!(uri("ctx://resources/").as_str(), "ctx://resources");
        assert!(uri("ctx://resources").is_root());
        assert_eq!(uri("ctx://resources/a/b/").as_str(), "ctx://resources/a/b");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "resources/a",
            "ctx://other/a",
            "ctx://resources//a",
            "ctx://resources/a/../b",
            "CTX://resources/a",
            "://resources",
        ] {
            assert!(ResourceUri::parse(bad).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_parent_chain() {
        let u = uri("ctx://resources/docs/guide.md");
        assert_eq!(u.parent().unwrap().as_str(), "ctx://resources/docs");
        assert_eq!(u.parent().unwrap().parent().unwrap().as_str(), "ctx://resources");
        assert!(u.parent().unwrap().parent().unwrap().parent().is_none());
        assert_eq!(u.leaf(), Some("guide.md"));
        assert_eq!(ResourceUri::root("ctx").leaf(), None);
    }

    #[test]
    fn test_ancestor_is_segment_aligned() {
        let docs = uri("ctx://resources/docs");
        assert!(docs.is_ancestor_of(&uri("ctx://resources/docs/a.md")));
        assert!(!docs.is_ancestor_of(&uri("ctx://resources/docs2/a.md")));
        assert!(!docs.is_ancestor_of(&docs));
        assert!(docs.contains(&docs));
        assert!(ResourceUri::root("ctx").is_ancestor_of(&docs));
    }

    #[test]
    fn test_child_toward() {
        let root = ResourceUri::root("ctx");
        let deep = uri("ctx://resources/a/b/c.md");
        assert_eq!(root.child_toward(&deep), Some("a"));
        assert_eq!(uri("ctx://resources/a").child_toward(&deep), Some("b"));
        assert_eq!(deep.child_toward(&root), None);

        // The segment borrows from the descendant, not from the ancestor.
        let segment = {
            let parent = uri("ctx://resources/a");
            parent.child_toward(&deep)
        };
        assert_eq!(segment, Some("b"));
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("readme.md").as_deref(), Some("readme.md"));
        assert_eq!(
            sanitize_segment("My Notes (v2).md").as_deref(),
            Some("My_Notes_v2_.md")
        );
        assert_eq!(sanitize_segment("  spaced  ").as_deref(), Some("spaced"));
        assert_eq!(sanitize_segment(".env").as_deref(), Some(".env"));
        assert_eq!(sanitize_segment("日本語"), None);
        assert_eq!(sanitize_segment(".."), None);
        assert_eq!(sanitize_segment(""), None);
    }

    #[test]
    fn test_scheme_validation() {
        assert!(is_valid_scheme("ctx"));
        assert!(is_valid_scheme("viking2"));
        assert!(!is_valid_scheme("Ctx"));
        assert!(!is_valid_scheme("c-x"));
        assert!(!is_valid_scheme(""));
    }
}
