//! Path pattern matching.
//!
//! # Design Decisions
//! - Path matching is case-sensitive and ignores the query string
//! - A pattern ending in `/` also matches every path below it
//! - No regex to guarantee O(n) matching

/// A registered path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches the path exactly.
    Exact(String),
    /// Matches any path starting with the prefix. The prefix ends in `/`.
    Subtree(String),
}

impl PathPattern {
    /// Classify a pattern string by its trailing slash.
    pub fn parse(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if pattern.ends_with('/') {
            Self::Subtree(pattern)
        } else {
            Self::Exact(pattern)
        }
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Subtree(p) => p,
        }
    }

    /// Returns true if `path` is covered by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => p == path,
            Self::Subtree(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    /// Specificity used to break ties; longer patterns win.
    pub fn specificity(&self) -> usize {
        self.as_str().len()
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern() {
        let pattern = PathPattern::parse("/url/error");
        assert!(matches!(pattern, PathPattern::Exact(_)));
        assert!(pattern.matches("/url/error"));
        assert!(!pattern.matches("/url/error/"));
        assert!(!pattern.matches("/url/errors"));
        assert!(!pattern.matches("/URL/ERROR"));
    }

    #[test]
    fn subtree_pattern() {
        let pattern = PathPattern::parse("/url/error/");
        assert!(matches!(pattern, PathPattern::Subtree(_)));
        assert!(pattern.matches("/url/error/"));
        assert!(pattern.matches("/url/error/deeper/still"));
        assert!(!pattern.matches("/url/error"));
        assert!(!pattern.matches("/url/errorish/"));
    }
}
