//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a change by the sink that stored it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub u64);

impl ChangeId {
    /// Returns the raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the id following this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filesystem-safe identifier of a polled source.
///
/// Derived from the source name (which defaults to the repository URL), so
/// `ssh://example.com/foo/baz` becomes `ssh-example.com-foo-baz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Builds an id from a human readable source name.
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for c in name.chars() {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                slug.push(c);
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            Self("source".to_string())
        } else {
            Self(slug.to_string())
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_from_url() {
        let id = SourceId::from_name("ssh://example.com/foo/baz");
        assert_eq!(id.as_str(), "ssh-example.com-foo-baz");
    }

    #[test]
    fn test_source_id_keeps_simple_names() {
        assert_eq!(SourceId::from_name("my_repo.v2").as_str(), "my_repo.v2");
    }

    #[test]
    fn test_source_id_empty_fallback() {
        assert_eq!(SourceId::from_name("///").as_str(), "source");
    }

    #[test]
    fn test_change_id_next() {
        assert_eq!(ChangeId(41).next(), ChangeId(42));
        assert_eq!(ChangeId(7).to_string(), "7");
    }
}
