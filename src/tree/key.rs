//! Path keys.
//!
//! A key is an ordered list of segments. Its textual form joins segments with
//! [`SEPARATOR`]; parsing drops leading, trailing and repeated separators, so
//! `"/a//b/"` and `"a/b"` are the same key. The empty key is the root.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Separator between key segments.
pub const SEPARATOR: char = '/';

/// A parsed path into the data tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    segments: Vec<String>,
}

impl Key {
    /// The root key.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a textual key.
    pub fn parse(input: &str) -> Self {
        Self {
            segments: input
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Build a key from raw segments.
    ///
    /// Segments are taken verbatim; a segment may contain the separator,
    /// which makes the key unreachable through [`Key::parse`].
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append every segment of `other`.
    pub fn join(&self, other: &Key) -> Key {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Key { segments }
    }

    /// Append a single segment.
    pub fn child(&self, segment: impl Into<String>) -> Key {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Key { segments }
    }

    /// The first `len` segments.
    pub fn truncated(&self, len: usize) -> Key {
        Key {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    /// Segments after the first `len`.
    pub fn suffix(&self, len: usize) -> Key {
        Key {
            segments: self.segments[len.min(self.segments.len())..].to_vec(),
        }
    }

    /// Check if `prefix` is a segment-wise prefix of this key.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// The parent key, or `None` for the root.
    pub fn parent(&self) -> Option<Key> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.truncated(self.segments.len() - 1))
        }
    }

    /// Textual form with a leading separator, as used by cursor prefixes.
    pub fn to_absolute(&self) -> String {
        format!("{}{}", SEPARATOR, self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::parse(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::parse(&value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Key::parse(value)
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Key::parse(&text))
    }
}

/// Strip leading separators from a textual key.
pub fn normalize(input: &str) -> &str {
    input.trim_start_matches(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_drops_empty_segments() {
        let key = Key::parse("/foo//bar/");
        assert_eq!(key.segments(), &["foo".to_string(), "bar".to_string()]);
        assert_eq!(key.to_string(), "foo/bar");
        assert_eq!(key.to_absolute(), "/foo/bar");
    }

    #[test]
    fn empty_is_root() {
        assert!(Key::parse("").is_root());
        assert!(Key::parse("///").is_root());
        assert_eq!(Key::root().to_absolute(), "/");
        assert_eq!(Key::root().parent(), None);
    }

    #[test]
    fn join_and_suffix() {
        let base = Key::parse("a/b");
        let full = base.join(&Key::parse("c/d"));
        assert_eq!(full.to_string(), "a/b/c/d");
        assert!(full.starts_with(&base));
        assert_eq!(full.suffix(2).to_string(), "c/d");
        assert_eq!(full.truncated(1).to_string(), "a");
        assert_eq!(full.parent().unwrap().to_string(), "a/b/c");
    }

    #[test]
    fn starts_with_is_segment_wise() {
        assert!(!Key::parse("foobar").starts_with(&Key::parse("foo")));
    }

    #[test]
    fn normalize_strips_leading() {
        assert_eq!(normalize("//a/b"), "a/b");
        assert_eq!(normalize("a"), "a");
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(segments in prop::collection::vec("[a-z0-9_]{1,8}", 0..6)) {
            let key = Key::from_segments(segments.clone());
            prop_assert_eq!(Key::parse(&key.to_string()), key.clone());
            prop_assert_eq!(Key::parse(&key.to_absolute()), key);
        }
    }
}
