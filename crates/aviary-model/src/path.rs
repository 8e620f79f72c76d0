//! Slash-delimited paths addressing nodes in a device tree
//!
//! A path looks like a filesystem path: `/vehicle/device/channel`. Every
//! path is anchored at the implicit tree root; the root itself is `/`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TreeError;

/// A path from the root of a device tree to one of its nodes.
///
/// Paths are immutable once parsed; equivalent paths have identical segment
/// sequences and identical canonical string forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// The root path `/`, with zero segments.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path from its string form.
    ///
    /// The string must start with `/` and must not contain an empty interior
    /// segment; a single trailing `/` is stripped, so `/a/b/` parses to the
    /// same path as `/a/b`.
    pub fn parse(raw: &str) -> Result<Self, TreeError> {
        if !raw.starts_with('/') {
            return Err(TreeError::InvalidPathSyntax(raw.to_string()));
        }
        let mut parts: Vec<&str> = raw.split('/').collect();
        if parts.len() > 1 && parts.last() == Some(&"") {
            parts.pop();
        }
        if parts.iter().skip(1).any(|part| part.is_empty()) {
            return Err(TreeError::InvalidPathSyntax(raw.to_string()));
        }
        Ok(Self {
            segments: parts[1..].iter().map(|part| part.to_string()).collect(),
        })
    }

    /// Iterates over the segments of the path, excluding the implicit root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// The number of segments in the path; 0 for the root path.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether this is the root path `/`.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    // The push/pop pair below is used transiently while recursing into a
    // subtree; the mutation is never observable outside that traversal.

    pub(crate) fn push(&mut self, segment: &str) {
        self.segments.push(segment.to_string());
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl FromStr for TreePath {
    type Err = TreeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl Serialize for TreePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TreePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        let path = TreePath::parse("/").unwrap();
        assert!(path.is_root());
        assert_eq!(path.depth(), 0);
        assert_eq!(path.to_string(), "/");
        assert_eq!(path, TreePath::root());
    }

    #[test]
    fn test_parse_segments() {
        let path = TreePath::parse("/v1/gps/lat").unwrap();
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["v1", "gps", "lat"]);
        assert_eq!(path.to_string(), "/v1/gps/lat");
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(
            TreePath::parse("/a/b/").unwrap(),
            TreePath::parse("/a/b").unwrap()
        );
    }

    #[test]
    fn test_missing_leading_slash_is_rejected() {
        assert!(matches!(
            TreePath::parse("a/b"),
            Err(TreeError::InvalidPathSyntax(_))
        ));
        assert!(matches!(
            TreePath::parse(""),
            Err(TreeError::InvalidPathSyntax(_))
        ));
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        assert!(matches!(
            TreePath::parse("/a//b"),
            Err(TreeError::InvalidPathSyntax(_))
        ));
        assert!(matches!(
            TreePath::parse("//"),
            Err(TreeError::InvalidPathSyntax(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        for raw in ["/", "/v1", "/v1/gps/lat", "/a/b/"] {
            let path = TreePath::parse(raw).unwrap();
            assert_eq!(TreePath::parse(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn test_from_str() {
        let path: TreePath = "/v1/battery".parse().unwrap();
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn test_serde_as_string() {
        let path = TreePath::parse("/v1/gps").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/v1/gps\"");
        let back: TreePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
