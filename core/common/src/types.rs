//! Common types used throughout querysync.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a mounted component scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Create a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One key in a property path.
///
/// Segments are kept as strings; a segment that parses as an unsigned
/// integer also addresses array elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment(String);

impl PathSegment {
    /// Get the segment as a string key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the segment as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structured path from a component root to a nested property.
///
/// Parsed once from dot notation (`tableFilters.filter_1.value`) or
/// bracket notation (`items[0][name]`), then reused for every access.
/// Serializes as its dot-notation string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// Create a path from segments.
    ///
    /// # Errors
    /// - Returns error if there are no segments or any segment is empty
    pub fn from_segments<S: Into<PathSegment>>(segments: Vec<S>) -> crate::Result<Self> {
        let segments: Vec<PathSegment> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(crate::Error::InvalidPath(
                "Path must have at least one segment".to_string(),
            ));
        }
        if segments.iter().any(|s| s.0.is_empty()) {
            return Err(crate::Error::InvalidPath(
                "Path segment cannot be empty".to_string(),
            ));
        }
        Ok(Self { segments })
    }

    /// Parse a dot and/or bracket notation path.
    ///
    /// # Errors
    /// - Empty path or empty segment (`a..b`, `a[]`)
    /// - Unbalanced brackets
    pub fn parse(path: &str) -> crate::Result<Self> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars();
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    } else if !after_bracket {
                        return Err(invalid(path));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    } else if segments.is_empty() {
                        return Err(invalid(path));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed || inner.is_empty() {
                        return Err(invalid(path));
                    }
                    segments.push(inner);
                    after_bracket = true;
                }
                ']' => return Err(invalid(path)),
                _ if after_bracket => return Err(invalid(path)),
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(current);
        } else if path.ends_with('.') {
            return Err(invalid(path));
        }

        Self::from_segments(segments).map_err(|_| invalid(path))
    }

    /// Get the path segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Get the last segment.
    pub fn leaf(&self) -> &PathSegment {
        // from_segments guarantees at least one segment
        &self.segments[self.segments.len() - 1]
    }

    /// Get the first segment.
    pub fn root(&self) -> &PathSegment {
        &self.segments[0]
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; paths have at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self { segments })
        }
    }

    /// Join this path with a child segment.
    pub fn join(&self, child: impl Into<PathSegment>) -> crate::Result<Self> {
        let child = child.into();
        if child.0.is_empty() {
            return Err(crate::Error::InvalidPath(
                "Child segment cannot be empty".to_string(),
            ));
        }
        let mut segments = self.segments.clone();
        segments.push(child);
        Ok(Self { segments })
    }

    /// Check whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &PropertyPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Render in dot notation.
    pub fn to_dotted(&self) -> String {
        self.segments
            .iter()
            .map(PathSegment::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn invalid(path: &str) -> crate::Error {
    crate::Error::InvalidPath(format!("Cannot parse property path '{}'", path))
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}

impl TryFrom<String> for PropertyPath {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<PropertyPath> for String {
    fn from(path: PropertyPath) -> Self {
        path.to_dotted()
    }
}

impl std::str::FromStr for PropertyPath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}
