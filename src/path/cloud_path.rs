//! CloudPath value type
//!
//! A path is an ordered list of non-empty segments plus an absolute flag.
//! Equality, hashing and ordering only look at those two fields, so
//! `"/a//b/"` and `"/a/b"` are the same key.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Segment separator used when parsing and displaying paths
pub const SEPARATOR: char = '/';

const CURRENT_DIR: &str = ".";
const PARENT_DIR: &str = "..";

/// Errors from path arithmetic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("cannot relativize {other} against {base}: absoluteness differs")]
    MixedAbsoluteness { base: CloudPath, other: CloudPath },

    #[error("segment range {begin}..{end} out of bounds for {path}")]
    OutOfBounds {
        path: CloudPath,
        begin: usize,
        end: usize,
    },
}

/// Immutable hierarchical path
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudPath {
    absolute: bool,
    segments: Vec<String>,
}

impl CloudPath {
    /// Parse a path, discarding empty segments
    pub fn new(path: &str) -> Self {
        let segments = path
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            absolute: path.starts_with(SEPARATOR),
            segments,
        }
    }

    /// The absolute root `/`
    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Build a path from already-split segments (empty ones are dropped)
    pub fn from_segments<I, S>(absolute: bool, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            absolute,
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for `/` only
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.segments.iter()
    }

    /// Last segment, if any
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment; `None` for the root or an empty path
    pub fn parent(&self) -> Option<CloudPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Segments `begin..end` as a relative path
    pub fn subpath(&self, begin: usize, end: usize) -> Result<CloudPath, PathError> {
        if begin > end || end > self.segments.len() {
            return Err(PathError::OutOfBounds {
                path: self.clone(),
                begin,
                end,
            });
        }
        Ok(Self {
            absolute: false,
            segments: self.segments[begin..end].to_vec(),
        })
    }

    /// Segment-prefix test. Absoluteness must match.
    ///
    /// Every path starts with itself, and every absolute path starts with `/`.
    pub fn starts_with(&self, other: &CloudPath) -> bool {
        self.absolute == other.absolute
            && other.segments.len() <= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Segment-suffix test.
    ///
    /// An absolute `other` only matches when it equals `self`.
    pub fn ends_with(&self, other: &CloudPath) -> bool {
        if other.absolute {
            return self == other;
        }
        other.segments.len() <= self.segments.len()
            && self
                .segments
                .iter()
                .rev()
                .zip(other.segments.iter().rev())
                .all(|(a, b)| a == b)
    }

    /// Lexically resolve `.` and `..`
    ///
    /// `..` pops the last segment unless there is none or it is itself `..`,
    /// in which case the `..` is kept.
    pub fn normalize(&self) -> CloudPath {
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.as_str() {
                CURRENT_DIR => {}
                PARENT_DIR => {
                    if out.last().is_some_and(|last| last != PARENT_DIR) {
                        out.pop();
                    } else {
                        out.push(PARENT_DIR.to_string());
                    }
                }
                _ => out.push(segment.clone()),
            }
        }
        Self {
            absolute: self.absolute,
            segments: out,
        }
    }

    /// Append `other`, or replace `self` with it when `other` is absolute
    pub fn resolve(&self, other: &CloudPath) -> CloudPath {
        if other.absolute {
            return other.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// Resolve `other` against this path's parent
    ///
    /// Without a parent the result is `other` itself.
    pub fn resolve_sibling(&self, other: &CloudPath) -> CloudPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// Relative path that leads from `self` to `other`
    ///
    /// Both sides are normalized first, so `.` and `..` segments in either
    /// path do not skew the number of `..` steps.
    pub fn relativize(&self, other: &CloudPath) -> Result<CloudPath, PathError> {
        if self.absolute != other.absolute {
            return Err(PathError::MixedAbsoluteness {
                base: self.clone(),
                other: other.clone(),
            });
        }

        let base = self.normalize();
        let other = other.normalize();
        let shared = base
            .segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .count();

        let ups = base.segments.len() - shared;
        let mut segments = Vec::with_capacity(ups + other.segments.len() - shared);
        segments.extend(std::iter::repeat(PARENT_DIR.to_string()).take(ups));
        segments.extend(other.segments[shared..].iter().cloned());

        Ok(Self {
            absolute: false,
            segments,
        })
    }
}

impl Ord for CloudPath {
    fn cmp(&self, other: &Self) -> Ordering {
        // absolute before relative, then segment-wise, then shorter first
        other
            .absolute
            .cmp(&self.absolute)
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for CloudPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "{}", SEPARATOR)?;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudPath({:?})", self.to_string())
    }
}

impl FromStr for CloudPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CloudPath::new(s))
    }
}

impl From<&str> for CloudPath {
    fn from(s: &str) -> Self {
        CloudPath::new(s)
    }
}

impl<'a> IntoIterator for &'a CloudPath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
