//! Filesystem Paths
//!
//! Immutable path values over a flat key space. A path is a sequence of
//! segments plus an absolute flag, tied to the filesystem instance that
//! produced it. The canonical string form never carries a trailing
//! separator except for the root `/`.

use std::cmp::Ordering;
use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Path separator
pub const SEPARATOR: &str = "/";

/// Identity of a filesystem instance. Paths from different instances are
/// never equal, even when they spell the same string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileSystemId(Uuid);

impl FileSystemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileSystemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileSystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A path within one filesystem instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Path {
    fs: FileSystemId,
    segments: Vec<String>,
    absolute: bool,
}

impl S3Path {
    /// The root path `/`
    pub fn root(fs: FileSystemId) -> Self {
        Self {
            fs,
            segments: Vec::new(),
            absolute: true,
        }
    }

    /// Parse a raw path string. Empty input is the root; a leading `/` makes
    /// the path absolute. Repeated and trailing separators are dropped.
    pub fn parse(fs: FileSystemId, raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root(fs);
        }

        Self {
            fs,
            segments: raw
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            absolute: raw.starts_with(SEPARATOR),
        }
    }

    fn with_segments(&self, segments: Vec<String>, absolute: bool) -> Self {
        Self {
            fs: self.fs,
            segments,
            absolute,
        }
    }

    /// Filesystem this path belongs to
    pub fn file_system_id(&self) -> FileSystemId {
        self.fs
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// Root of this path's filesystem
    pub fn root_of(&self) -> Self {
        Self::root(self.fs)
    }

    /// Parent path. The root has none; a single-segment path's parent is
    /// the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        if self.segments.len() <= 1 {
            return Some(self.root_of());
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        Some(self.with_segments(segments, self.absolute))
    }

    /// Last segment as a relative path
    pub fn file_name(&self) -> Option<Self> {
        self.segments
            .last()
            .map(|name| self.with_segments(vec![name.clone()], false))
    }

    /// Last segment as a string
    pub fn name_str(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Resolve `other` against this path. Absolute paths replace the base;
    /// relative ones are appended with exactly one separator and the result
    /// is normalized.
    pub fn resolve(&self, other: &S3Path) -> Self {
        if other.absolute {
            return other.clone();
        }
        if other.segments.is_empty() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        self.with_segments(segments, self.absolute).normalize()
    }

    /// Resolve a raw string against this path
    pub fn resolve_str(&self, other: &str) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        self.resolve(&S3Path::parse(self.fs, other))
    }

    /// Drop `.` segments and fold `..` into its predecessor. `..` never
    /// climbs above the root; a path that folds away entirely is the root.
    pub fn normalize(&self) -> Self {
        let mut segments: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.as_str() {
                "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment.clone()),
            }
        }

        if segments.is_empty() {
            return self.root_of();
        }
        self.with_segments(segments, self.absolute)
    }

    /// Not supported over a flat key space
    pub fn relativize(&self, _other: &S3Path) -> Result<Self> {
        Err(Error::NotSupported("relativize".into()))
    }

    pub fn to_absolute(&self) -> Self {
        self.with_segments(self.segments.clone(), true)
    }

    pub fn name_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment at `index` as a relative path
    pub fn name(&self, index: usize) -> Result<Self> {
        self.segments
            .get(index)
            .map(|name| self.with_segments(vec![name.clone()], false))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "name index {} out of range for {} segments",
                    index,
                    self.segments.len()
                ))
            })
    }

    /// Relative path of segments `begin..end`
    pub fn subpath(&self, begin: usize, end: usize) -> Result<Self> {
        if begin >= end || end > self.segments.len() {
            return Err(Error::InvalidArgument(format!(
                "invalid subpath range {}..{} for {} segments",
                begin,
                end,
                self.segments.len()
            )));
        }
        Ok(self.with_segments(self.segments[begin..end].to_vec(), false))
    }

    /// Component-wise prefix test
    pub fn starts_with(&self, other: &S3Path) -> bool {
        self.fs == other.fs
            && self.absolute == other.absolute
            && self.segments.starts_with(&other.segments)
    }

    /// Component-wise suffix test. An absolute `other` must match exactly.
    pub fn ends_with(&self, other: &S3Path) -> bool {
        if self.fs != other.fs {
            return false;
        }
        if other.absolute {
            return self == other;
        }
        !other.segments.is_empty() && self.segments.ends_with(&other.segments)
    }

    /// Each segment as a relative path
    pub fn components(&self) -> impl Iterator<Item = S3Path> + '_ {
        self.segments
            .iter()
            .map(move |name| self.with_segments(vec![name.clone()], false))
    }

    /// Store key: the normalized path without its leading separator. The
    /// root maps to the empty key.
    pub fn object_key(&self) -> String {
        self.normalize().segments.join(SEPARATOR)
    }

    /// Key prefix used for directory markers and listings
    pub fn directory_prefix(&self) -> String {
        let key = self.object_key();
        if key.is_empty() {
            key
        } else {
            key + SEPARATOR
        }
    }

    /// `s3://bucket/key` form
    pub fn to_uri(&self, bucket: &str) -> String {
        format!("s3://{}/{}", bucket, self.object_key())
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "{}", SEPARATOR)?;
        }
        write!(f, "{}", self.segments.join(SEPARATOR))
    }
}

impl PartialOrd for S3Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for S3Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string()
            .cmp(&other.to_string())
            .then_with(|| self.fs.cmp(&other.fs))
    }
}
