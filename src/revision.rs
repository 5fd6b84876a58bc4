//! Revision identities and the range being narrowed.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable short-hash identity of a revision.
///
/// Symbolic names ("default", "tip", local numbers) are resolved into one of
/// these once per session and never compared directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The interval the delegate is currently narrowing.
///
/// `start` is the latest revision known good and `end` the earliest known bad
/// (or the caller-supplied endpoints before any test).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BisectionRange {
    pub start: RevisionId,
    pub end: RevisionId,
}

impl BisectionRange {
    pub fn new(start: RevisionId, end: RevisionId) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for BisectionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
