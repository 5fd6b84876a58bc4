//! Parser for `hg bisect` mark responses.
//!
//! Three shapes are recognized from the first line; anything without a
//! revision identifier is a [`ResponseParseError`].
use crate::label::Verdict;
use crate::revision::RevisionId;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static AMBIGUOUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Due to skipped revisions, the first (good|bad) revision could be any of:")
        .expect("ambiguous response pattern")
});
static FIRST_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^The first (good|bad) revision is:").expect("first revision pattern")
});
// e.g. "Testing changeset 52121:573c5fa45cc4 (440 changesets remaining, ~8 tests)"
static NUMBERED_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s|:)(\d+):([0-9a-f]{12})\b").expect("numbered hash pattern")
});
static BARE_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9a-f]{12})\b").expect("bare hash pattern"));

/// What the delegate wants next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateResponse {
    NextRevision(RevisionId),
    FirstRevisionFound {
        verdict: Verdict,
        rev: RevisionId,
    },
    /// Skips hide the boundary; any candidate could be the first one.
    Ambiguous {
        verdict: Verdict,
        candidates: Vec<RevisionId>,
    },
}

/// The delegate answered with something the controller cannot act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseParseError {
    Empty,
    MissingRevision { line: String },
}

impl fmt::Display for ResponseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "bisect delegate returned an empty response"),
            Self::MissingRevision { line } => {
                write!(f, "bisect delegate did not suggest a revision to test: {line:?}")
            }
        }
    }
}

impl std::error::Error for ResponseParseError {}

pub fn parse_response(text: &str) -> Result<DelegateResponse, ResponseParseError> {
    let mut lines = text.lines();
    let first = lines
        .by_ref()
        .map(str::trim_end)
        .find(|line| !line.trim().is_empty())
        .ok_or(ResponseParseError::Empty)?;

    if let Some(verdict) = captured_verdict(&AMBIGUOUS, first) {
        let mut candidates: Vec<RevisionId> = Vec::new();
        for rev in lines
            .filter(|line| line.trim_start().starts_with("changeset:"))
            .filter_map(extract_revision)
        {
            if !candidates.contains(&rev) {
                candidates.push(rev);
            }
        }
        return Ok(DelegateResponse::Ambiguous {
            verdict,
            candidates,
        });
    }

    if let Some(verdict) = captured_verdict(&FIRST_FOUND, first) {
        let line = lines.find(|line| !line.trim().is_empty()).unwrap_or_default();
        let rev = extract_revision(line).ok_or_else(|| ResponseParseError::MissingRevision {
            line: line.to_string(),
        })?;
        return Ok(DelegateResponse::FirstRevisionFound { verdict, rev });
    }

    extract_revision(first)
        .map(DelegateResponse::NextRevision)
        .ok_or_else(|| ResponseParseError::MissingRevision {
            line: first.to_string(),
        })
}

fn captured_verdict(pattern: &Regex, line: &str) -> Option<Verdict> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|word| Verdict::parse(word.as_str()))
}

/// Pull a short hash out of a delegate line, preferring `rev:hash` pairs.
pub fn extract_revision(line: &str) -> Option<RevisionId> {
    NUMBERED_HASH
        .captures(line)
        .or_else(|| BARE_HASH.captures(line))
        .and_then(|caps| caps.iter().flatten().last())
        .map(|hash| RevisionId::new(hash.as_str()))
}
