//! Verdicts and the per-session label history.
//!
//! Every tested revision receives exactly one label. The history is the only
//! memory a session keeps, and the blame verifier reads it after the search.
use crate::revision::RevisionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Three-valued verdict understood by the bisection delegate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    Bad,
    Skip,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
            Verdict::Skip => "skip",
        }
    }

    /// The verdict on the other side of a good/bad boundary. `skip` has none.
    pub fn opposite(self) -> Option<Verdict> {
        match self {
            Verdict::Good => Some(Verdict::Bad),
            Verdict::Bad => Some(Verdict::Good),
            Verdict::Skip => None,
        }
    }

    pub fn parse(text: &str) -> Option<Verdict> {
        match text {
            "good" => Some(Verdict::Good),
            "bad" => Some(Verdict::Bad),
            "skip" => Some(Verdict::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict plus the human-readable reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub verdict: Verdict,
    pub reason: String,
}

impl Label {
    pub fn new(verdict: Verdict, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
        }
    }

    pub fn good(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Good, reason)
    }

    pub fn bad(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Bad, reason)
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Skip, reason)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.verdict, self.reason)
    }
}

/// Labels recorded during one session, keyed by revision identity.
///
/// Labels are write-once: recording a second label for a revision keeps the
/// first one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelHistory {
    labels: BTreeMap<RevisionId, Label>,
}

impl LabelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label and return the label now stored for `rev`.
    pub fn record(&mut self, rev: &RevisionId, label: Label) -> &Label {
        if let Some(existing) = self.labels.get(rev) {
            if existing.verdict != label.verdict {
                tracing::warn!(
                    rev = %rev,
                    kept = %existing,
                    discarded = %label,
                    "revision already labeled; keeping the first label"
                );
            }
        }
        self.labels.entry(rev.clone()).or_insert(label)
    }

    pub fn get(&self, rev: &RevisionId) -> Option<&Label> {
        self.labels.get(rev)
    }

    pub fn verdict(&self, rev: &RevisionId) -> Option<Verdict> {
        self.get(rev).map(|label| label.verdict)
    }

    pub fn contains(&self, rev: &RevisionId) -> bool {
        self.labels.contains_key(rev)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RevisionId, &Label)> {
        self.labels.iter()
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.labels
            .values()
            .filter(|label| label.verdict == verdict)
            .count()
    }
}
