//! Source-control operations the bisection core needs.
mod hg;

pub use hg::{HgCommand, HgRepo};

use crate::revision::RevisionId;
use anyhow::Result;

/// Revision history queries plus the two destructive working-copy resets.
pub trait Vcs {
    /// Resolve a symbolic name, number, or revset to a stable identifier.
    fn resolve(&self, name: &str) -> Result<RevisionId>;

    fn parents(&self, rev: &RevisionId) -> Result<Vec<RevisionId>>;

    /// True when `ancestor` is an ancestor of (or equal to) `descendant`.
    fn is_ancestor(&self, ancestor: &RevisionId, descendant: &RevisionId) -> Result<bool>;

    fn common_ancestor(&self, a: &RevisionId, b: &RevisionId) -> Result<RevisionId>;

    /// Discard local changes and check out `rev` (a symbolic name is fine).
    fn update_clean(&self, rev: &str) -> Result<()>;

    /// Remove untracked and ignored files from the working copy.
    fn purge_all(&self) -> Result<()>;
}
