//! The stateful bisection primitive the controller drives.
//!
//! The delegate owns the good/bad/skip marks and decides which revision to
//! test next. Marks must arrive in test order, so a session holds exactly one
//! handle and issues calls serially.
mod response;

pub use response::{parse_response, DelegateResponse, ResponseParseError};

use crate::label::Verdict;
use crate::revision::RevisionId;
use crate::vcs::HgCommand;
use anyhow::{Context, Result};
use std::time::Duration;

const RESET_TIMEOUT: Duration = Duration::from_secs(99);
const SKIP_RANGES_TIMEOUT: Duration = Duration::from_secs(300);
const MARK_TIMEOUT: Duration = Duration::from_secs(999);

/// Serial handle on a bisection primitive.
pub trait BisectDelegate {
    /// Clear all marks and skip ranges.
    fn reset(&mut self) -> Result<()>;

    /// Treat every revision in `revset` as unusable without testing it.
    fn register_skip_ranges(&mut self, revset: &str) -> Result<()>;

    /// Record a verdict and return the delegate's raw textual answer.
    fn mark(&mut self, rev: &RevisionId, verdict: Verdict) -> Result<String>;
}

/// `hg bisect` in a checkout. Marks never touch the working copy (`-U`).
#[derive(Debug, Clone)]
pub struct HgBisect {
    hg: HgCommand,
}

impl HgBisect {
    pub fn new(hg: HgCommand) -> Self {
        Self { hg }
    }
}

impl BisectDelegate for HgBisect {
    fn reset(&mut self) -> Result<()> {
        self.hg
            .run(&["bisect", "-U", "-r"], Some(RESET_TIMEOUT))
            .context("reset hg bisect state")?;
        Ok(())
    }

    fn register_skip_ranges(&mut self, revset: &str) -> Result<()> {
        self.hg
            .run(&["bisect", "-U", "--skip", revset], Some(SKIP_RANGES_TIMEOUT))
            .context("register known-broken skip ranges")?;
        Ok(())
    }

    fn mark(&mut self, rev: &RevisionId, verdict: Verdict) -> Result<String> {
        let flag = format!("--{verdict}");
        self.hg
            .run(&["bisect", "-U", &flag, rev.as_str()], Some(MARK_TIMEOUT))
            .with_context(|| format!("mark {rev} as {verdict}"))
    }
}
