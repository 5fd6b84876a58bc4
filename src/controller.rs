//! The bisection session state machine.
//!
//! A session resolves its endpoints once, drives the delegate with one label
//! per tested revision, and stops on a blamed revision, an ambiguous window,
//! or too many skips. Terminal cleanup (delegate reset and working-copy
//! restore) runs on every exit path, including errors.
use crate::blame::{BlameReport, BlameVerifier};
use crate::build::RevisionTester;
use crate::delegate::{parse_response, BisectDelegate, DelegateResponse};
use crate::label::{Label, LabelHistory, Verdict};
use crate::report::sanitize_changeset_message;
use crate::revision::{BisectionRange, RevisionId};
use crate::util::first_nonempty_line;
use crate::vcs::Vcs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Instant;

/// Skips tolerated before a session gives up on narrowing.
pub const MAX_TOLERATED_SKIPS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    TestingInitialEndpoints,
    Bisecting,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Start and end names; resolved to hashes once when the session begins.
    pub start: String,
    pub end: String,
    /// Test both endpoints before bisecting instead of trusting them.
    pub test_initial_revs: bool,
    /// Revset of revisions known not to build, marked skipped up front.
    pub skip_ranges: Option<String>,
    pub reset_working_copy_first: bool,
    /// Revision the working copy returns to during cleanup.
    pub restore_rev: String,
    pub max_tolerated_skips: usize,
    pub changeset_url_base: Option<String>,
}

impl SessionSettings {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            test_initial_revs: true,
            skip_ranges: None,
            reset_working_copy_first: false,
            restore_rev: "default".to_string(),
            max_tolerated_skips: MAX_TOLERATED_SKIPS,
            changeset_url_base: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    Blamed {
        verdict: Verdict,
        rev: RevisionId,
    },
    Ambiguous {
        verdict: Verdict,
        candidates: Vec<RevisionId>,
    },
    SkipOverflow {
        skips: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub original_range: BisectionRange,
    pub final_range: BisectionRange,
    pub stop: StopReason,
    pub blame: Option<BlameReport>,
    pub labels: LabelHistory,
    pub iterations: usize,
    pub skips: usize,
}

enum Step {
    Test(RevisionId),
    Stop(StopReason),
}

pub struct BisectionController<'a> {
    vcs: &'a dyn Vcs,
    delegate: &'a mut dyn BisectDelegate,
    tester: &'a mut dyn RevisionTester,
    settings: SessionSettings,
    state: SessionState,
    labels: LabelHistory,
    iterations: usize,
    skips: usize,
    round: i64,
}

impl<'a> BisectionController<'a> {
    pub fn new(
        vcs: &'a dyn Vcs,
        delegate: &'a mut dyn BisectDelegate,
        tester: &'a mut dyn RevisionTester,
        settings: SessionSettings,
    ) -> Self {
        let round = if settings.test_initial_revs { -1 } else { 1 };
        Self {
            vcs,
            delegate,
            tester,
            settings,
            state: SessionState::Initializing,
            labels: LabelHistory::new(),
            iterations: 0,
            skips: 0,
            round,
        }
    }

    /// Run the session to completion. Cleanup errors surface only when the
    /// session itself succeeded.
    pub fn run(mut self) -> Result<SessionOutcome> {
        let outcome = self.drive();
        if let Err(err) = &outcome {
            tracing::error!(state = ?self.state, error = %format!("{err:#}"), "session aborted");
        }
        let cleanup = self.cleanup();
        match (outcome, cleanup) {
            (Ok(outcome), cleanup) => cleanup.map(|()| outcome),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                tracing::error!(error = %format!("{cleanup_err:#}"), "cleanup after aborted session failed");
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<SessionOutcome> {
        let started = Instant::now();
        let original = self.initialize()?;
        let mut range = original.clone();

        let mut step = if self.settings.test_initial_revs {
            self.enter(SessionState::TestingInitialEndpoints);
            self.test_endpoints(&mut range)?
        } else {
            self.trust_endpoints(&range)?
        };

        let stop = loop {
            match step {
                Step::Stop(reason) => break reason,
                Step::Test(rev) => step = self.bisect_once(&rev, &mut range)?,
            }
        };
        self.enter(SessionState::Terminated);

        let blame = match &stop {
            StopReason::Blamed { verdict, rev } => {
                BlameVerifier::new(self.vcs, &mut *self.tester, &mut self.labels)
                    .verify(rev, *verdict, &original)?
            }
            _ => None,
        };

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            iterations = self.iterations,
            "session finished"
        );
        Ok(SessionOutcome {
            original_range: original,
            final_range: range,
            stop,
            blame,
            labels: std::mem::take(&mut self.labels),
            iterations: self.iterations,
            skips: self.skips,
        })
    }

    fn enter(&mut self, state: SessionState) {
        tracing::debug!(from = ?self.state, to = ?state, "session state change");
        self.state = state;
    }

    fn initialize(&mut self) -> Result<BisectionRange> {
        let start = self
            .vcs
            .resolve(&self.settings.start)
            .with_context(|| format!("resolve start revision {}", self.settings.start))?;
        let end = self
            .vcs
            .resolve(&self.settings.end)
            .with_context(|| format!("resolve end revision {}", self.settings.end))?;
        let range = BisectionRange::new(start, end);
        tracing::info!(range = %range, "bisecting in range");

        if self.settings.reset_working_copy_first {
            tracing::info!(rev = %self.settings.restore_rev, "resetting working copy before bisecting");
            self.vcs.update_clean(&self.settings.restore_rev)?;
            self.vcs.purge_all()?;
        }

        self.delegate.reset()?;
        if let Some(revset) = self
            .settings
            .skip_ranges
            .as_deref()
            .filter(|revset| !revset.trim().is_empty())
        {
            tracing::info!(revset, "registering known-broken ranges as skipped");
            self.delegate.register_skip_ranges(revset)?;
        }
        Ok(range)
    }

    /// End first, then start. Until both are marked the delegate has nothing
    /// to suggest, so only a terminal answer is acted on after the first mark.
    fn test_endpoints(&mut self, range: &mut BisectionRange) -> Result<Step> {
        // Marking the end may move either bound, so both are taken up front.
        let (start, end) = (range.start.clone(), range.end.clone());
        let Some(text) = self.test_and_mark(&end, range)? else {
            return Ok(self.skip_overflow());
        };
        match parse_response(&text) {
            Ok(response @ DelegateResponse::FirstRevisionFound { .. })
            | Ok(response @ DelegateResponse::Ambiguous { .. }) => {
                return self.interpret(response, &text);
            }
            _ => tracing::debug!(rev = %end, "waiting for the other endpoint before narrowing"),
        }

        let Some(text) = self.test_and_mark(&start, range)? else {
            return Ok(self.skip_overflow());
        };
        tracing::info!("finished testing the initial boundary revisions");
        self.enter(SessionState::Bisecting);
        self.parse_and_interpret(&text)
    }

    fn trust_endpoints(&mut self, range: &BisectionRange) -> Result<Step> {
        self.labels
            .record(&range.start, Label::good("assumed start rev is good"));
        self.labels
            .record(&range.end, Label::bad("assumed end rev is bad"));
        self.delegate.mark(&range.start, Verdict::Good)?;
        let text = self.delegate.mark(&range.end, Verdict::Bad)?;
        self.enter(SessionState::Bisecting);
        self.parse_and_interpret(&text)
    }

    fn bisect_once(&mut self, rev: &RevisionId, range: &mut BisectionRange) -> Result<Step> {
        match self.test_and_mark(rev, range)? {
            Some(text) => self.parse_and_interpret(&text),
            None => Ok(self.skip_overflow()),
        }
    }

    /// Test `rev`, record its label and mark the delegate. `None` means the
    /// skip budget ran out and the revision was left unmarked.
    fn test_and_mark(
        &mut self,
        rev: &RevisionId,
        range: &mut BisectionRange,
    ) -> Result<Option<String>> {
        let started = Instant::now();
        let label = self.tester.test(rev)?;
        let label = self.labels.record(rev, label).clone();
        self.iterations += 1;
        tracing::info!(rev = %rev, verdict = %label.verdict, reason = %label.reason, "labeled revision");

        if label.verdict == Verdict::Skip {
            self.skips += 1;
            if self.skips > self.settings.max_tolerated_skips {
                tracing::warn!(
                    skips = self.skips,
                    limit = self.settings.max_tolerated_skips,
                    "skip limit exceeded; stopping"
                );
                return Ok(None);
            }
        }

        let text = self.delegate.mark(rev, label.verdict)?;
        match label.verdict {
            Verdict::Good => range.start = rev.clone(),
            Verdict::Bad => range.end = rev.clone(),
            Verdict::Skip => {}
        }
        self.log_round();
        tracing::info!(
            rev = %rev,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "iteration finished"
        );
        Ok(Some(text))
    }

    fn log_round(&mut self) {
        if self.round > 0 {
            let exponent = u32::try_from(self.round).unwrap_or(u32::MAX);
            tracing::info!(
                n = self.round,
                two_pow_n = 2_u64.saturating_pow(exponent),
                "bisecting round"
            );
        }
        self.round += 1;
    }

    fn skip_overflow(&self) -> Step {
        Step::Stop(StopReason::SkipOverflow { skips: self.skips })
    }

    fn parse_and_interpret(&mut self, text: &str) -> Result<Step> {
        let response = parse_response(text).context("interpret bisect delegate response")?;
        self.interpret(response, text)
    }

    fn interpret(&mut self, response: DelegateResponse, text: &str) -> Result<Step> {
        let url_base = self.settings.changeset_url_base.as_deref();
        Ok(match response {
            DelegateResponse::NextRevision(rev) => {
                tracing::info!("{}", first_nonempty_line(text).unwrap_or_default());
                Step::Test(rev)
            }
            DelegateResponse::FirstRevisionFound { verdict, rev } => {
                tracing::info!(
                    rev = %rev,
                    verdict = %verdict,
                    "probably related to the following changeset:\n{}",
                    sanitize_changeset_message(text, url_base)
                );
                Step::Stop(StopReason::Blamed { verdict, rev })
            }
            DelegateResponse::Ambiguous {
                verdict,
                candidates,
            } => {
                tracing::info!(
                    verdict = %verdict,
                    "{}",
                    sanitize_changeset_message(text, url_base)
                );
                Step::Stop(StopReason::Ambiguous {
                    verdict,
                    candidates,
                })
            }
        })
    }

    fn cleanup(&mut self) -> Result<()> {
        tracing::info!("resetting bisect state");
        let reset = self
            .delegate
            .reset()
            .context("reset bisect state during cleanup");
        tracing::info!(rev = %self.settings.restore_rev, "restoring working directory");
        let restore = self
            .vcs
            .update_clean(&self.settings.restore_rev)
            .context("restore working directory during cleanup");
        reset.and(restore)
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
