//! Post-search check of a blamed merge.
//!
//! When the delegate blames a revision with several parents, every parent is
//! labeled (testing it if needed) and the result is classified. The label
//! history only grows here.
use crate::build::RevisionTester;
use crate::label::{Label, LabelHistory, Verdict};
use crate::revision::{BisectionRange, RevisionId};
use crate::vcs::Vcs;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlameOutcome {
    /// No parent shares the blamed verdict: the merge itself introduced it.
    Trustworthy,
    /// A parent shares the blamed verdict; some tested label is wrong.
    Contradicted,
    /// Contradicted, and a parent lies outside the original range.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlameReport {
    pub blamed_rev: RevisionId,
    pub blamed_verdict: Verdict,
    pub parents: Vec<RevisionId>,
    pub outcome: BlameOutcome,
    pub common_ancestor: Option<RevisionId>,
    pub common_ancestor_label: Option<Label>,
}

impl BlameReport {
    /// Human-readable account of why the merge was blamed.
    pub fn explanation(&self) -> Vec<String> {
        match self.outcome {
            BlameOutcome::Trustworthy => vec![
                "The bug was introduced by a merge (it was not present on either parent)."
                    .to_string(),
                "Which patches from each side of the merge contributed to it is unknown."
                    .to_string(),
            ],
            BlameOutcome::Contradicted => vec![
                "Most likely, the bisect result was unhelpful because one of the tested revisions"
                    .to_string(),
                "was marked as \"good\" or \"bad\" for the wrong reason.".to_string(),
                "Which revision was mislabeled cannot be determined from this session.".to_string(),
            ],
            BlameOutcome::Incomplete => {
                let mut lines = vec![
                    "Bisect blamed the merge because the initial range did not include one of the parents."
                        .to_string(),
                ];
                if let (Some(ancestor), [first, second, ..]) =
                    (self.common_ancestor.as_ref(), self.parents.as_slice())
                {
                    lines.push(format!(
                        "The common ancestor of {first} and {second} is {ancestor}."
                    ));
                }
                if let Some(label) = &self.common_ancestor_label {
                    lines.push(format!("Common ancestor: {label}"));
                }
                lines
            }
        }
    }

    /// Next step for the caller, when one exists.
    pub fn recommendation(&self) -> Option<String> {
        match (self.outcome, &self.common_ancestor) {
            (BlameOutcome::Incomplete, Some(ancestor)) => Some(format!(
                "Consider re-running with -s {ancestor} -e {} in a configuration where the \
                 earliest working revision is before the common ancestor.",
                self.blamed_rev
            )),
            (BlameOutcome::Contradicted, _) => Some(
                "Re-check the start and end revisions; one of them was likely mislabeled."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

pub struct BlameVerifier<'a> {
    vcs: &'a dyn Vcs,
    tester: &'a mut dyn RevisionTester,
    labels: &'a mut LabelHistory,
}

impl<'a> BlameVerifier<'a> {
    pub fn new(
        vcs: &'a dyn Vcs,
        tester: &'a mut dyn RevisionTester,
        labels: &'a mut LabelHistory,
    ) -> Self {
        Self {
            vcs,
            tester,
            labels,
        }
    }

    /// Returns `None` when the blamed revision is not a merge.
    pub fn verify(
        mut self,
        blamed: &RevisionId,
        blamed_verdict: Verdict,
        original: &BisectionRange,
    ) -> Result<Option<BlameReport>> {
        let parents = self.vcs.parents(blamed)?;
        if parents.len() < 2 {
            return Ok(None);
        }
        tracing::info!(
            rev = %blamed,
            parents = %join_revs(&parents),
            "blamed revision is a merge; checking its parents"
        );

        let mut contradicted = false;
        let mut missed_common_ancestor = false;
        for parent in &parents {
            if !self.labels.contains(parent) {
                tracing::info!(rev = %parent, "parent of the blamed revision was never tested; testing it now");
                if !self.vcs.is_ancestor(&original.start, parent)?
                    && !self.vcs.is_ancestor(&original.end, parent)?
                {
                    tracing::info!(
                        rev = %parent,
                        start = %original.start,
                        end = %original.end,
                        "parent is not a descendant of either endpoint"
                    );
                    missed_common_ancestor = true;
                }
                let label = self.tester.test(parent)?;
                let label = self.labels.record(parent, label);
                tracing::info!(rev = %parent, verdict = %label.verdict, reason = %label.reason, "tested parent");
            }

            match self.labels.verdict(parent) {
                Some(Verdict::Skip) => tracing::info!(
                    rev = %parent,
                    "parent was marked skip, so the regression window includes it"
                ),
                Some(verdict) if verdict == blamed_verdict => {
                    tracing::warn!(rev = %parent, verdict = %verdict, "bisect lied: parent shares the blamed verdict");
                    contradicted = true;
                }
                Some(verdict) if Some(verdict) == blamed_verdict.opposite() => tracing::debug!(
                    rev = %parent,
                    verdict = %verdict,
                    "parent label is the opposite of the blamed label"
                ),
                _ => {}
            }
        }

        let mut report = BlameReport {
            blamed_rev: blamed.clone(),
            blamed_verdict,
            parents,
            outcome: BlameOutcome::Trustworthy,
            common_ancestor: None,
            common_ancestor_label: None,
        };
        if contradicted && missed_common_ancestor {
            let ancestor = self
                .vcs
                .common_ancestor(&report.parents[0], &report.parents[1])?;
            let label = match self.labels.get(&ancestor) {
                Some(label) => label.clone(),
                None => {
                    let label = self.tester.test(&ancestor)?;
                    self.labels.record(&ancestor, label).clone()
                }
            };
            tracing::info!(rev = %ancestor, verdict = %label.verdict, reason = %label.reason, "tested common ancestor");
            report.outcome = BlameOutcome::Incomplete;
            report.common_ancestor = Some(ancestor);
            report.common_ancestor_label = Some(label);
        } else if contradicted {
            report.outcome = BlameOutcome::Contradicted;
        }
        Ok(Some(report))
    }
}

fn join_revs(revs: &[RevisionId]) -> String {
    revs.iter()
        .map(RevisionId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "blame_tests.rs"]
mod tests;
