//! In-memory collaborators shared by unit tests.
use crate::build::RevisionTester;
use crate::delegate::BisectDelegate;
use crate::label::{Label, Verdict};
use crate::revision::RevisionId;
use crate::vcs::Vcs;
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Twelve-hex-digit id for the commit at `index`.
pub fn hash_for(index: usize) -> RevisionId {
    RevisionId::new(format!("{:012x}", 0x1000_0000_0000_u64 + index as u64))
}

/// A revision DAG with recorded working-copy mutations.
pub struct FakeRepo {
    revs: Vec<RevisionId>,
    parents: HashMap<RevisionId, Vec<RevisionId>>,
    names: HashMap<String, RevisionId>,
    updates: RefCell<Vec<String>>,
    purges: Cell<usize>,
}

impl FakeRepo {
    /// `commits` lists `(name, parent names)` in topological order.
    pub fn dag(commits: &[(&str, &[&str])]) -> Self {
        let mut repo = Self {
            revs: Vec::new(),
            parents: HashMap::new(),
            names: HashMap::new(),
            updates: RefCell::new(Vec::new()),
            purges: Cell::new(0),
        };
        for (index, (name, parents)) in commits.iter().enumerate() {
            let id = hash_for(index);
            let parent_ids = parents
                .iter()
                .map(|parent| repo.names[*parent].clone())
                .collect();
            repo.parents.insert(id.clone(), parent_ids);
            repo.names.insert((*name).to_string(), id.clone());
            repo.names.insert(index.to_string(), id.clone());
            repo.revs.push(id);
        }
        if let Some(last) = repo.revs.last().cloned() {
            repo.names.insert("default".to_string(), last.clone());
            repo.names.insert("tip".to_string(), last);
        }
        repo
    }

    /// `n` commits in a single line, named by their index.
    pub fn linear(n: usize) -> Self {
        let names: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
        let parent_names: Vec<Vec<&str>> = (0..n)
            .map(|i| {
                if i == 0 {
                    Vec::new()
                } else {
                    vec![names[i - 1].as_str()]
                }
            })
            .collect();
        let commits: Vec<(&str, &[&str])> = names
            .iter()
            .zip(parent_names.iter())
            .map(|(name, parents)| (name.as_str(), parents.as_slice()))
            .collect();
        Self::dag(&commits)
    }

    pub fn rev(&self, index: usize) -> RevisionId {
        self.revs[index].clone()
    }

    pub fn named(&self, name: &str) -> RevisionId {
        self.names[name].clone()
    }

    pub fn revs(&self) -> &[RevisionId] {
        &self.revs
    }

    pub fn index_of(&self, rev: &RevisionId) -> Option<usize> {
        self.revs.iter().position(|candidate| candidate == rev)
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.borrow().clone()
    }

    pub fn purges(&self) -> usize {
        self.purges.get()
    }

    fn ancestors(&self, rev: &RevisionId) -> Vec<RevisionId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([rev.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(parents) = self.parents.get(&next) {
                queue.extend(parents.iter().cloned());
            }
            order.push(next);
        }
        order
    }
}

impl Vcs for FakeRepo {
    fn resolve(&self, name: &str) -> Result<RevisionId> {
        if let Some(inner) = name.strip_prefix("max(").and_then(|s| s.strip_suffix(')')) {
            let mut best: Option<(usize, RevisionId)> = None;
            for part in inner.split('+').map(str::trim) {
                let rev = self.resolve(part)?;
                let index = self.index_of(&rev).unwrap_or_default();
                if best.as_ref().is_none_or(|(current, _)| index > *current) {
                    best = Some((index, rev));
                }
            }
            return best
                .map(|(_, rev)| rev)
                .ok_or_else(|| anyhow!("empty revset {name}"));
        }
        if let Some(rev) = self.names.get(name) {
            return Ok(rev.clone());
        }
        self.revs
            .iter()
            .find(|rev| rev.as_str() == name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown revision {name}"))
    }

    fn parents(&self, rev: &RevisionId) -> Result<Vec<RevisionId>> {
        self.parents
            .get(rev)
            .cloned()
            .ok_or_else(|| anyhow!("unknown revision {rev}"))
    }

    fn is_ancestor(&self, ancestor: &RevisionId, descendant: &RevisionId) -> Result<bool> {
        Ok(self.ancestors(descendant).contains(ancestor))
    }

    fn common_ancestor(&self, a: &RevisionId, b: &RevisionId) -> Result<RevisionId> {
        let of_a: HashSet<RevisionId> = self.ancestors(a).into_iter().collect();
        self.ancestors(b)
            .into_iter()
            .find(|rev| of_a.contains(rev))
            .ok_or_else(|| anyhow!("{a} and {b} have no common ancestor"))
    }

    fn update_clean(&self, rev: &str) -> Result<()> {
        self.updates.borrow_mut().push(rev.to_string());
        Ok(())
    }

    fn purge_all(&self) -> Result<()> {
        self.purges.set(self.purges.get() + 1);
        Ok(())
    }
}

/// Linear-history `hg bisect` simulator emitting the real textual answers.
pub struct FakeBisect {
    revs: Vec<RevisionId>,
    good: BTreeSet<usize>,
    bad: BTreeSet<usize>,
    skipped: BTreeSet<usize>,
    pub marks: Vec<(RevisionId, Verdict)>,
    pub resets: usize,
    pub skip_ranges: Vec<String>,
}

impl FakeBisect {
    pub fn new(revs: &[RevisionId]) -> Self {
        Self {
            revs: revs.to_vec(),
            good: BTreeSet::new(),
            bad: BTreeSet::new(),
            skipped: BTreeSet::new(),
            marks: Vec::new(),
            resets: 0,
            skip_ranges: Vec::new(),
        }
    }

    pub fn skip_marks(&self) -> usize {
        self.marks
            .iter()
            .filter(|(_, verdict)| *verdict == Verdict::Skip)
            .count()
    }

    fn index(&self, rev: &RevisionId) -> Result<usize> {
        self.revs
            .iter()
            .position(|candidate| candidate == rev)
            .ok_or_else(|| anyhow!("unknown revision {rev}"))
    }

    fn changeset_line(&self, index: usize) -> String {
        format!("changeset:   {index}:{}", self.revs[index])
    }

    fn respond(&self) -> String {
        let (Some(&max_good), Some(&min_bad)) = (self.good.last(), self.bad.first()) else {
            return String::new();
        };
        let (lo, hi, word) = if max_good < min_bad {
            (max_good, min_bad, "bad")
        } else {
            let (Some(&max_bad), Some(&min_good)) = (self.bad.last(), self.good.first()) else {
                return String::new();
            };
            if max_bad >= min_good {
                return format!("Inconsistent state, {max_bad} is good and bad\n");
            }
            (max_bad, min_good, "good")
        };
        if hi == lo + 1 {
            return format!(
                "The first {word} revision is:\n{}\nuser:        Dev <dev@example.com>\nsummary:     commit {hi}\n",
                self.changeset_line(hi)
            );
        }
        let candidates: Vec<usize> = (lo + 1..hi)
            .filter(|index| !self.skipped.contains(index))
            .collect();
        let mid = (lo + hi) / 2;
        let Some(&next) = candidates.iter().min_by_key(|index| index.abs_diff(mid)) else {
            let mut text =
                format!("Due to skipped revisions, the first {word} revision could be any of:\n");
            for index in lo + 1..=hi {
                text.push_str(&self.changeset_line(index));
                text.push_str("\nuser:        Dev <dev@example.com>\n\n");
            }
            return text;
        };
        format!(
            "Testing changeset {next}:{} ({} changesets remaining, ~{} tests)\n",
            self.revs[next],
            hi - lo - 1,
            usize::BITS - (hi - lo).leading_zeros()
        )
    }
}

impl BisectDelegate for FakeBisect {
    fn reset(&mut self) -> Result<()> {
        self.good.clear();
        self.bad.clear();
        self.skipped.clear();
        self.resets += 1;
        Ok(())
    }

    fn register_skip_ranges(&mut self, revset: &str) -> Result<()> {
        self.skip_ranges.push(revset.to_string());
        for range in revset.split('+').map(str::trim) {
            let (from, to) = range
                .split_once("::")
                .ok_or_else(|| anyhow!("unsupported revset {range}"))?;
            let from = self.index(&RevisionId::new(from))?;
            let to = self.index(&RevisionId::new(to))?;
            self.skipped.extend(from..=to);
        }
        Ok(())
    }

    fn mark(&mut self, rev: &RevisionId, verdict: Verdict) -> Result<String> {
        let index = self.index(rev)?;
        match verdict {
            Verdict::Good => self.good.insert(index),
            Verdict::Bad => self.bad.insert(index),
            Verdict::Skip => self.skipped.insert(index),
        };
        self.marks.push((rev.clone(), verdict));
        Ok(self.respond())
    }
}

/// Delegate that answers every mark with a canned response.
pub struct CannedDelegate {
    pub answer: String,
    pub marks: Vec<(RevisionId, Verdict)>,
    pub resets: usize,
}

impl CannedDelegate {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            marks: Vec::new(),
            resets: 0,
        }
    }
}

impl BisectDelegate for CannedDelegate {
    fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn register_skip_ranges(&mut self, _revset: &str) -> Result<()> {
        Ok(())
    }

    fn mark(&mut self, rev: &RevisionId, verdict: Verdict) -> Result<String> {
        self.marks.push((rev.clone(), verdict));
        Ok(self.answer.clone())
    }
}

/// Tester answering from a fixed table, recording every call.
#[derive(Default)]
pub struct ScriptedTester {
    labels: HashMap<RevisionId, Label>,
    fallback: Option<Label>,
    fail_on: Option<RevisionId>,
    pub calls: Vec<RevisionId>,
}

impl ScriptedTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rev: &RevisionId, label: Label) -> Self {
        self.labels.insert(rev.clone(), label);
        self
    }

    pub fn otherwise(mut self, label: Label) -> Self {
        self.fallback = Some(label);
        self
    }

    pub fn failing_on(mut self, rev: &RevisionId) -> Self {
        self.fail_on = Some(rev.clone());
        self
    }

    /// Good before `first_bad`, bad from it on.
    pub fn regression_at(revs: &[RevisionId], first_bad: usize) -> Self {
        revs.iter()
            .enumerate()
            .fold(Self::new(), |tester, (index, rev)| {
                let label = if index < first_bad {
                    Label::good("Exit code 0")
                } else {
                    Label::bad("Negative exit code -11")
                };
                tester.with(rev, label)
            })
    }
}

impl RevisionTester for ScriptedTester {
    fn test(&mut self, rev: &RevisionId) -> Result<Label> {
        self.calls.push(rev.clone());
        if self.fail_on.as_ref() == Some(rev) {
            return Err(anyhow!("build infrastructure failed for {rev}"));
        }
        self.labels
            .get(rev)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("no scripted label for {rev}"))
    }
}
