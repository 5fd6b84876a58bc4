//! Mercurial implementation of [`Vcs`](super::Vcs).
use super::Vcs;
use crate::exec::{self, Captured};
use crate::revision::RevisionId;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(99);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(999);

/// Runs `hg -R <repo>` subcommands.
#[derive(Debug, Clone)]
pub struct HgCommand {
    hg: PathBuf,
    repo_dir: PathBuf,
}

impl HgCommand {
    /// Locate `hg` on `PATH` for the given checkout.
    pub fn locate(repo_dir: &Path) -> Result<Self> {
        let hg = which::which("hg").context("locate hg on PATH")?;
        Ok(Self::with_binary(hg, repo_dir))
    }

    pub fn with_binary(hg: PathBuf, repo_dir: &Path) -> Self {
        Self {
            hg,
            repo_dir: repo_dir.to_path_buf(),
        }
    }

    /// Run a subcommand and fail on non-zero exit or timeout.
    pub fn run(&self, args: &[&str], timeout: Option<Duration>) -> Result<String> {
        let captured = self.run_unchecked(args, timeout)?;
        if captured.timed_out {
            return Err(anyhow!(
                "hg {} timed out after {:?}",
                args.join(" "),
                timeout.unwrap_or_default()
            ));
        }
        if captured.exit_code != 0 {
            return Err(anyhow!(
                "hg {} failed with exit code {}: {}",
                args.join(" "),
                captured.exit_code,
                String::from_utf8_lossy(&captured.stderr).trim()
            ));
        }
        Ok(captured.stdout_text())
    }

    pub fn run_unchecked(&self, args: &[&str], timeout: Option<Duration>) -> Result<Captured> {
        let mut cmd = Command::new(&self.hg);
        cmd.arg("-R").arg(&self.repo_dir).args(args);
        tracing::debug!(args = %args.join(" "), "hg");
        exec::capture(&mut cmd, timeout).with_context(|| format!("run hg {}", args.join(" ")))
    }
}

/// A Mercurial checkout.
#[derive(Debug, Clone)]
pub struct HgRepo {
    hg: HgCommand,
}

impl HgRepo {
    pub fn new(hg: HgCommand) -> Self {
        Self { hg }
    }

    fn log_short_hash(&self, revset: &str) -> Result<Option<RevisionId>> {
        let stdout = self.hg.run(
            &["log", "-r", revset, "--template", "{node|short}\n"],
            Some(QUERY_TIMEOUT),
        )?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(RevisionId::new))
    }
}

impl Vcs for HgRepo {
    fn resolve(&self, name: &str) -> Result<RevisionId> {
        self.log_short_hash(name)
            .with_context(|| format!("resolve revision {name:?}"))?
            .ok_or_else(|| anyhow!("revision {name:?} does not exist"))
    }

    fn parents(&self, rev: &RevisionId) -> Result<Vec<RevisionId>> {
        let stdout = self.hg.run(
            &["parent", "--template={node|short},", "-r", rev.as_str()],
            Some(QUERY_TIMEOUT),
        )?;
        Ok(parse_parent_list(&stdout))
    }

    fn is_ancestor(&self, ancestor: &RevisionId, descendant: &RevisionId) -> Result<bool> {
        let common = self.common_ancestor(ancestor, descendant)?;
        Ok(&common == ancestor)
    }

    fn common_ancestor(&self, a: &RevisionId, b: &RevisionId) -> Result<RevisionId> {
        let revset = format!("ancestor({a},{b})");
        self.log_short_hash(&revset)?
            .ok_or_else(|| anyhow!("{a} and {b} have no common ancestor"))
    }

    fn update_clean(&self, rev: &str) -> Result<()> {
        self.hg
            .run(&["update", "-C", "-r", rev], Some(UPDATE_TIMEOUT))
            .with_context(|| format!("update working copy to {rev}"))?;
        Ok(())
    }

    fn purge_all(&self) -> Result<()> {
        // Exits 255 when the purge extension is not enabled.
        self.hg
            .run(&["purge", "--all"], Some(UPDATE_TIMEOUT))
            .context("purge working copy (is the purge extension enabled?)")?;
        Ok(())
    }
}

/// Split `hg parent --template={node|short},` output.
fn parse_parent_list(stdout: &str) -> Vec<RevisionId> {
    stdout
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(RevisionId::new)
        .collect()
}
