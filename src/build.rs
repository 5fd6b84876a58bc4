//! Building a revision into an artifact, and testing it.
//!
//! [`BuildAndTest`] is the production [`RevisionTester`]: check out, build,
//! then hand the artifact to an oracle. Build breakage becomes a label chosen
//! by the compilation-failed policy rather than an error.
use crate::exec;
use crate::label::{Label, Verdict};
use crate::oracle::Oracle;
use crate::revision::RevisionId;
use crate::util::{last_nonempty_line, truncate_string};
use crate::vcs::Vcs;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable exported to build commands.
pub const REV_ENV: &str = "AUTOBISECT_REV";
const REV_PLACEHOLDER: &str = "{rev}";
const MAX_FAILURE_REASON_BYTES: usize = 200;

/// Produces one label per revision. Errors are infrastructure failures.
pub trait RevisionTester {
    fn test(&mut self, rev: &RevisionId) -> Result<Label>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built(PathBuf),
    Failed(String),
}

pub trait ArtifactBuilder {
    /// Build the revision currently checked out as `rev`.
    fn build(&mut self, rev: &RevisionId) -> Result<BuildOutcome>;
}

/// Runs a user-supplied build command inside the checkout.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    repo_dir: PathBuf,
    command: Vec<String>,
    artifact: String,
}

impl CommandBuilder {
    /// `command` is a shell-style string; `artifact` is relative to the
    /// checkout. Both may contain `{rev}`.
    pub fn new(repo_dir: &Path, command: &str, artifact: &str) -> Result<Self> {
        let command =
            shell_words::split(command).with_context(|| format!("parse build command: {command}"))?;
        if command.is_empty() {
            return Err(anyhow!("build command is empty"));
        }
        if artifact.trim().is_empty() {
            return Err(anyhow!("artifact path is empty"));
        }
        Ok(Self {
            repo_dir: repo_dir.to_path_buf(),
            command,
            artifact: artifact.to_string(),
        })
    }

    pub fn artifact_path(&self, rev: &RevisionId) -> PathBuf {
        self.repo_dir
            .join(self.artifact.replace(REV_PLACEHOLDER, rev.as_str()))
    }

    fn argv(&self, rev: &RevisionId) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(REV_PLACEHOLDER, rev.as_str()))
            .collect()
    }
}

impl ArtifactBuilder for CommandBuilder {
    fn build(&mut self, rev: &RevisionId) -> Result<BuildOutcome> {
        let argv = self.argv(rev);
        let Some((program, args)) = argv.split_first() else {
            return Err(anyhow!("build command is empty"));
        };
        tracing::info!(rev = %rev, command = %exec::format_command_line(program, args), "building");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.repo_dir)
            .env(REV_ENV, rev.as_str());
        let captured = exec::capture(&mut cmd, None).context("run build command")?;
        if captured.exit_code != 0 {
            let stderr = String::from_utf8_lossy(&captured.stderr);
            let detail = last_nonempty_line(&stderr).unwrap_or("no stderr output");
            return Ok(BuildOutcome::Failed(format!(
                "build exited with code {}: {}",
                captured.exit_code,
                truncate_string(detail, MAX_FAILURE_REASON_BYTES)
            )));
        }
        let artifact = self.artifact_path(rev);
        if !artifact.is_file() {
            return Ok(BuildOutcome::Failed(format!(
                "artifact {} missing after build",
                artifact.display()
            )));
        }
        tracing::debug!(
            rev = %rev,
            artifact = %artifact.display(),
            elapsed_ms = captured.duration_ms as u64,
            "build finished"
        );
        Ok(BuildOutcome::Built(artifact))
    }
}

/// Check out, build, and classify one revision.
pub struct BuildAndTest<'a> {
    vcs: &'a dyn Vcs,
    builder: Box<dyn ArtifactBuilder + 'a>,
    oracle: Box<dyn Oracle + 'a>,
    compilation_failed: Verdict,
}

impl<'a> BuildAndTest<'a> {
    pub fn new(
        vcs: &'a dyn Vcs,
        builder: Box<dyn ArtifactBuilder + 'a>,
        oracle: Box<dyn Oracle + 'a>,
        compilation_failed: Verdict,
    ) -> Self {
        Self {
            vcs,
            builder,
            oracle,
            compilation_failed,
        }
    }
}

impl RevisionTester for BuildAndTest<'_> {
    fn test(&mut self, rev: &RevisionId) -> Result<Label> {
        self.vcs.update_clean(rev.as_str())?;
        match self.builder.build(rev)? {
            BuildOutcome::Failed(reason) => {
                tracing::info!(rev = %rev, reason = %reason, "compilation failed");
                Ok(Label::new(
                    self.compilation_failed,
                    format!("compilation failed: {reason}"),
                ))
            }
            BuildOutcome::Built(artifact) => self.oracle.evaluate(&artifact, rev),
        }
    }
}
