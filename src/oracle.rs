//! Oracles turn a built artifact into a [`Label`].
//!
//! Two variants exist: the internal exit-code/output classifier and the
//! external interestingness-test adapter. The controller only sees the
//! [`Oracle`] trait.
mod external;
mod internal;
mod predicates;

pub use external::ExternalOracle;
pub use internal::{InternalCriteria, InternalOracle};
pub use predicates::predicate_from_args;

use crate::exec;
use crate::label::Label;
use crate::revision::RevisionId;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Combined output and exit code of one artifact run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOutput {
    pub stdout_stderr: String,
    pub exit_code: i32,
}

impl ArtifactOutput {
    pub fn new(stdout_stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout_stderr: stdout_stderr.into(),
            exit_code,
        }
    }
}

/// Classifies the artifact built for one revision.
///
/// Errors are infrastructure failures and propagate to the caller untouched.
pub trait Oracle {
    fn evaluate(&mut self, artifact: &Path, rev: &RevisionId) -> Result<Label>;
}

/// Run the artifact with the runtime parameters and capture its output.
///
/// No deadline: a run may legitimately take minutes.
pub fn run_artifact(artifact: &Path, runtime_params: &[String]) -> Result<ArtifactOutput> {
    tracing::debug!(
        command = %exec::format_command_line(&artifact.display().to_string(), runtime_params),
        "running artifact"
    );
    let mut cmd = Command::new(artifact);
    cmd.args(runtime_params);
    let captured = exec::capture(&mut cmd, None)?;
    Ok(ArtifactOutput::new(
        captured.combined_output(),
        captured.exit_code,
    ))
}
