//! Adapter that delegates the verdict to a pluggable interestingness test.
use super::Oracle;
use crate::label::Label;
use crate::revision::RevisionId;
use anyhow::{Context, Result};
use std::path::Path;

/// A pluggable "is this run interesting?" predicate.
///
/// `interesting == true` means the artifact exhibits the regression.
pub trait Interestingness {
    /// Re-run whenever the argument list changes (the artifact path differs
    /// per revision). The default does nothing.
    fn init(&mut self, _args: &[String]) -> Result<()> {
        Ok(())
    }

    fn interesting(&mut self, args: &[String], temp_prefix: &Path) -> Result<bool>;
}

/// Oracle backed by an [`Interestingness`] predicate.
pub struct ExternalOracle {
    predicate: Box<dyn Interestingness>,
    arg_prefix: Vec<String>,
    runtime_params: Vec<String>,
}

impl ExternalOracle {
    pub fn new(
        predicate: Box<dyn Interestingness>,
        arg_prefix: Vec<String>,
        runtime_params: Vec<String>,
    ) -> Self {
        Self {
            predicate,
            arg_prefix,
            runtime_params,
        }
    }

    /// Predicate prefix, then the artifact, then the runtime parameters.
    pub fn condition_args(&self, artifact: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.arg_prefix.len() + 1 + self.runtime_params.len());
        args.extend(self.arg_prefix.iter().cloned());
        args.push(artifact.display().to_string());
        args.extend(self.runtime_params.iter().cloned());
        args
    }
}

impl Oracle for ExternalOracle {
    fn evaluate(&mut self, artifact: &Path, rev: &RevisionId) -> Result<Label> {
        let args = self.condition_args(artifact);
        // Dropping the TempDir on an early return removes it as well.
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("abExtTestAndLabel-{rev}"))
            .tempdir()
            .context("create interestingness scratch directory")?;
        let temp_prefix = temp_dir.path().join("t");

        self.predicate
            .init(&args)
            .with_context(|| format!("initialize interestingness test for {rev}"))?;
        let interesting = self
            .predicate
            .interesting(&args, &temp_prefix)
            .with_context(|| format!("run interestingness test for {rev}"))?;

        temp_dir
            .close()
            .context("remove interestingness scratch directory")?;
        Ok(if interesting {
            Label::bad("interesting")
        } else {
            Label::good("not interesting")
        })
    }
}
