//! Validated session configuration.
//!
//! [`SessionOptions::from_args`] turns parsed CLI arguments into everything a
//! run needs, failing before any session begins when the combination is
//! unusable.
use crate::cli::{RootArgs, DEFAULT_PARAMETERS};
use crate::label::Verdict;
use crate::oracle::InternalCriteria;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const FLAGS_ARG_PREFIX: &str = "--flags=";

/// Revisions known not to build, and the earliest revisions known to work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnownBroken {
    /// Revset fragments such as `a1b2c3d4e5f6::0f1e2d3c4b5a`.
    #[serde(default)]
    pub skip_ranges: Vec<String>,
    #[serde(default)]
    pub earliest_working: Option<String>,
    /// Artifact flag to the first revision that supports it.
    #[serde(default)]
    pub flag_minimums: BTreeMap<String, String>,
}

impl KnownBroken {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read known-broken config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse known-broken config {}", path.display()))
    }

    /// All skip ranges as one revset, or `None` when there are none.
    pub fn skip_revset(&self) -> Option<String> {
        let ranges: Vec<&str> = self
            .skip_ranges
            .iter()
            .map(|range| range.trim())
            .filter(|range| !range.is_empty())
            .collect();
        (!ranges.is_empty()).then(|| ranges.join(" + "))
    }

    /// Revset naming the earliest revision expected to work with `flags`.
    pub fn earliest_known_query(&self, flags: &[String]) -> Option<String> {
        let mut revs: Vec<&str> = self.earliest_working.iter().map(String::as_str).collect();
        for (flag, rev) in &self.flag_minimums {
            if flags.iter().any(|candidate| candidate == flag) {
                revs.push(rev);
            }
        }
        match revs.as_slice() {
            [] => None,
            [only] => Some((*only).to_string()),
            many => Some(format!("max({})", many.join(" + "))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleChoice {
    Internal(InternalCriteria),
    /// Trailing interestingness arguments, predicate name first.
    External(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub repo_dir: PathBuf,
    /// Explicit start, or a revset for the earliest known working revision.
    pub start: String,
    pub end: String,
    pub test_initial_revs: bool,
    pub reset_to_tip_first: bool,
    pub runtime_params: Vec<String>,
    pub oracle: OracleChoice,
    pub compilation_failed: Verdict,
    pub build_cmd: String,
    pub artifact: String,
    pub skip_ranges: Option<String>,
    pub lock_root: Option<PathBuf>,
    pub changeset_url_base: Option<String>,
    pub json: bool,
}

impl SessionOptions {
    pub fn from_args(args: &RootArgs) -> Result<Self> {
        let runtime_params = split_parameters(&args.parameters);
        if !args.parameters.contains(DEFAULT_PARAMETERS) {
            check_testcase(&runtime_params)?;
        }

        let oracle = if args.use_interestingness_tests {
            if args.interestingness.is_empty() {
                return Err(anyhow!(
                    "not enough arguments: -i needs an interestingness test"
                ));
            }
            OracleChoice::External(args.interestingness.clone())
        } else if !args.interestingness.is_empty() {
            return Err(anyhow!(
                "too many arguments: {} (pass -i to use an interestingness test)",
                args.interestingness.join(" ")
            ));
        } else {
            OracleChoice::Internal(InternalCriteria {
                output: args.output.clone().unwrap_or_default(),
                watch_exit_code: args.watch_exit_code,
            })
        };

        if args.build_cmd.trim().is_empty() {
            return Err(anyhow!("build command is empty"));
        }

        let known_broken = match &args.known_broken {
            Some(path) => KnownBroken::load(path)?,
            None => KnownBroken::default(),
        };
        let mut flags = runtime_params.clone();
        flags.extend(extra_flags(&args.interestingness));
        let start = match &args.start_rev {
            Some(start) => start.clone(),
            None => known_broken.earliest_known_query(&flags).ok_or_else(|| {
                anyhow!("no start revision: pass -s or set earliest_working in --known-broken")
            })?,
        };

        if args.parameters == DEFAULT_PARAMETERS {
            tracing::info!(
                "no parameters were specified, so only startup and shutdown crashes are checked"
            );
        }

        Ok(Self {
            repo_dir: args.repo.clone(),
            start,
            end: args.end_rev.clone(),
            test_initial_revs: !args.skip_initial_revs,
            reset_to_tip_first: args.reset_to_tip_first,
            runtime_params,
            oracle,
            compilation_failed: args.compilation_failed_label,
            build_cmd: args.build_cmd.clone(),
            artifact: args.artifact.clone(),
            skip_ranges: known_broken.skip_revset(),
            lock_root: args.lock_dir.clone(),
            changeset_url_base: args.changeset_url_base.clone(),
            json: args.json,
        })
    }
}

/// Runtime parameters split on single spaces, empty pieces dropped.
pub fn split_parameters(parameters: &str) -> Vec<String> {
    parameters
        .split(' ')
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Artifact flags named by a `--flags=` interestingness argument; the last one wins.
pub fn extra_flags(interestingness: &[String]) -> Vec<String> {
    interestingness
        .iter()
        .filter_map(|arg| arg.strip_prefix(FLAGS_ARG_PREFIX))
        .last()
        .map(split_parameters)
        .unwrap_or_default()
}

fn check_testcase(runtime_params: &[String]) -> Result<()> {
    let Some(testcase) = runtime_params.last() else {
        return Err(anyhow!("no testcase given in the runtime parameters"));
    };
    if expand_home(testcase).is_file() {
        return Ok(());
    }
    tracing::info!(
        parameters = %runtime_params.join(" "),
        "parameters to be passed to the artifact"
    );
    Err(anyhow!("testcase at {testcase} is not present"))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
