//! Exit-code and output classifier.
//!
//! Classification is an ordered rule table: the first rule that returns a
//! label wins, and an unclassified exit falls through to "bad".
use super::{run_artifact, ArtifactOutput, Oracle};
use crate::label::Label;
use crate::revision::RevisionId;
use anyhow::Result;
use std::path::Path;

/// Output fragments printed when the artifact rejects a command-line flag.
pub const UNSUPPORTED_FLAG_MARKERS: &[&str] = &[
    "usage: js [",
    "Error: Short option followed by junk",
    "Error: Invalid long option:",
    "Error: Invalid short option:",
];

const HIGH_EXIT_CODES: std::ops::RangeInclusive<i32> = 129..=159;
const ACCEPTABLE_EXIT_CODES: std::ops::RangeInclusive<i32> = 3..=6;

/// What the caller asked to treat as the regression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalCriteria {
    /// Output substring marking a run as bad; empty means unset.
    pub output: String,
    /// The only exit code considered bad, when set.
    pub watch_exit_code: Option<i32>,
}

impl InternalCriteria {
    fn output_specified(&self) -> bool {
        !self.output.is_empty()
    }

    fn output_found(&self, observed: &ArtifactOutput) -> bool {
        self.output_specified() && observed.stdout_stderr.contains(&self.output)
    }
}

type RuleFn = fn(&ArtifactOutput, &InternalCriteria) -> Option<Label>;

struct Rule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: &[Rule] = &[
    Rule {
        name: "specified-output",
        apply: specified_output,
    },
    Rule {
        name: "specified-exit-code",
        apply: specified_exit_code,
    },
    Rule {
        name: "high-exit-code",
        apply: high_exit_code,
    },
    Rule {
        name: "negative-exit-code",
        apply: negative_exit_code,
    },
    Rule {
        name: "clean-exit",
        apply: clean_exit,
    },
    Rule {
        name: "unsupported-flag",
        apply: unsupported_flag,
    },
    Rule {
        name: "acceptable-exit-code",
        apply: acceptable_exit_code,
    },
    Rule {
        name: "unwatched-exit-code",
        apply: unwatched_exit_code,
    },
];

/// Classify one artifact run. Total and deterministic over its inputs.
pub fn classify(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Label {
    RULES
        .iter()
        .find_map(|rule| {
            (rule.apply)(observed, criteria).inspect(|_| {
                tracing::debug!(rule = rule.name, "classifier rule matched");
            })
        })
        .unwrap_or_else(|| Label::bad(format!("Unknown exit code {}", observed.exit_code)))
}

fn specified_output(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    criteria
        .output_found(observed)
        .then(|| Label::bad("Specified-bad output"))
}

fn specified_exit_code(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    (criteria.watch_exit_code == Some(observed.exit_code))
        .then(|| Label::bad(format!("Specified-bad exit code {}", observed.exit_code)))
}

// Signal-derived crash codes, only when no specific code was requested.
fn high_exit_code(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    (criteria.watch_exit_code.is_none() && HIGH_EXIT_CODES.contains(&observed.exit_code))
        .then(|| Label::bad(format!("High exit code {}", observed.exit_code)))
}

fn negative_exit_code(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    let code = observed.exit_code;
    if code >= 0 {
        return None;
    }
    // -11 from a SIGSEGV corresponds to the shell-style 139.
    let as_signal_code = 128 - i64::from(code);
    let label = match criteria.watch_exit_code {
        Some(watch) if i64::from(watch) == as_signal_code => Label::bad(format!(
            "Specified-bad exit code {code} (after converting to signal)"
        )),
        _ if criteria.output_specified() && !criteria.output_found(observed) => {
            Label::good("Bad output, but not the specified one")
        }
        Some(_) => Label::good("Negative exit code, but not the specified one"),
        None => Label::bad(format!("Negative exit code {code}")),
    };
    Some(label)
}

fn clean_exit(observed: &ArtifactOutput, _criteria: &InternalCriteria) -> Option<Label> {
    (observed.exit_code == 0).then(|| Label::good("Exit code 0"))
}

fn unsupported_flag(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    let rejected_flag = matches!(observed.exit_code, 1 | 2)
        && criteria.output_specified()
        && UNSUPPORTED_FLAG_MARKERS
            .iter()
            .any(|marker| observed.stdout_stderr.contains(marker));
    rejected_flag.then(|| {
        Label::good(
            "Exit code 1 or 2 - artifact quits because it does not support a given CLI parameter",
        )
    })
}

fn acceptable_exit_code(observed: &ArtifactOutput, _criteria: &InternalCriteria) -> Option<Label> {
    ACCEPTABLE_EXIT_CODES
        .contains(&observed.exit_code)
        .then(|| Label::good(format!("Acceptable exit code {}", observed.exit_code)))
}

fn unwatched_exit_code(observed: &ArtifactOutput, criteria: &InternalCriteria) -> Option<Label> {
    criteria.watch_exit_code.is_some().then(|| {
        Label::good(format!(
            "Unknown exit code {}, but not the specified one",
            observed.exit_code
        ))
    })
}

/// Runs the artifact with fixed runtime parameters and classifies the result.
pub struct InternalOracle {
    criteria: InternalCriteria,
    runtime_params: Vec<String>,
}

impl InternalOracle {
    pub fn new(criteria: InternalCriteria, runtime_params: Vec<String>) -> Self {
        Self {
            criteria,
            runtime_params,
        }
    }
}

impl Oracle for InternalOracle {
    fn evaluate(&mut self, artifact: &Path, rev: &RevisionId) -> Result<Label> {
        let observed = run_artifact(artifact, &self.runtime_params)?;
        tracing::debug!(rev = %rev, exit_code = observed.exit_code, "artifact finished");
        Ok(classify(&observed, &self.criteria))
    }
}

#[cfg(test)]
#[path = "internal_tests.rs"]
mod tests;
