//! CLI argument parsing for a bisection run.
//!
//! Arguments are only parsed here; cross-field validation lives in
//! [`crate::config`].
use crate::label::Verdict;
use clap::Parser;
use std::path::PathBuf;

/// Runtime parameters used when none are given: start the artifact, evaluate
/// a trivial expression, and exit.
pub const DEFAULT_PARAMETERS: &str = "-e 42";

#[derive(Parser, Debug)]
#[command(
    name = "autobisect",
    version,
    about = "Find the changeset that introduced a regression in a Mercurial checkout",
    after_help = "Examples:\n  autobisect -R ~/trees/central --build-cmd 'make -C obj' --artifact obj/dist/bin/js \\\n      -p '--fuzzing-safe testcase.js' -o 'Assertion failure'\n  autobisect -R ~/trees/central --build-cmd ./build.sh --artifact js -s 1a2b3c4d5e6f \\\n      -p 'testcase.js' -i outputs --timeout=10 'Assertion failure'"
)]
pub struct RootArgs {
    /// Repository checkout to bisect in
    #[arg(short = 'R', long = "repo", value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,

    /// First reset to the default tip, overwriting all local changes
    #[arg(long = "reset-to-tip-first")]
    pub reset_to_tip_first: bool,

    /// Earliest revision to consider (usually a "good" one); defaults to the
    /// earliest revision known to work
    #[arg(short = 's', long = "start-rev", value_name = "REV")]
    pub start_rev: Option<String>,

    /// Latest revision to consider (usually a "bad" one)
    #[arg(short = 'e', long = "end-rev", value_name = "REV", default_value = "default")]
    pub end_rev: String,

    /// Trust the start revision as good and the end revision as bad without testing them
    #[arg(short = 'k', long = "skip-initial-revs")]
    pub skip_initial_revs: bool,

    /// Stdout or stderr output marking a run as bad (e.g. "Assertion failure")
    #[arg(short = 'o', long = "output", value_name = "TEXT")]
    pub output: Option<String>,

    /// Only this exit code is considered bad
    #[arg(
        short = 'w',
        long = "watch-exit-code",
        value_name = "CODE",
        allow_negative_numbers = true
    )]
    pub watch_exit_code: Option<i32>,

    /// Interpret the trailing arguments as an interestingness test
    #[arg(short = 'i', long = "use-interestingness-tests")]
    pub use_interestingness_tests: bool,

    /// Parameters for the built artifact, ending with the testcase path
    #[arg(
        short = 'p',
        long = "parameters",
        value_name = "PARAMS",
        default_value = DEFAULT_PARAMETERS,
        allow_hyphen_values = true
    )]
    pub parameters: String,

    /// How to label revisions that fail to build
    #[arg(
        short = 'l',
        long = "compilation-failed-label",
        value_enum,
        default_value_t = Verdict::Skip
    )]
    pub compilation_failed_label: Verdict,

    /// Build command run in the checkout; `{rev}` is replaced with the revision
    #[arg(long = "build-cmd", value_name = "CMD")]
    pub build_cmd: String,

    /// Built artifact, relative to the checkout; `{rev}` is replaced with the revision
    #[arg(long = "artifact", value_name = "PATH")]
    pub artifact: String,

    /// Known-broken ranges and earliest working revisions (JSON)
    #[arg(long = "known-broken", value_name = "FILE")]
    pub known_broken: Option<PathBuf>,

    /// Directory holding per-checkout session locks
    #[arg(long = "lock-dir", value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Rewrite "changeset:" lines in logged delegate messages into links under this URL
    #[arg(long = "changeset-url-base", value_name = "URL")]
    pub changeset_url_base: Option<String>,

    /// Print the session report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Interestingness test and its arguments (with -i)
    #[arg(
        value_name = "INTERESTINGNESS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub interestingness: Vec<String>,
}
