//! Built-in interestingness predicates and the external-program fallback.
//!
//! Condition arguments are `[options..] [predicate args..] <artifact> <params..>`;
//! each predicate parses its own options in `init`.
use super::external::Interestingness;
use crate::exec::{self, Captured};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Environment variable carrying the scratch prefix to external programs.
pub const TEMP_PREFIX_ENV: &str = "AUTOBISECT_TEMP_PREFIX";

/// Select a predicate from the trailing interestingness arguments.
///
/// Returns the predicate and the argument prefix that precedes the artifact
/// path in every condition argument list.
pub fn predicate_from_args(args: &[String]) -> Result<(Box<dyn Interestingness>, Vec<String>)> {
    let (name, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("interestingness test is empty"))?;
    let predicate: Box<dyn Interestingness> = match name.as_str() {
        "crashes" => Box::new(Crashes::default()),
        "outputs" => Box::new(Outputs::default()),
        _ => Box::new(ExternalProgram::resolve(name)?),
    };
    Ok((predicate, rest.to_vec()))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ConditionOptions {
    timeout: Option<Duration>,
    regex: bool,
    rest: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<ConditionOptions> {
    let mut options = ConditionOptions::default();
    let mut idx = 0;
    while let Some(arg) = args.get(idx) {
        if let Some(value) = arg.strip_prefix("--timeout=") {
            let secs: u64 = value
                .parse()
                .with_context(|| format!("parse --timeout value {value:?}"))?;
            options.timeout = Some(Duration::from_secs(secs));
        } else if arg == "--regex" {
            options.regex = true;
        } else if arg.starts_with("--flags=") {
            // Consumed by earliest-working-revision lookup, not by the test.
        } else if arg.starts_with("--") {
            return Err(anyhow!("unknown interestingness option {arg}"));
        } else {
            break;
        }
        idx += 1;
    }
    options.rest = args[idx..].to_vec();
    Ok(options)
}

fn split_command(command: &[String]) -> Result<(&String, &[String])> {
    command
        .split_first()
        .ok_or_else(|| anyhow!("interestingness test has no command to run"))
}

fn run_logged(command: &[String], timeout: Option<Duration>, temp_prefix: &Path) -> Result<Captured> {
    let (program, argv) = split_command(command)?;
    let mut cmd = Command::new(program);
    cmd.args(argv);
    let captured = exec::capture(&mut cmd, timeout)?;
    write_logs(temp_prefix, &captured)?;
    Ok(captured)
}

fn write_logs(temp_prefix: &Path, captured: &Captured) -> Result<()> {
    let out = PathBuf::from(format!("{}-out.txt", temp_prefix.display()));
    let err = PathBuf::from(format!("{}-err.txt", temp_prefix.display()));
    fs::write(&out, &captured.stdout).with_context(|| format!("write {}", out.display()))?;
    fs::write(&err, &captured.stderr).with_context(|| format!("write {}", err.display()))?;
    Ok(())
}

/// Interesting when the command dies from a signal.
#[derive(Debug, Default)]
struct Crashes {
    timeout: Option<Duration>,
}

impl Interestingness for Crashes {
    fn init(&mut self, args: &[String]) -> Result<()> {
        let options = parse_options(args)?;
        split_command(&options.rest)?;
        self.timeout = options.timeout;
        Ok(())
    }

    fn interesting(&mut self, args: &[String], temp_prefix: &Path) -> Result<bool> {
        let options = parse_options(args)?;
        let captured = run_logged(&options.rest, self.timeout, temp_prefix)?;
        if captured.timed_out {
            tracing::info!("interestingness command timed out; treating as not crashing");
            return Ok(false);
        }
        Ok(captured.exit_code < 0)
    }
}

#[derive(Debug)]
enum Matcher {
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Substring(needle) => text.contains(needle.as_str()),
            Matcher::Pattern(regex) => regex.is_match(text),
        }
    }
}

/// Interesting when the combined output contains a needle.
#[derive(Debug, Default)]
struct Outputs {
    timeout: Option<Duration>,
    matcher: Option<Matcher>,
}

impl Outputs {
    fn command(args: &[String]) -> Result<(ConditionOptions, String, Vec<String>)> {
        let options = parse_options(args)?;
        let (needle, command) = options
            .rest
            .split_first()
            .ok_or_else(|| anyhow!("outputs: missing text to look for"))?;
        let (needle, command) = (needle.clone(), command.to_vec());
        split_command(&command)?;
        Ok((options, needle, command))
    }
}

impl Interestingness for Outputs {
    fn init(&mut self, args: &[String]) -> Result<()> {
        let (options, needle, _) = Self::command(args)?;
        let matcher = if options.regex {
            Matcher::Pattern(
                Regex::new(&needle).with_context(|| format!("compile outputs regex {needle:?}"))?,
            )
        } else {
            Matcher::Substring(needle)
        };
        self.timeout = options.timeout;
        self.matcher = Some(matcher);
        Ok(())
    }

    fn interesting(&mut self, args: &[String], temp_prefix: &Path) -> Result<bool> {
        if self.matcher.is_none() {
            self.init(args)?;
        }
        let (_, _, command) = Self::command(args)?;
        let captured = run_logged(&command, self.timeout, temp_prefix)?;
        let output = captured.combined_output();
        Ok(self
            .matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(&output)))
    }
}

/// A user-supplied test program; exit code 0 means interesting.
#[derive(Debug)]
struct ExternalProgram {
    program: PathBuf,
}

impl ExternalProgram {
    fn resolve(name: &str) -> Result<Self> {
        let candidate = Path::new(name);
        let program = if candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            which::which(name)
                .with_context(|| format!("locate interestingness program {name:?}"))?
        };
        Ok(Self { program })
    }
}

impl Interestingness for ExternalProgram {
    fn interesting(&mut self, args: &[String], temp_prefix: &Path) -> Result<bool> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).env(TEMP_PREFIX_ENV, temp_prefix);
        let captured = exec::capture(&mut cmd, None)
            .with_context(|| format!("run {}", self.program.display()))?;
        write_logs(temp_prefix, &captured)?;
        Ok(captured.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_options_stops_at_first_positional() {
        let options = parse_options(&strings(&[
            "--timeout=5",
            "--flags=--ion-eager",
            "--regex",
            "needle",
            "--not-an-option",
        ]))
        .expect("parse");
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert!(options.regex);
        assert_eq!(options.rest, strings(&["needle", "--not-an-option"]));
    }

    #[test]
    fn parse_options_rejects_unknown_option() {
        let err = parse_options(&strings(&["--bogus", "x"])).expect_err("unknown option");
        assert!(err.to_string().contains("--bogus"));
    }

    #[test]
    fn outputs_requires_needle_and_command() {
        let mut outputs = Outputs::default();
        assert!(outputs.init(&strings(&["--timeout=3"])).is_err());
        assert!(outputs.init(&strings(&["needle"])).is_err());
        assert!(outputs.init(&strings(&["needle", "/bin/js"])).is_ok());
    }

    #[test]
    fn outputs_rejects_bad_regex_at_init() {
        let mut outputs = Outputs::default();
        let err = outputs
            .init(&strings(&["--regex", "(", "/bin/js"]))
            .expect_err("invalid regex");
        assert!(format!("{err:#}").contains("compile outputs regex"));
    }

    #[test]
    fn predicate_selection_keeps_prefix() {
        let (_, prefix) = predicate_from_args(&strings(&["outputs", "--timeout=9", "Assertion"]))
            .expect("select outputs");
        assert_eq!(prefix, strings(&["--timeout=9", "Assertion"]));
        assert!(predicate_from_args(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn crashes_detects_signal_and_writes_logs() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let prefix = scratch.path().join("t");
        let mut crashes = Crashes::default();
        let args = strings(&["sh", "-c", "echo dying; kill -SEGV $$"]);
        crashes.init(&args).expect("init");
        assert!(crashes.interesting(&args, &prefix).expect("run"));
        let out = fs::read_to_string(scratch.path().join("t-out.txt")).expect("read log");
        assert_eq!(out, "dying\n");

        let clean = strings(&["sh", "-c", "exit 0"]);
        assert!(!crashes.interesting(&clean, &prefix).expect("run"));
    }

    #[cfg(unix)]
    #[test]
    fn outputs_matches_combined_output() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let prefix = scratch.path().join("t");
        let mut outputs = Outputs::default();
        let args = strings(&[
            "--regex",
            "Assertion failure: .* at",
            "sh",
            "-c",
            "echo 'Assertion failure: ok, at a.cpp:1' >&2; exit 3",
        ]);
        outputs.init(&args).expect("init");
        assert!(outputs.interesting(&args, &prefix).expect("run"));
    }

    #[cfg(unix)]
    #[test]
    fn external_program_reports_exit_status_and_prefix() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let prefix = scratch.path().join("t");
        let mut program = ExternalProgram::resolve("sh").expect("locate sh");
        let args = strings(&["-c", "test -n \"$AUTOBISECT_TEMP_PREFIX\""]);
        assert!(program.interesting(&args, &prefix).expect("run"));
        let args = strings(&["-c", "exit 1"]);
        assert!(!program.interesting(&args, &prefix).expect("run"));
    }
}
