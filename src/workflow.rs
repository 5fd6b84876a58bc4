//! Wiring for one CLI bisection run.
//!
//! Order matters: configuration is validated first, then the session lock is
//! taken and held until the controller has cleaned up.
use crate::build::{BuildAndTest, CommandBuilder};
use crate::cli::RootArgs;
use crate::config::{OracleChoice, SessionOptions};
use crate::controller::{BisectionController, SessionSettings};
use crate::delegate::HgBisect;
use crate::lock::{default_lock_root, SessionLock};
use crate::oracle::{predicate_from_args, ExternalOracle, InternalOracle, Oracle};
use crate::report;
use crate::vcs::{HgCommand, HgRepo};
use anyhow::Result;
use std::io;

pub fn run_bisect(args: RootArgs) -> Result<()> {
    let options = SessionOptions::from_args(&args)?;
    let oracle = oracle_for(&options)?;
    let builder = CommandBuilder::new(&options.repo_dir, &options.build_cmd, &options.artifact)?;

    let lock_root = match &options.lock_root {
        Some(root) => root.clone(),
        None => default_lock_root()?,
    };
    let _lock = SessionLock::acquire(&lock_root, &options.repo_dir)?;
    tracing::info!(repo = %options.repo_dir.display(), "bisecting on checkout");

    let hg = HgCommand::locate(&options.repo_dir)?;
    let repo = HgRepo::new(hg.clone());
    let mut delegate = HgBisect::new(hg);
    let mut tester = BuildAndTest::new(
        &repo,
        Box::new(builder),
        oracle,
        options.compilation_failed,
    );
    let outcome = BisectionController::new(
        &repo,
        &mut delegate,
        &mut tester,
        session_settings(&options),
    )
    .run()?;

    report::log_summary(&outcome);
    if options.json {
        report::write_json(&outcome, io::stdout().lock())?;
    }
    Ok(())
}

fn oracle_for(options: &SessionOptions) -> Result<Box<dyn Oracle>> {
    Ok(match &options.oracle {
        OracleChoice::Internal(criteria) => Box::new(InternalOracle::new(
            criteria.clone(),
            options.runtime_params.clone(),
        )),
        OracleChoice::External(args) => {
            let (predicate, prefix) = predicate_from_args(args)?;
            Box::new(ExternalOracle::new(
                predicate,
                prefix,
                options.runtime_params.clone(),
            ))
        }
    })
}

fn session_settings(options: &SessionOptions) -> SessionSettings {
    let mut settings = SessionSettings::new(options.start.clone(), options.end.clone());
    settings.test_initial_revs = options.test_initial_revs;
    settings.skip_ranges = options.skip_ranges.clone();
    settings.reset_working_copy_first = options.reset_to_tip_first;
    settings.changeset_url_base = options.changeset_url_base.clone();
    settings
}
