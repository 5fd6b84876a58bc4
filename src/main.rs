use anyhow::Result;
use clap::Parser;
use std::io;
use tracing_subscriber::EnvFilter;

mod blame;
mod build;
mod cli;
mod config;
mod controller;
mod delegate;
mod exec;
mod label;
mod lock;
mod oracle;
mod report;
mod revision;
#[cfg(test)]
mod testing;
mod util;
mod vcs;
mod workflow;

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    workflow::run_bisect(args)
}
