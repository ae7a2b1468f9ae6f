//! # repairlockctl
//!
//! Cron-driven entry point: decides whether this node may repair now, runs
//! the repair plan when it may, and otherwise exits quietly. `--reset`
//! clears this node's records and `--watch` opens the cluster dashboard.
//!
//! Exit status is `0` for a completed run, a skipped run or a reset, and
//! `1` for every fatal error.

mod app;
mod cli;
mod dashboard;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use repairlock_config::ConfigLoader;
use tracing::{debug, error};

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let load = match ConfigLoader::from_env()
        .with_explicit_path(cli.config.clone())
        .load()
    {
        Ok(load) => load,
        Err(err) => {
            eprintln!("repairlockctl: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut config = load.config;
    cli.apply(&mut config);
    if let Err(err) = config.validate() {
        eprintln!("repairlockctl: invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    if let Err(err) = logging::init(&config.logging) {
        eprintln!("repairlockctl: {err:#}");
        return ExitCode::FAILURE;
    }
    match load.source.path() {
        Some(path) => debug!(path = %path.display(), "configuration loaded"),
        None => debug!("no configuration file found; using defaults"),
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(app::run(config, cli.mode())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("repairlockctl failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
