// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagewerk: folder-watching PDF splitter with orientation correction.
//
// Entry point. Loads `.env` and the environment, initialises logging, then
// either runs the pipeline (watch or once) or, under the hidden `worker`
// subcommand, serves jobs for a parent pipeline over stdio.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_pipeline::{Pipeline, RunMode};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pagewerk", version)]
#[command(about = "Split PDFs dropped into a watch folder into upright single-page files")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Read variables from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Forget every processed document before starting
    #[arg(long, default_value_t = false)]
    reset: bool,

    /// Process what is already in the watch folder, then exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Number of concurrent workers (overrides MAX_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve document jobs over stdin/stdout for a parent pipeline
    #[command(hide = true)]
    Worker {
        /// Pipeline configuration as JSON
        #[arg(long)]
        config: String,
    },
}

/// Why a watching pipeline stopped.
enum Stop {
    Signal,
    Fatal(PagewerkError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.command {
        Some(Command::Worker { config }) => {
            serde_json::from_str::<PipelineConfig>(config).map_err(PagewerkError::from)
        }
        None => load_config(&cli.run),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            services::logging::init(None);
            error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    services::logging::init(config.warnings_log_path.as_deref());

    let result = match cli.command {
        Some(Command::Worker { .. }) => pagewerk_pipeline::run_worker(config).await,
        None => {
            let mode = if cli.run.once {
                RunMode::Once
            } else {
                RunMode::Watch
            };
            run(config, mode).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Pagewerk stopped");
            ExitCode::FAILURE
        }
    }
}

/// Load `.env` (overriding the environment), read the configuration, and
/// apply command-line overrides.
fn load_config(args: &RunArgs) -> Result<PipelineConfig> {
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path_override(path).map_err(|err| {
                PagewerkError::Config(format!("cannot load {}: {err}", path.display()))
            })?;
        }
        None => {
            if let Err(err) = dotenvy::dotenv_override() {
                if !err.not_found() {
                    return Err(PagewerkError::Config(format!("cannot load .env: {err}")));
                }
            }
        }
    }

    let mut config = PipelineConfig::from_env()?;
    if args.reset {
        config.reset_ledger = true;
    }
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: PipelineConfig, mode: RunMode) -> Result<()> {
    info!(
        watch = %config.watch_root.display(),
        output = %config.output_root.display(),
        "Pagewerk starting"
    );

    let pipeline = Pipeline::prepare(config)?;
    let executor = services::executor::build(&pipeline)?;
    let mut running = pipeline.start(executor, mode).await?;

    let snapshot = match mode {
        RunMode::Once => running.finish().await?,
        RunMode::Watch => {
            let stop = tokio::select! {
                () = shutdown_signal() => Stop::Signal,
                err = running.fatal_error() => Stop::Fatal(err),
            };
            match stop {
                Stop::Signal => {
                    info!("Shutdown signal received");
                    running.shutdown().await?
                }
                Stop::Fatal(err) => {
                    error!(error = %err, "Fatal pipeline error; shutting down");
                    if let Err(teardown) = running.shutdown().await {
                        warn!(error = %teardown, "Shutdown after fatal error was incomplete");
                    }
                    return Err(err);
                }
            }
        }
    };

    info!(
        completed = snapshot.completed,
        enqueued = snapshot.enqueued,
        "Pagewerk stopped cleanly"
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn worker_subcommand_takes_json_config() {
        let json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        let cli = Cli::try_parse_from(["pagewerk", "worker", "--config", &json]).unwrap();
        match cli.command {
            Some(Command::Worker { config }) => {
                let parsed: PipelineConfig = serde_json::from_str(&config).unwrap();
                assert_eq!(parsed, PipelineConfig::default());
            }
            None => panic!("expected worker subcommand"),
        }
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from(["pagewerk", "--once", "--reset", "--workers", "2"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.once);
        assert!(cli.run.reset);
        assert_eq!(cli.run.workers, Some(2));
    }
}
