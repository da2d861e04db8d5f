// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline assembly: wires watcher, queue, dispatcher, pool, ledger, and
// accounting together and hands back one handle to run or stop them.

use std::sync::Arc;

use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::ProgressSnapshot;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument};

use crate::error_log::ErrorLog;
use crate::ledger::Ledger;
use crate::pool::{JobExecutor, PoolContext, WorkerPool};
use crate::progress::{self, Progress};
use crate::queue::{self, Dispatcher};
use crate::shutdown::ShutdownCoordinator;
use crate::watcher::{FolderWatcher, Intake};

/// How long the pipeline keeps discovering work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Scan, then follow live events until shut down.
    Watch,
    /// Scan once, process everything found, then stop.
    Once,
}

/// A prepared but not yet running pipeline.
///
/// Holds the durable state (ledger, error log) so callers can build their
/// executor around the same error log before starting.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    ledger: Arc<Ledger>,
    error_log: Arc<ErrorLog>,
}

impl Pipeline {
    /// Validate `config`, create the folders, and open the ledger and error
    /// log. Resets the ledger when the config asks for it.
    #[instrument(skip_all, fields(watch_root = %config.watch_root.display()))]
    pub fn prepare(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.watch_root)?;
        std::fs::create_dir_all(&config.output_root)?;

        let ledger = Ledger::load(&config.ledger_path)?;
        if config.reset_ledger {
            ledger.reset()?;
        }
        let error_log = ErrorLog::open(&config.error_log_path)?;

        Ok(Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            error_log: Arc::new(error_log),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn error_log(&self) -> &Arc<ErrorLog> {
        &self.error_log
    }

    /// Start every component and the discovery passes for `mode`.
    pub async fn start(
        self,
        executor: Arc<dyn JobExecutor>,
        mode: RunMode,
    ) -> Result<RunningPipeline> {
        let Self {
            config,
            ledger,
            error_log,
        } = self;

        let progress = Arc::new(Progress::with_baseline(ledger.len() as u64));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let pool = WorkerPool::start(
            executor,
            config.max_workers,
            config.queue_backlog,
            PoolContext {
                ledger: ledger.clone(),
                failures: error_log.clone(),
                completions: completions_tx,
                fatal: fatal_tx,
            },
        );
        let terminator = pool.terminator();
        let accounting = tokio::spawn(progress::account(completions_rx, progress.clone()));

        let (submitter, queue) = queue::channel();
        let dispatcher = tokio::spawn(Dispatcher::new(queue, pool, progress.clone()).run());

        let intake = Arc::new(Intake::new(
            config.clone(),
            ledger.clone(),
            submitter.clone(),
            error_log.clone(),
        ));

        // Subscribe before scanning so files landing mid-scan are not missed.
        let watcher = match mode {
            RunMode::Watch => Some(FolderWatcher::start(intake.clone())?),
            RunMode::Once => None,
        };
        let scan = {
            let intake = intake.clone();
            tokio::spawn(async move { intake.scan().await })
        };

        info!(
            workers = config.max_workers,
            already_processed = ledger.len(),
            ?mode,
            "Pipeline started"
        );

        Ok(RunningPipeline {
            coordinator: ShutdownCoordinator {
                intake,
                watcher,
                scan,
                submitter,
                dispatcher,
                terminator,
                accounting,
            },
            progress,
            ledger,
            fatal: fatal_rx,
        })
    }
}

/// Handle on a started pipeline.
pub struct RunningPipeline {
    coordinator: ShutdownCoordinator,
    progress: Arc<Progress>,
    ledger: Arc<Ledger>,
    fatal: mpsc::UnboundedReceiver<PagewerkError>,
}

impl RunningPipeline {
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Resolves with the first process-fatal error.
    ///
    /// Pending forever while the pipeline is healthy.
    pub async fn fatal_error(&mut self) -> PagewerkError {
        match self.fatal.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Wait for the startup scan, process everything it found, and stop.
    pub async fn finish(mut self) -> Result<ProgressSnapshot> {
        self.coordinator.drain().await?;
        if let Ok(err) = self.fatal.try_recv() {
            return Err(err);
        }
        Ok(self.progress.snapshot())
    }

    /// Stop intake, kill in-flight work, and drop whatever is still queued.
    pub async fn shutdown(mut self) -> Result<ProgressSnapshot> {
        self.coordinator.shutdown().await?;
        if let Ok(err) = self.fatal.try_recv() {
            return Err(err);
        }
        Ok(self.progress.snapshot())
    }
}
