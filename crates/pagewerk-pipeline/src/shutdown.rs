// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shutdown coordinator.
//
// Teardown order: intake first (no new paths), then the sentinel (the
// dispatcher forwards what was already queued and exits), then the pool, then
// progress accounting once the last completion has been counted. An immediate
// shutdown terminates the pool before waiting on the dispatcher, so a
// dispatcher blocked on a full backlog returns at once and queued jobs are
// dropped.

use std::sync::Arc;

use pagewerk_core::error::{PagewerkError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::pool::{PoolTerminator, WorkerPool};
use crate::queue::JobSubmitter;
use crate::watcher::{FolderWatcher, Intake};

/// Owns every running component of a started pipeline.
pub struct ShutdownCoordinator {
    pub(crate) intake: Arc<Intake>,
    pub(crate) watcher: Option<FolderWatcher>,
    pub(crate) scan: JoinHandle<usize>,
    pub(crate) submitter: JobSubmitter,
    pub(crate) dispatcher: JoinHandle<WorkerPool>,
    pub(crate) terminator: PoolTerminator,
    pub(crate) accounting: JoinHandle<()>,
}

impl ShutdownCoordinator {
    /// Immediate shutdown: in-flight jobs are killed and not ledgered.
    #[instrument(skip_all)]
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutdown requested");
        self.scan.abort();
        let pool = self.stop_intake_and_dispatch(true).await?;
        pool.terminate().await;
        self.finish_accounting().await;
        info!("Shutdown complete");
        Ok(())
    }

    /// Graceful drain: every queued job runs to completion.
    #[instrument(skip_all)]
    pub async fn drain(mut self) -> Result<()> {
        match self.scan_result().await {
            Some(submitted) => info!(submitted, "Scan complete; draining queue"),
            None => warn!("Startup scan did not finish"),
        }
        let pool = self.stop_intake_and_dispatch(false).await?;
        pool.close().await;
        self.finish_accounting().await;
        info!("All queued documents finished");
        Ok(())
    }

    async fn scan_result(&mut self) -> Option<usize> {
        (&mut self.scan).await.ok()
    }

    async fn stop_intake_and_dispatch(&mut self, immediate: bool) -> Result<WorkerPool> {
        self.intake.stop_accepting();
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        if !self.scan.is_finished() {
            match (&mut self.scan).await {
                Ok(_) => {}
                Err(err) if err.is_cancelled() => info!("Startup scan interrupted"),
                Err(err) => warn!(error = %err, "Startup scan ended abnormally"),
            }
        }

        if !self.submitter.shutdown() {
            debug!("Dispatcher already gone");
        }
        if immediate {
            self.terminator.terminate();
        }
        (&mut self.dispatcher)
            .await
            .map_err(|err| PagewerkError::Worker(format!("dispatcher task failed: {err}")))
    }

    async fn finish_accounting(self) {
        if let Err(err) = self.accounting.await {
            warn!(error = %err, "Progress accounting ended abnormally");
        }
    }
}
