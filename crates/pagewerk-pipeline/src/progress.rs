// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress accounting. Counters start from the number of documents already in
// the ledger, so the percentage line covers the whole watch folder rather
// than just this run.

use std::path::PathBuf;
use std::sync::Arc;

use pagewerk_core::types::{DocumentOutcome, ProgressSnapshot};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// A finished job, as reported by the worker pool.
#[derive(Debug, Clone)]
pub struct Completion {
    pub path: PathBuf,
    pub outcome: DocumentOutcome,
}

/// Process-wide `enqueued` / `completed` counters.
///
/// Updates go through the watch channel's own lock, so increments never race
/// and every subscriber sees each change.
#[derive(Debug)]
pub struct Progress {
    state: watch::Sender<ProgressSnapshot>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::with_baseline(0)
    }
}

impl Progress {
    pub fn with_baseline(already_done: u64) -> Self {
        let (state, _) = watch::channel(ProgressSnapshot {
            enqueued: already_done,
            completed: already_done,
        });
        Self { state }
    }

    pub fn job_enqueued(&self) -> ProgressSnapshot {
        self.update(|s| s.enqueued += 1)
    }

    /// Count a finished job and log the running percentage.
    pub fn job_finished(&self) -> ProgressSnapshot {
        let snap = self.update(|s| s.completed += 1);
        info!(
            "Progress: {}/{} documents processed ({:.1}%)",
            snap.completed,
            snap.enqueued,
            snap.percent()
        );
        snap
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.state.subscribe()
    }

    fn update(&self, change: impl FnOnce(&mut ProgressSnapshot)) -> ProgressSnapshot {
        let mut after = ProgressSnapshot::default();
        self.state.send_modify(|snap| {
            change(snap);
            after = *snap;
        });
        after
    }
}

/// Consume completions until every sender is gone.
pub async fn account(
    mut completions: mpsc::UnboundedReceiver<Completion>,
    progress: Arc<Progress>,
) {
    while let Some(Completion { path, outcome }) = completions.recv().await {
        match &outcome {
            DocumentOutcome::Completed(report) => info!(
                path = %path.display(),
                pages = report.page_count(),
                backups = report.backup_count(),
                elapsed_ms = report.elapsed_ms,
                "Document completed"
            ),
            DocumentOutcome::Skipped => info!(path = %path.display(), "Document already processed"),
            DocumentOutcome::Failed { message } => {
                error!(path = %path.display(), "Document failed: {message}")
            }
        }
        progress.job_finished();
    }
}
