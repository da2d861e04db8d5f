// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job queue and dispatcher.
//
// Intake tasks (startup scan, live events) push paths through cloneable
// submitters into one unbounded queue. A single dispatcher drains it, so the
// pool receives jobs in the order they were queued. The `Shutdown` sentinel
// ends the dispatcher after every entry queued before it; terminating the
// pool ends it at once, even while it waits on a full backlog.

use std::path::PathBuf;
use std::sync::Arc;

use pagewerk_core::error::{PagewerkError, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::pool::{PoolTerminator, WorkerPool};
use crate::progress::Progress;

/// One entry in the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
    Job(PathBuf),
    /// Stop the dispatcher. Never processed as a job.
    Shutdown,
}

/// Producer handle for the job queue.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    tx: mpsc::UnboundedSender<QueueEntry>,
}

impl JobSubmitter {
    pub fn submit(&self, path: PathBuf) -> Result<()> {
        self.tx
            .send(QueueEntry::Job(path))
            .map_err(|_| PagewerkError::Worker("job queue is closed".into()))
    }

    /// Queue the shutdown sentinel. Returns `false` if the dispatcher is gone.
    pub fn shutdown(&self) -> bool {
        self.tx.send(QueueEntry::Shutdown).is_ok()
    }
}

/// Consumer end of the job queue.
#[derive(Debug)]
pub struct JobQueue {
    rx: mpsc::UnboundedReceiver<QueueEntry>,
}

impl JobQueue {
    /// Wait for the next entry. `None` once every submitter is gone.
    pub async fn recv(&mut self) -> Option<QueueEntry> {
        self.rx.recv().await
    }

    /// Take the next entry if one is already queued.
    pub fn try_recv(&mut self) -> Option<QueueEntry> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected submitter / queue pair.
pub fn channel() -> (JobSubmitter, JobQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobSubmitter { tx }, JobQueue { rx })
}

/// The single consumer of the job queue.
pub struct Dispatcher {
    queue: JobQueue,
    pool: WorkerPool,
    terminator: PoolTerminator,
    progress: Arc<Progress>,
}

impl Dispatcher {
    pub fn new(queue: JobQueue, pool: WorkerPool, progress: Arc<Progress>) -> Self {
        Self {
            terminator: pool.terminator(),
            queue,
            pool,
            progress,
        }
    }

    /// Feed queued paths to the pool until the sentinel arrives or the pool
    /// is terminated.
    ///
    /// Hands the pool back so the caller decides whether to drain or kill it.
    pub async fn run(mut self) -> WorkerPool {
        loop {
            let entry = tokio::select! {
                biased;
                () = self.terminator.cancelled() => {
                    info!("Pool terminated; dispatcher stopping");
                    break;
                }
                entry = self.queue.recv() => entry,
            };
            let path = match entry {
                Some(QueueEntry::Job(path)) => path,
                Some(QueueEntry::Shutdown) => {
                    info!("Shutdown sentinel received; dispatcher stopping");
                    break;
                }
                None => break,
            };

            let snap = self.progress.job_enqueued();
            info!(path = %path.display(), enqueued = snap.enqueued, "Enqueued document");
            let shown = path.display().to_string();
            let submitted = tokio::select! {
                biased;
                () = self.terminator.cancelled() => {
                    warn!(path = %shown, "Pool terminated; job dropped");
                    break;
                }
                submitted = self.pool.submit(path) => submitted,
            };
            if let Err(err) = submitted {
                error!(error = %err, "Cannot hand job to worker pool; dispatcher stopping");
                break;
            }
        }
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::pool::{InProcessExecutor, PoolContext};
    use pagewerk_core::types::DocumentReport;
    use pagewerk_document::{DiscardFailures, ProcessDocument};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the order documents reach the processor.
    #[derive(Default)]
    struct Recorder {
        order: Mutex<Vec<PathBuf>>,
    }

    impl ProcessDocument for Recorder {
        fn process(&self, source: &Path) -> pagewerk_core::error::Result<DocumentReport> {
            self.order.lock().unwrap().push(source.to_path_buf());
            Ok(DocumentReport {
                source: source.to_path_buf(),
                pages: Vec::new(),
                elapsed_ms: 0,
            })
        }
    }

    /// Blocks its worker for a fixed time per document.
    struct Stall(Duration);

    impl ProcessDocument for Stall {
        fn process(&self, source: &Path) -> pagewerk_core::error::Result<DocumentReport> {
            std::thread::sleep(self.0);
            Ok(DocumentReport {
                source: source.to_path_buf(),
                pages: Vec::new(),
                elapsed_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn drains_queue_in_order_then_stops_at_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::load(dir.path().join("ledger.txt")).unwrap());
        let (completions, mut done) = mpsc::unbounded_channel();
        let (fatal, _fatal_rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(recorder.clone())),
            1,
            4,
            PoolContext {
                ledger,
                failures: Arc::new(DiscardFailures),
                completions,
                fatal,
            },
        );
        let progress = Arc::new(Progress::default());
        let (submitter, queue) = channel();

        for name in ["1", "2", "3"] {
            submitter.submit(PathBuf::from(format!("/w/{name}.pdf"))).unwrap();
        }
        assert!(submitter.shutdown());
        submitter.submit(PathBuf::from("/w/after.pdf")).unwrap();

        let pool = Dispatcher::new(queue, pool, progress.clone()).run().await;
        pool.close().await;

        let order = recorder.order.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                PathBuf::from("/w/1.pdf"),
                PathBuf::from("/w/2.pdf"),
                PathBuf::from("/w/3.pdf"),
            ]
        );
        assert_eq!(progress.snapshot().enqueued, 3);
        for _ in 0..3 {
            assert!(done.recv().await.is_some());
        }
    }

    #[test]
    fn submitting_after_queue_dropped_fails() {
        let (submitter, queue) = channel();
        drop(queue);
        assert!(submitter.submit(PathBuf::from("/w/a.pdf")).is_err());
        assert!(!submitter.shutdown());
    }

    #[tokio::test]
    async fn terminating_the_pool_unblocks_a_full_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::load(dir.path().join("ledger.txt")).unwrap());
        let (completions, _done) = mpsc::unbounded_channel();
        let (fatal, _fatal_rx) = mpsc::unbounded_channel();
        let stall = Arc::new(Stall(Duration::from_secs(2)));
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(stall)),
            1,
            1,
            PoolContext {
                ledger,
                failures: Arc::new(DiscardFailures),
                completions,
                fatal,
            },
        );
        let terminator = pool.terminator();
        let progress = Arc::new(Progress::default());
        let (submitter, queue) = channel();
        for i in 0..4 {
            submitter.submit(PathBuf::from(format!("/w/{i}.pdf"))).unwrap();
        }
        let dispatcher = tokio::spawn(Dispatcher::new(queue, pool, progress).run());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        terminator.terminate();
        let pool = tokio::time::timeout(Duration::from_secs(1), dispatcher)
            .await
            .expect("dispatcher stops without waiting for the backlog")
            .unwrap();
        pool.terminate().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
