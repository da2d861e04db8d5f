// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool.
//
// A fixed number of slots pull document paths from one bounded channel. Each
// slot owns at most one execution unit, normally a `pagewerk worker` child
// process, spawned on first use and replaced after it dies, so a crash in the
// renderer or classifier costs one job and nothing else. When every slot is
// busy, submissions wait in the channel; only a full backlog blocks the
// dispatcher.
//
// The pool is the only writer of the ledger: a path is appended after its
// worker reports the document completed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{DocumentOutcome, JobId, WorkerRequest, WorkerResponse};
use pagewerk_document::{FailureSink, ProcessDocument};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::ledger::Ledger;
use crate::progress::Completion;
use crate::worker::process_blocking;

// ---------------------------------------------------------------------------
// Execution seams
// ---------------------------------------------------------------------------

/// One isolated executor of document jobs.
#[async_trait]
pub trait ExecutionUnit: Send {
    /// Run one job to completion. An `Err` means the unit itself is broken
    /// and must be replaced.
    async fn run(&mut self, request: WorkerRequest) -> Result<DocumentOutcome>;

    /// Stop the unit immediately.
    async fn terminate(&mut self);
}

/// Factory for execution units.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn spawn(&self, slot: usize) -> Result<Box<dyn ExecutionUnit>>;
}

// ---------------------------------------------------------------------------
// Child-process executor
// ---------------------------------------------------------------------------

/// Spawns one child process per slot and talks NDJSON over its stdio.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessExecutor {
    /// Run `program worker --config <json>` children.
    pub fn for_worker(program: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Self> {
        let json = serde_json::to_string(config)?;
        Ok(Self::new(
            program,
            vec!["worker".into(), "--config".into(), json.into()],
        ))
    }

    /// Run an arbitrary command speaking the worker protocol.
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn spawn(&self, slot: usize) -> Result<Box<dyn ExecutionUnit>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| PagewerkError::Worker(format!("cannot start worker: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PagewerkError::Worker("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PagewerkError::Worker("worker stdout unavailable".into()))?;

        info!(slot, pid = child.id(), "Worker process started");
        Ok(Box::new(ProcessUnit {
            slot,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }))
    }
}

struct ProcessUnit {
    slot: usize,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl ExecutionUnit for ProcessUnit {
    async fn run(&mut self, request: WorkerRequest) -> Result<DocumentOutcome> {
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .await
            .map_err(|err| PagewerkError::Worker(format!("cannot send job to worker: {err}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|err| PagewerkError::Worker(format!("cannot send job to worker: {err}")))?;

        let reply = self
            .stdout
            .next_line()
            .await
            .map_err(|err| PagewerkError::Worker(format!("cannot read worker reply: {err}")))?
            .ok_or_else(|| PagewerkError::Worker("worker exited before replying".into()))?;

        let response: WorkerResponse = serde_json::from_str(&reply)
            .map_err(|err| PagewerkError::Worker(format!("garbled worker reply: {err}")))?;
        if response.job_id != request.job_id {
            return Err(PagewerkError::Worker(format!(
                "worker answered job {} while running {}",
                response.job_id, request.job_id
            )));
        }
        Ok(response.outcome)
    }

    async fn terminate(&mut self) {
        if let Err(err) = self.child.start_kill() {
            debug!(slot = self.slot, error = %err, "Worker already gone");
        }
        match self.child.wait().await {
            Ok(status) => debug!(slot = self.slot, %status, "Worker process reaped"),
            Err(err) => warn!(slot = self.slot, error = %err, "Cannot reap worker process"),
        }
    }
}

// ---------------------------------------------------------------------------
// In-process executor
// ---------------------------------------------------------------------------

/// Runs jobs on the blocking thread pool of this process.
///
/// No crash isolation, and in-flight jobs cannot be interrupted; they finish
/// in the background after `terminate`.
#[derive(Clone)]
pub struct InProcessExecutor {
    processor: Arc<dyn ProcessDocument>,
}

impl InProcessExecutor {
    pub fn new(processor: Arc<dyn ProcessDocument>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl JobExecutor for InProcessExecutor {
    async fn spawn(&self, _slot: usize) -> Result<Box<dyn ExecutionUnit>> {
        Ok(Box::new(InProcessUnit {
            processor: self.processor.clone(),
        }))
    }
}

struct InProcessUnit {
    processor: Arc<dyn ProcessDocument>,
}

#[async_trait]
impl ExecutionUnit for InProcessUnit {
    async fn run(&mut self, request: WorkerRequest) -> Result<DocumentOutcome> {
        Ok(process_blocking(self.processor.clone(), &request).await)
    }

    async fn terminate(&mut self) {}
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Shared state every slot reports into.
#[derive(Clone)]
pub struct PoolContext {
    pub ledger: Arc<Ledger>,
    pub failures: Arc<dyn FailureSink>,
    pub completions: mpsc::UnboundedSender<Completion>,
    /// Receives process-fatal errors (ledger durability).
    pub fatal: mpsc::UnboundedSender<PagewerkError>,
}

impl PoolContext {
    fn finish(&self, path: PathBuf, outcome: DocumentOutcome) {
        match &outcome {
            DocumentOutcome::Completed(_) => {
                if let Err(err) = self.ledger.append(&path) {
                    error!(
                        path = %path.display(),
                        error = %err,
                        "Cannot record completed document"
                    );
                    self.failures.record(&path, &err.to_string());
                    let _ = self.fatal.send(err);
                }
            }
            DocumentOutcome::Failed { message } => self.failures.record(&path, message),
            DocumentOutcome::Skipped => {}
        }
        let _ = self.completions.send(Completion { path, outcome });
    }
}

/// Fixed-size set of worker slots fed from one bounded channel.
pub struct WorkerPool {
    jobs: Option<mpsc::Sender<PathBuf>>,
    slots: JoinSet<()>,
    cancel: Arc<watch::Sender<bool>>,
}

/// Cancels a pool from outside, even while its owner is blocked in `submit`.
#[derive(Clone)]
pub struct PoolTerminator {
    cancel: Arc<watch::Sender<bool>>,
}

impl PoolTerminator {
    /// Kill running units and stop every slot. Idempotent.
    pub fn terminate(&self) {
        self.cancel.send_replace(true);
    }

    /// Resolves once the pool has been told to terminate.
    pub async fn cancelled(&self) {
        let mut signal = self.cancel.subscribe();
        let _ = signal.wait_for(|cancelled| *cancelled).await;
    }
}

impl WorkerPool {
    /// Start `size` slots with room for `backlog` waiting jobs.
    pub fn start(
        executor: Arc<dyn JobExecutor>,
        size: usize,
        backlog: usize,
        context: PoolContext,
    ) -> Self {
        let (jobs, rx) = mpsc::channel(backlog.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let (cancel, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel);

        let mut slots = JoinSet::new();
        for slot in 0..size.max(1) {
            slots.spawn(run_slot(
                slot,
                executor.clone(),
                rx.clone(),
                cancel_rx.clone(),
                context.clone(),
            ));
        }
        info!(size = size.max(1), backlog, "Worker pool started");

        Self {
            jobs: Some(jobs),
            slots,
            cancel,
        }
    }

    pub fn terminator(&self) -> PoolTerminator {
        PoolTerminator {
            cancel: self.cancel.clone(),
        }
    }

    /// Hand `path` to the pool. Waits only while the backlog is full.
    pub async fn submit(&self, path: PathBuf) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| PagewerkError::Worker("worker pool is closed".into()))?;
        jobs.send(path)
            .await
            .map_err(|_| PagewerkError::Worker("worker pool is closed".into()))
    }

    /// Stop accepting jobs and wait for every queued and running job.
    pub async fn close(mut self) {
        self.jobs.take();
        while self.slots.join_next().await.is_some() {}
        info!("Worker pool drained");
    }

    /// Stop immediately: kill running units and drop queued jobs.
    pub async fn terminate(mut self) {
        self.jobs.take();
        self.cancel.send_replace(true);
        while self.slots.join_next().await.is_some() {}
        info!("Worker pool terminated");
    }
}

async fn next_job(jobs: &Mutex<mpsc::Receiver<PathBuf>>) -> Option<PathBuf> {
    jobs.lock().await.recv().await
}

async fn run_slot(
    slot: usize,
    executor: Arc<dyn JobExecutor>,
    jobs: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    mut cancel: watch::Receiver<bool>,
    context: PoolContext,
) {
    let mut unit: Option<Box<dyn ExecutionUnit>> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.changed() => None,
            path = next_job(&jobs) => path,
        };
        let Some(path) = next else { break };

        // Another worker may have finished this path since it was queued.
        if context.ledger.contains(&path) {
            context.finish(path, DocumentOutcome::Skipped);
            continue;
        }

        if unit.is_none() {
            match executor.spawn(slot).await {
                Ok(spawned) => unit = Some(spawned),
                Err(err) => {
                    error!(slot, error = %err, "Cannot start worker");
                    context.finish(path, DocumentOutcome::Failed { message: err.to_string() });
                    continue;
                }
            }
        }
        let Some(active) = unit.as_mut() else { continue };

        let request = WorkerRequest {
            job_id: JobId::new(),
            source: path.clone(),
        };
        info!(slot, job_id = %request.job_id, path = %path.display(), "Processing started");

        let finished = tokio::select! {
            biased;
            _ = cancel.changed() => None,
            result = active.run(request) => Some(result),
        };

        match finished {
            None => {
                warn!(slot, path = %path.display(), "Terminating in-flight job");
                break;
            }
            Some(Ok(outcome)) => context.finish(path, outcome),
            Some(Err(err)) => {
                error!(slot, path = %path.display(), error = %err, "Worker lost; replacing it");
                if let Some(mut broken) = unit.take() {
                    broken.terminate().await;
                }
                context.finish(path, DocumentOutcome::Failed { message: err.to_string() });
            }
        }
    }

    if let Some(mut active) = unit.take() {
        active.terminate().await;
    }
    debug!(slot, "Worker slot stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewerk_core::types::DocumentReport;
    use std::path::Path;
    use pagewerk_document::DiscardFailures;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        context: PoolContext,
        completions: mpsc::UnboundedReceiver<Completion>,
        fatal: mpsc::UnboundedReceiver<PagewerkError>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::load(dir.path().join("ledger.txt")).unwrap());
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (fatal_tx, fatal) = mpsc::unbounded_channel();
        Harness {
            _dir: dir,
            ledger: ledger.clone(),
            context: PoolContext {
                ledger,
                failures: Arc::new(DiscardFailures),
                completions: completions_tx,
                fatal: fatal_tx,
            },
            completions,
            fatal,
        }
    }

    /// Processor that reports every document completed after a short delay.
    struct Slow {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ProcessDocument for Slow {
        fn process(&self, source: &Path) -> Result<DocumentReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(DocumentReport {
                source: source.to_path_buf(),
                pages: Vec::new(),
                elapsed_ms: self.delay.as_millis() as u64,
            })
        }
    }

    fn slow(ms: u64) -> Arc<Slow> {
        Arc::new(Slow {
            delay: Duration::from_millis(ms),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn completed_jobs_are_ledgered() {
        let mut h = harness();
        let processor = slow(5);
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(processor.clone())),
            2,
            8,
            h.context.clone(),
        );

        for name in ["a", "b", "c"] {
            pool.submit(PathBuf::from(format!("/w/{name}.pdf"))).await.unwrap();
        }
        pool.close().await;
        drop(h.context);

        let mut seen = 0;
        while let Some(done) = h.completions.recv().await {
            assert!(done.outcome.is_completed());
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert_eq!(h.ledger.len(), 3);
        assert!(h.fatal.try_recv().is_err());
    }

    #[tokio::test]
    async fn ledgered_paths_are_skipped_before_dispatch() {
        let mut h = harness();
        h.ledger.append(Path::new("/w/done.pdf")).unwrap();
        let processor = slow(1);
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(processor.clone())),
            1,
            4,
            h.context.clone(),
        );

        pool.submit(PathBuf::from("/w/done.pdf")).await.unwrap();
        pool.close().await;

        let done = h.completions.recv().await.unwrap();
        assert_eq!(done.outcome, DocumentOutcome::Skipped);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminate_drops_queued_jobs() {
        let h = harness();
        let processor = slow(200);
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(processor.clone())),
            1,
            16,
            h.context.clone(),
        );

        for i in 0..10 {
            pool.submit(PathBuf::from(format!("/w/{i}.pdf"))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.terminate().await;

        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert!(h.ledger.is_empty());
    }

    /// Executor whose units fail every job, counting spawns.
    struct Crashing {
        spawns: Arc<AtomicUsize>,
    }

    struct CrashingUnit;

    #[async_trait]
    impl ExecutionUnit for CrashingUnit {
        async fn run(&mut self, _request: WorkerRequest) -> Result<DocumentOutcome> {
            Err(PagewerkError::Worker("worker exited before replying".into()))
        }

        async fn terminate(&mut self) {}
    }

    #[async_trait]
    impl JobExecutor for Crashing {
        async fn spawn(&self, _slot: usize) -> Result<Box<dyn ExecutionUnit>> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CrashingUnit))
        }
    }

    #[tokio::test]
    async fn crashed_units_are_replaced_and_jobs_fail() {
        let mut h = harness();
        let spawns = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::start(
            Arc::new(Crashing { spawns: spawns.clone() }),
            1,
            4,
            h.context.clone(),
        );

        pool.submit(PathBuf::from("/w/a.pdf")).await.unwrap();
        pool.submit(PathBuf::from("/w/b.pdf")).await.unwrap();
        pool.close().await;

        for _ in 0..2 {
            let done = h.completions.recv().await.unwrap();
            assert!(matches!(done.outcome, DocumentOutcome::Failed { .. }));
        }
        assert_eq!(spawns.load(Ordering::SeqCst), 2);
        assert!(h.ledger.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_process_speaks_line_protocol() {
        let mut h = harness();
        // Echo each request back as a `Skipped` reply for the same job id.
        let executor = ProcessExecutor::new(
            "sh",
            vec![
                "-c".into(),
                r#"while IFS= read -r line; do echo "${line%%,*},\"outcome\":\"Skipped\"}"; done"#
                    .into(),
            ],
        );
        let pool = WorkerPool::start(Arc::new(executor), 1, 4, h.context.clone());

        pool.submit(PathBuf::from("/w/a.pdf")).await.unwrap();
        pool.submit(PathBuf::from("/w/b.pdf")).await.unwrap();
        pool.close().await;

        for expected in ["/w/a.pdf", "/w/b.pdf"] {
            let done = h.completions.recv().await.unwrap();
            assert_eq!(done.path, PathBuf::from(expected));
            assert_eq!(done.outcome, DocumentOutcome::Skipped);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dead_child_fails_only_its_job() {
        let mut h = harness();
        let executor = ProcessExecutor::new("sh", vec!["-c".into(), "exit 3".into()]);
        let pool = WorkerPool::start(Arc::new(executor), 1, 4, h.context.clone());

        pool.submit(PathBuf::from("/w/a.pdf")).await.unwrap();
        pool.close().await;

        let done = h.completions.recv().await.unwrap();
        assert!(matches!(done.outcome, DocumentOutcome::Failed { .. }));
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn ledger_write_failure_is_reported_as_fatal() {
        let mut h = harness();
        h.ledger.make_read_only().unwrap();
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(slow(1))),
            1,
            4,
            h.context.clone(),
        );

        pool.submit(PathBuf::from("/w/a.pdf")).await.unwrap();
        pool.close().await;

        let done = h.completions.recv().await.unwrap();
        assert!(done.outcome.is_completed());
        assert!(!h.ledger.contains(Path::new("/w/a.pdf")));
        assert!(matches!(
            h.fatal.try_recv(),
            Ok(PagewerkError::LedgerWrite(_))
        ));
    }

    #[tokio::test]
    async fn terminator_stops_slots_while_backlog_is_full() {
        let h = harness();
        let processor = slow(500);
        let pool = WorkerPool::start(
            Arc::new(InProcessExecutor::new(processor.clone())),
            1,
            1,
            h.context.clone(),
        );
        let terminator = pool.terminator();

        pool.submit(PathBuf::from("/w/a.pdf")).await.unwrap();
        pool.submit(PathBuf::from("/w/b.pdf")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        terminator.terminate();
        terminator.cancelled().await;
        pool.terminate().await;

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert!(h.ledger.is_empty());
    }
}
