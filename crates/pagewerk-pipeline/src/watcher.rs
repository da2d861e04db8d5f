// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ingestion watcher.
//
// Two discovery paths share one intake routine: a recursive scan of the watch
// root at startup and a live `notify` subscription for created files. Intake
// filters by type and extension, waits for the readiness gate, consults the
// ledger, and submits to the job queue. It never processes anything itself,
// and a failure on one path is logged and recorded without stopping intake.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_document::FailureSink;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::ledger::Ledger;
use crate::queue::JobSubmitter;
use crate::readiness::ReadinessGate;

/// The shared intake routine.
pub struct Intake {
    config: Arc<PipelineConfig>,
    gate: ReadinessGate,
    ledger: Arc<Ledger>,
    submitter: JobSubmitter,
    failures: Arc<dyn FailureSink>,
    accepting: AtomicBool,
}

impl Intake {
    pub fn new(
        config: Arc<PipelineConfig>,
        ledger: Arc<Ledger>,
        submitter: JobSubmitter,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            gate: ReadinessGate::from_config(&config),
            config,
            ledger,
            submitter,
            failures,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Refuse every path discovered from now on.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Run one discovered path through intake.
    ///
    /// Returns whether the path was submitted.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn consider(&self, path: PathBuf) -> Result<bool> {
        if !self.is_accepting() {
            debug!("Intake stopped; ignoring");
            return Ok(false);
        }
        if !self.config.matches_extension(&path) {
            return Ok(false);
        }
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|meta| meta.is_dir())
        {
            return Ok(false);
        }

        if !Ledger::can_record(&path) {
            return Err(PagewerkError::UnrecordablePath { path });
        }

        self.gate.wait_ready(&path).await?;

        if self.ledger.contains(&path) {
            debug!("Already processed; skipping");
            return Ok(false);
        }
        self.submitter.submit(path)?;
        Ok(true)
    }

    /// [`consider`](Self::consider), with failures logged and recorded.
    pub async fn handle(&self, path: PathBuf) -> bool {
        match self.consider(path.clone()).await {
            Ok(submitted) => submitted,
            Err(err) => {
                error!(path = %path.display(), error = %err, "Intake failed");
                self.failures.record(&path, &err.to_string());
                false
            }
        }
    }

    /// Walk the watch root and submit every eligible file.
    ///
    /// Returns the number of submitted paths.
    #[instrument(skip(self), fields(root = %self.config.watch_root.display()))]
    pub async fn scan(&self) -> usize {
        let root = self.config.watch_root.clone();
        let listing = tokio::task::spawn_blocking(move || {
            let mut files: Vec<PathBuf> = WalkDir::new(&root)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(error = %err, "Skipping unreadable entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .collect();
            files.sort();
            files
        })
        .await;

        let files = match listing {
            Ok(files) => files,
            Err(err) => {
                error!(error = %err, "Startup scan failed");
                return 0;
            }
        };

        let mut submitted = 0;
        for path in files {
            if !self.is_accepting() {
                break;
            }
            if self.config.matches_extension(&path) && self.handle(path).await {
                submitted += 1;
            }
        }
        info!(submitted, "Startup scan finished");
        submitted
    }
}

/// Live subscription to file-creation events under the watch root.
pub struct FolderWatcher {
    watcher: RecommendedWatcher,
    intake: Arc<Intake>,
    stop: oneshot::Sender<()>,
    events: JoinHandle<()>,
}

impl FolderWatcher {
    /// Subscribe to the watch root, recursively.
    pub fn start(intake: Arc<Intake>) -> Result<Self> {
        let root = intake.config.watch_root.clone();
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) if matches!(event.kind, EventKind::Create(_)) => {
                    for path in event.paths {
                        if tx.send(path).is_err() {
                            debug!("Intake loop gone; dropping event");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => error!("Watch error: {err}"),
            },
            Config::default(),
        )
        .map_err(|err| PagewerkError::Watch(format!("cannot create watcher: {err}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| {
                PagewerkError::Watch(format!("cannot watch {}: {err}", root.display()))
            })?;
        info!(root = %root.display(), "Watching for new documents");

        let (stop, stop_rx) = oneshot::channel();
        let events = tokio::spawn(intake_loop(rx, stop_rx, intake.clone()));

        Ok(Self {
            watcher,
            intake,
            stop,
            events,
        })
    }

    /// Stop the subscription and wait for in-flight intake to settle.
    pub async fn stop(self) {
        self.intake.stop_accepting();
        let root = self.intake.config.watch_root.clone();
        let mut watcher = self.watcher;
        if let Err(err) = watcher.unwatch(&root) {
            debug!(error = %err, "Unwatch failed");
        }
        drop(watcher);

        let _ = self.stop.send(());
        if let Err(err) = self.events.await {
            error!(error = %err, "Intake loop ended abnormally");
        }
        info!("Watcher stopped");
    }
}

async fn intake_loop(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    mut stop: oneshot::Receiver<()>,
    intake: Arc<Intake>,
) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Some(path) => {
                    debug!(path = %path.display(), "Created");
                    let intake = intake.clone();
                    tasks.spawn(async move {
                        intake.handle(path).await;
                    });
                }
                None => break,
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{self, QueueEntry};
    use pagewerk_document::testing::RecordingSink;
    use std::path::Path;
    use std::time::Duration;

    struct Setup {
        dir: tempfile::TempDir,
        intake: Arc<Intake>,
        ledger: Arc<Ledger>,
        sink: Arc<RecordingSink>,
        queue: queue::JobQueue,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            watch_root: dir.path().join("in"),
            ready_retries: 2,
            ready_delay: Duration::from_millis(10),
            ..PipelineConfig::default()
        };
        std::fs::create_dir_all(&config.watch_root).unwrap();
        let ledger = Arc::new(Ledger::load(dir.path().join("ledger.txt")).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let (submitter, queue) = queue::channel();
        let intake = Arc::new(Intake::new(
            Arc::new(config),
            ledger.clone(),
            submitter,
            sink.clone(),
        ));
        Setup {
            dir,
            intake,
            ledger,
            sink,
            queue,
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"%PDF").unwrap();
    }

    fn drain(queue: &mut queue::JobQueue) -> Vec<QueueEntry> {
        let mut entries = Vec::new();
        while let Some(entry) = queue.try_recv() {
            entries.push(entry);
        }
        entries
    }

    #[tokio::test]
    async fn scan_submits_unledgered_documents_only() {
        let mut s = setup();
        let root = s.dir.path().join("in");
        touch(&root.join("acme/a.pdf"));
        touch(&root.join("acme/deep/b.PDF"));
        touch(&root.join("acme/notes.txt"));
        touch(&root.join("globex/done.pdf"));
        s.ledger.append(&root.join("globex/done.pdf")).unwrap();

        let submitted = s.intake.scan().await;

        assert_eq!(submitted, 2);
        assert_eq!(
            drain(&mut s.queue),
            vec![
                QueueEntry::Job(root.join("acme/a.pdf")),
                QueueEntry::Job(root.join("acme/deep/b.PDF")),
            ]
        );
    }

    #[tokio::test]
    async fn unready_path_is_recorded_not_submitted() {
        let mut s = setup();
        let ghost = s.dir.path().join("in/acme/ghost.pdf");

        assert!(!s.intake.handle(ghost.clone()).await);

        assert!(drain(&mut s.queue).is_empty());
        let records = s.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, ghost);
        assert!(records[0].1.contains("not ready"));
    }

    #[tokio::test]
    async fn directories_with_matching_names_are_ignored() {
        let mut s = setup();
        let odd = s.dir.path().join("in/folder.pdf");
        std::fs::create_dir_all(&odd).unwrap();

        assert!(!s.intake.consider(odd).await.unwrap());
        assert!(drain(&mut s.queue).is_empty());
    }

    #[tokio::test]
    async fn stopped_intake_accepts_nothing() {
        let mut s = setup();
        let path = s.dir.path().join("in/a.pdf");
        touch(&path);

        s.intake.stop_accepting();

        assert!(!s.intake.consider(path).await.unwrap());
        assert_eq!(s.intake.scan().await, 0);
        assert!(drain(&mut s.queue).is_empty());
    }

    #[tokio::test]
    async fn live_events_reach_the_queue() {
        let mut s = setup();
        let watcher = FolderWatcher::start(s.intake.clone()).unwrap();
        let path = s.dir.path().join("in/tenant/new.pdf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        // Give the backend a moment to register the new sub-folder.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, b"%PDF").unwrap();

        let entry = tokio::time::timeout(Duration::from_secs(5), s.queue.recv())
            .await
            .expect("event within timeout");
        assert_eq!(entry, Some(QueueEntry::Job(path)));

        watcher.stop().await;
        assert!(!s.intake.is_accepting());
    }
}
