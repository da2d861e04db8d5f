// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end runs of the pipeline against a temporary watch folder, using the
// in-memory document engine and a scripted orientation classifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pagewerk_core::PipelineConfig;
use pagewerk_core::error::Result;
use pagewerk_core::types::DocumentReport;
use pagewerk_document::testing::{FakeEngine, ScriptedClassifier, write_source};
use pagewerk_document::{DetectorSettings, OrientationDetector, PageProcessor, ProcessDocument};
use pagewerk_pipeline::{InProcessExecutor, Pipeline, RunMode};

type FakeProcessor = PageProcessor<FakeEngine, ScriptedClassifier>;

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        watch_root: root.join("in"),
        output_root: root.join("out"),
        ledger_path: root.join("state/processed_files.txt"),
        error_log_path: root.join("state/error_log.txt"),
        warnings_log_path: None,
        max_workers: 2,
        ready_retries: 3,
        ready_delay: Duration::from_millis(10),
        ..PipelineConfig::default()
    }
}

fn processor(pipeline: &Pipeline, classifier: ScriptedClassifier) -> Arc<FakeProcessor> {
    let config = pipeline.config();
    Arc::new(PageProcessor::new(
        FakeEngine::new(),
        OrientationDetector::new(classifier, DetectorSettings::from(config)),
        config,
        pipeline.error_log().clone(),
    ))
}

async fn run_once(config: PipelineConfig, classifier: ScriptedClassifier) -> Arc<FakeProcessor> {
    let pipeline = Pipeline::prepare(config).expect("prepare");
    let processor = processor(&pipeline, classifier);
    let dyn_processor: Arc<dyn ProcessDocument> = processor.clone();
    let running = pipeline
        .start(Arc::new(InProcessExecutor::new(dyn_processor)), RunMode::Once)
        .await
        .expect("start");
    running.finish().await.expect("finish");
    processor
}

fn ledger_lines(config: &PipelineConfig) -> Vec<String> {
    std::fs::read_to_string(&config.ledger_path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn outputs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

#[tokio::test]
async fn tenant_document_is_split_rotated_and_ledgered() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let source = cfg.watch_root.join("tenant/doc.pdf");
    write_source(&source, 3).unwrap();

    let classifier = ScriptedClassifier::upright().always(2, 90, 5.0);
    let processor = run_once(cfg.clone(), classifier).await;

    let out = cfg.output_root.join("tenant");
    assert_eq!(
        outputs(&out),
        vec![
            out.join("doc - page_1.pdf"),
            out.join("doc - page_2.pdf"),
            out.join("doc - page_3.pdf"),
        ]
    );
    assert_eq!(std::fs::read_to_string(out.join("doc - page_1.pdf")).unwrap(), "page=1");
    assert_eq!(
        std::fs::read_to_string(out.join("doc - page_2.pdf")).unwrap(),
        "page=2 raster=202x102"
    );
    assert_eq!(std::fs::read_to_string(out.join("doc - page_3.pdf")).unwrap(), "page=3");

    assert_eq!(ledger_lines(&cfg), vec![source.display().to_string()]);
    assert_eq!(processor.detector().classifier().calls(), 3);
}

#[tokio::test]
async fn second_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    write_source(&cfg.watch_root.join("acme/a.pdf"), 2).unwrap();
    write_source(&cfg.watch_root.join("acme/2024/b.pdf"), 1).unwrap();
    write_source(&cfg.watch_root.join("globex/c.pdf"), 4).unwrap();

    let first = run_once(cfg.clone(), ScriptedClassifier::upright()).await;
    assert_eq!(first.engine().opened(), 3);
    let written: Vec<_> = outputs(&cfg.output_root.join("acme"))
        .into_iter()
        .chain(outputs(&cfg.output_root.join("globex")))
        .map(|p| (p.clone(), std::fs::metadata(&p).unwrap().modified().unwrap()))
        .collect();
    assert_eq!(written.len(), 7);

    let second = run_once(cfg.clone(), ScriptedClassifier::upright()).await;

    assert_eq!(second.engine().opened(), 0);
    assert_eq!(second.detector().classifier().calls(), 0);
    for (path, modified) in &written {
        assert_eq!(std::fs::metadata(path).unwrap().modified().unwrap(), *modified);
    }
    assert_eq!(ledger_lines(&cfg).len(), 3);
}

#[tokio::test]
async fn unreadable_document_is_logged_and_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let broken = cfg.watch_root.join("tenant/broken.pdf");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, "not a document").unwrap();

    run_once(cfg.clone(), ScriptedClassifier::upright()).await;

    assert!(ledger_lines(&cfg).is_empty());
    let errors = std::fs::read_to_string(&cfg.error_log_path).unwrap();
    assert!(errors.contains(&format!(" - {} - ", broken.display())));

    // Fixed in place, the document is picked up by the next run.
    write_source(&broken, 1).unwrap();
    run_once(cfg.clone(), ScriptedClassifier::upright()).await;
    assert_eq!(ledger_lines(&cfg), vec![broken.display().to_string()]);
}

#[tokio::test]
async fn reset_reprocesses_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    write_source(&cfg.watch_root.join("tenant/doc.pdf"), 1).unwrap();
    run_once(cfg.clone(), ScriptedClassifier::upright()).await;

    cfg.reset_ledger = true;
    let again = run_once(cfg.clone(), ScriptedClassifier::upright()).await;

    assert_eq!(again.engine().opened(), 1);
    assert_eq!(ledger_lines(&cfg).len(), 1);
}

#[tokio::test]
async fn watch_mode_picks_up_new_files_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let pipeline = Pipeline::prepare(cfg.clone()).unwrap();
    let processor: Arc<dyn ProcessDocument> =
        processor(&pipeline, ScriptedClassifier::upright());
    let running = pipeline
        .start(Arc::new(InProcessExecutor::new(processor)), RunMode::Watch)
        .await
        .unwrap();
    let mut progress = running.subscribe_progress();

    // Let the startup scan of the empty folder settle.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let dropped = cfg.watch_root.join("late.pdf");
    write_source(&dropped, 2).unwrap();

    tokio::time::timeout(
        Duration::from_secs(10),
        progress.wait_for(|snap| snap.completed >= 1),
    )
    .await
    .expect("processed within timeout")
    .unwrap();

    let snap = running.shutdown().await.unwrap();
    assert_eq!(snap.completed, 1);
    assert_eq!(ledger_lines(&cfg), vec![dropped.display().to_string()]);
    assert!(cfg.output_root.join("late - page_2.pdf").exists());
}

/// Holds its worker busy for a fixed time per document.
struct Stall(Duration);

impl ProcessDocument for Stall {
    fn process(&self, source: &Path) -> Result<DocumentReport> {
        std::thread::sleep(self.0);
        Ok(DocumentReport {
            source: source.to_path_buf(),
            pages: Vec::new(),
            elapsed_ms: self.0.as_millis() as u64,
        })
    }
}

#[tokio::test]
async fn shutdown_is_immediate_with_a_full_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.max_workers = 1;
    cfg.queue_backlog = 1;
    for name in ["a", "b", "c", "d"] {
        write_source(&cfg.watch_root.join(format!("tenant/{name}.pdf")), 1).unwrap();
    }

    let pipeline = Pipeline::prepare(cfg.clone()).unwrap();
    let stall: Arc<dyn ProcessDocument> = Arc::new(Stall(Duration::from_secs(2)));
    let running = pipeline
        .start(Arc::new(InProcessExecutor::new(stall)), RunMode::Watch)
        .await
        .unwrap();
    let ledger = running.ledger().clone();

    // One document running, one waiting in the backlog, the dispatcher blocked.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = std::time::Instant::now();
    let snap = running.shutdown().await.unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "shutdown took {:?}",
        started.elapsed()
    );
    assert_eq!(snap.completed, 0);
    assert!(ledger.is_empty());
    assert!(ledger_lines(&cfg).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn unusual_file_names_are_not_reprocessed() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let tenant = cfg.watch_root.join("t");
    write_source(&tenant.join("a\nb.pdf"), 1).unwrap();
    write_source(&tenant.join(OsStr::from_bytes(b"caf\xe9.pdf")), 1).unwrap();

    let first = run_once(cfg.clone(), ScriptedClassifier::upright()).await;
    assert_eq!(first.engine().opened(), 2);

    let second = run_once(cfg.clone(), ScriptedClassifier::upright()).await;
    assert_eq!(second.engine().opened(), 0);
    assert_eq!(ledger_lines(&cfg).len(), 2);
}
