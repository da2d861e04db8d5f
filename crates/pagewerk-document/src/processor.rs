// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page processor: one source document in, one output file per page out.
//
// Open -> for each page { split -> detect orientation -> rotate -> save } ->
// close. Only failing to open the source is a document-level error; every
// page failure is logged, recorded, and answered with an unrotated backup
// save so the document still completes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use pagewerk_core::error::Result;
use pagewerk_core::types::{DocumentReport, PageJob, PageReport, SourceDocument};
use pagewerk_core::{OutputLayout, PipelineConfig};
use tracing::{error, info, instrument, warn};

use crate::failures::FailureSink;
use crate::orientation::{
    DetectorSettings, OrientationClassifier, OrientationDetector, TesseractOsd,
};
use crate::pdf::{PdfEngine, Pdftoppm};
use crate::raster::{DocumentEngine, RasterDocument};
use crate::rotate::rotate_page;

/// Anything that can turn a source path into single-page outputs.
///
/// Object-safe so the worker pool can hold one behind an `Arc<dyn _>`.
pub trait ProcessDocument: Send + Sync {
    fn process(&self, source: &Path) -> Result<DocumentReport>;
}

/// Splits, orients, and saves the pages of source documents.
pub struct PageProcessor<E, C> {
    engine: E,
    detector: OrientationDetector<C>,
    watch_root: PathBuf,
    output_root: PathBuf,
    layout: OutputLayout,
    rotate_dpi: u32,
    failures: Arc<dyn FailureSink>,
}

impl PageProcessor<PdfEngine, TesseractOsd> {
    /// The production processor: lopdf + pdftoppm + tesseract.
    pub fn from_config(config: &PipelineConfig, failures: Arc<dyn FailureSink>) -> Self {
        let engine = PdfEngine::new(Pdftoppm::new(config.pdftoppm_bin.clone()));
        let detector = OrientationDetector::new(
            TesseractOsd::new(config.tesseract_bin.clone()),
            DetectorSettings::from(config),
        );
        Self::new(engine, detector, config, failures)
    }
}

impl<E, C> PageProcessor<E, C>
where
    E: DocumentEngine,
    C: OrientationClassifier,
{
    pub fn new(
        engine: E,
        detector: OrientationDetector<C>,
        config: &PipelineConfig,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            engine,
            detector,
            watch_root: config.watch_root.clone(),
            output_root: config.output_root.clone(),
            layout: config.output_layout,
            rotate_dpi: config.rotate_dpi,
            failures,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn detector(&self) -> &OrientationDetector<C> {
        &self.detector
    }

    /// Directory that receives the pages of `source`.
    pub fn output_dir(&self, source: &SourceDocument) -> PathBuf {
        self.layout.directory(&self.output_root, source)
    }

    /// Process every page of the document at `path`.
    ///
    /// Returns `Err` only when the document cannot be opened or its output
    /// directory cannot be created; such a document must not be ledgered.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn process_document(&self, path: &Path) -> Result<DocumentReport> {
        let started = Instant::now();
        let mut source = SourceDocument::new(path, &self.watch_root);

        let document = self.engine.open(path)?;
        let page_count = document.page_count();
        source.page_count = Some(page_count);

        let out_dir = self.output_dir(&source);
        std::fs::create_dir_all(&out_dir)?;
        info!(pages = page_count, output = %out_dir.display(), "Processing document");

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let job = PageJob {
                source: &source,
                index,
            };
            let report = match self.process_page(&document, job, &out_dir) {
                Ok(report) => report,
                Err(err) => {
                    let message = format!("Page {} error: {err}", job.number());
                    error!(page = job.number(), "{message}");
                    self.failures.record(path, &message);
                    self.save_backup(&document, job, &out_dir)
                }
            };
            pages.push(report);
        }
        drop(document);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(pages = page_count, elapsed_ms, "Finished document");

        Ok(DocumentReport {
            source: path.to_path_buf(),
            pages,
            elapsed_ms,
        })
    }

    fn process_page(
        &self,
        document: &E::Document,
        job: PageJob<'_>,
        out_dir: &Path,
    ) -> Result<PageReport> {
        let page = document.extract_page(job.index)?;
        let orientation = self.detector.detect(&page, job, self.failures.as_ref());

        let mut page = if orientation.rotation.is_none() {
            page
        } else {
            info!(
                page = job.number(),
                rotation = %orientation.rotation,
                confidence = orientation.confidence,
                "Rotating page"
            );
            rotate_page(&self.engine, page, orientation.rotation, self.rotate_dpi)
        };

        let output = out_dir.join(self.layout.page_file_name(job.source, job.number()));
        page.save(&output)?;
        info!(page = job.number(), output = %output.display(), "Saved page");

        Ok(PageReport {
            index: job.index,
            output: Some(output),
            orientation: Some(orientation),
            backup: false,
        })
    }

    /// Best-effort unrotated save of a page whose normal path failed.
    fn save_backup(&self, document: &E::Document, job: PageJob<'_>, out_dir: &Path) -> PageReport {
        let output = out_dir.join(self.layout.backup_file_name(job.source, job.number()));
        let saved = document
            .extract_page(job.index)
            .and_then(|mut page| page.save(&output));

        match saved {
            Ok(()) => {
                warn!(
                    page = job.number(),
                    output = %output.display(),
                    "Saved unrotated backup page"
                );
                PageReport {
                    index: job.index,
                    output: Some(output),
                    orientation: None,
                    backup: true,
                }
            }
            Err(err) => {
                let message = format!("Page {} backup save failed: {err}", job.number());
                error!(page = job.number(), "{message}");
                self.failures.record(&job.source.path, &message);
                PageReport {
                    index: job.index,
                    output: None,
                    orientation: None,
                    backup: true,
                }
            }
        }
    }
}

impl<E, C> ProcessDocument for PageProcessor<E, C>
where
    E: DocumentEngine,
    C: OrientationClassifier,
{
    fn process(&self, source: &Path) -> Result<DocumentReport> {
        self.process_document(source)
    }
}
