// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory engine and classifier for tests.
//
// A fake source file on disk holds `pages=N`. Each page carries a label (its
// 1-based number in the source) which is encoded into the raster size so the
// scripted classifier can tell pages apart: an upright page renders as
// (100 + label) x (200 + label) pixels, so a quarter turn shows up as a
// landscape raster. Saved pages are written as a one-line description.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{OsdReading, Rotation};

use crate::failures::FailureSink;
use crate::orientation::classifier::OrientationClassifier;
use crate::raster::{DocumentEngine, RasterDocument};

const BASE_WIDTH: u32 = 100;
const BASE_HEIGHT: u32 = 200;

/// Failures to inject, keyed by page label.
#[derive(Debug, Default)]
pub struct FakeFaults {
    pub failing_extracts: HashSet<usize>,
    pub failing_saves: HashSet<usize>,
    pub failing_backups: HashSet<usize>,
    pub failing_rasters: HashSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePage {
    pub label: usize,
    /// Pixel size when the page was built from a raster.
    pub raster: Option<(u32, u32)>,
}

/// Document made of labelled pages.
#[derive(Debug, Clone)]
pub struct FakeDocument {
    pub pages: Vec<FakePage>,
    faults: Arc<FakeFaults>,
}

impl FakeDocument {
    pub fn single(label: usize) -> Self {
        Self::labelled(vec![label], Arc::default())
    }

    fn labelled(labels: Vec<usize>, faults: Arc<FakeFaults>) -> Self {
        Self {
            pages: labels
                .into_iter()
                .map(|label| FakePage { label, raster: None })
                .collect(),
            faults,
        }
    }

    /// What `save` writes for this document.
    pub fn describe(&self) -> String {
        self.pages
            .iter()
            .map(|page| match page.raster {
                Some((w, h)) => format!("page={} raster={w}x{h}", page.label),
                None => format!("page={}", page.label),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl RasterDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render_page(&self, index: usize, _dpi: u32) -> Result<DynamicImage> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| PagewerkError::Render(format!("no page at index {index}")))?;
        if self.faults.failing_rasters.contains(&page.label) {
            return Err(PagewerkError::Render(format!("page {} will not rasterize", page.label)));
        }
        let (w, h) = page.raster.unwrap_or((
            BASE_WIDTH + page.label as u32,
            BASE_HEIGHT + page.label as u32,
        ));
        Ok(DynamicImage::new_rgb8(w, h))
    }

    fn extract_page(&self, index: usize) -> Result<Self> {
        let page = *self
            .pages
            .get(index)
            .ok_or_else(|| PagewerkError::Pdf(format!("no page at index {index}")))?;
        if self.faults.failing_extracts.contains(&page.label) {
            return Err(PagewerkError::Pdf(format!("page {} is damaged", page.label)));
        }
        Ok(Self {
            pages: vec![page],
            faults: Arc::clone(&self.faults),
        })
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        let backup = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with("_backup.pdf"));
        let faults = if backup {
            &self.faults.failing_backups
        } else {
            &self.faults.failing_saves
        };
        if let Some(page) = self.pages.iter().find(|p| faults.contains(&p.label)) {
            return Err(PagewerkError::PageSave {
                page: page.label,
                detail: "disk full".into(),
            });
        }
        std::fs::write(path, self.describe())?;
        Ok(())
    }
}

/// Engine reading `pages=N` source files.
#[derive(Debug, Default)]
pub struct FakeEngine {
    faults: Arc<FakeFaults>,
    opened: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FakeFaults) -> Self {
        Self {
            faults: Arc::new(faults),
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of successful `open` calls.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// Write a fake source document with `pages` pages.
pub fn write_source(path: &Path, pages: usize) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("pages={pages}"))
}

impl DocumentEngine for FakeEngine {
    type Document = FakeDocument;

    fn open(&self, path: &Path) -> Result<FakeDocument> {
        let fail = |detail: String| PagewerkError::DocumentOpen {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|err| fail(err.to_string()))?;
        let count: usize = text
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| fail("not a document".into()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDocument::labelled(
            (1..=count).collect(),
            Arc::clone(&self.faults),
        ))
    }

    fn from_raster(&self, image: &DynamicImage, _dpi: u32) -> Result<FakeDocument> {
        let (w, h) = (image.width(), image.height());
        let label = w.min(h).saturating_sub(BASE_WIDTH) as usize;
        if self.faults.failing_rasters.contains(&label) {
            return Err(PagewerkError::Image(format!("cannot embed page {label}")));
        }
        Ok(FakeDocument {
            pages: vec![FakePage {
                label,
                raster: Some((w, h)),
            }],
            faults: Arc::clone(&self.faults),
        })
    }
}

type Script = VecDeque<std::result::Result<OsdReading, String>>;

/// Classifier answering from a per-page script, then a fallback reading.
#[derive(Debug)]
pub struct ScriptedClassifier {
    scripts: Mutex<HashMap<usize, Script>>,
    fallback: OsdReading,
    calls: AtomicUsize,
    dpis: Mutex<Vec<u32>>,
}

impl Default for ScriptedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClassifier {
    /// Unscripted pages read as upright with zero confidence.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: OsdReading::FAILED,
            calls: AtomicUsize::new(0),
            dpis: Mutex::new(Vec::new()),
        }
    }

    /// Unscripted pages read as upright with high confidence.
    pub fn upright() -> Self {
        Self::new().fallback(OsdReading {
            rotation: Rotation::None,
            confidence: 5.0,
        })
    }

    pub fn fallback(mut self, reading: OsdReading) -> Self {
        self.fallback = reading;
        self
    }

    /// Queue answers for page `label`, one per trial.
    pub fn script(
        self,
        label: usize,
        answers: Vec<std::result::Result<OsdReading, String>>,
    ) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(label, answers.into());
        }
        self
    }

    /// Answer every trial of page `label` with `degrees` at `confidence`.
    pub fn always(self, label: usize, degrees: i32, confidence: f32) -> Self {
        let rotation = Rotation::from_degrees(degrees).unwrap_or_default();
        self.script(label, vec![Ok(OsdReading { rotation, confidence }); 16])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn dpis(&self) -> Vec<u32> {
        self.dpis.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl OrientationClassifier for ScriptedClassifier {
    fn classify(&self, image: &DynamicImage, dpi: u32) -> Result<OsdReading> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dpis) = self.dpis.lock() {
            dpis.push(dpi);
        }
        let label = image.width().min(image.height()).saturating_sub(BASE_WIDTH) as usize;
        let answer = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(&label).and_then(VecDeque::pop_front));
        match answer {
            Some(Ok(reading)) => Ok(reading),
            Some(Err(message)) => Err(PagewerkError::Classification(message)),
            None => Ok(self.fallback),
        }
    }
}

/// Sink that keeps every record for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(PathBuf, String)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl FailureSink for RecordingSink {
    fn record(&self, source: &Path, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((source.to_path_buf(), message.to_string()));
        }
    }
}
