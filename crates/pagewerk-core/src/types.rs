// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Pagewerk ingestion pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one document job handed to the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A source document discovered under the watch root.
///
/// Only read, never mutated; lives for the duration of one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Location relative to the watch root (including the file name).
    pub relative: PathBuf,
    /// Known only after the document has been opened.
    pub page_count: Option<usize>,
}

impl SourceDocument {
    /// Describe `path` relative to `watch_root`.
    ///
    /// Paths outside the root are treated as sitting directly in it.
    pub fn new(path: impl Into<PathBuf>, watch_root: &Path) -> Self {
        let path = path.into();
        let relative = match path.strip_prefix(watch_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| path.clone()),
        };
        Self {
            path,
            relative,
            page_count: None,
        }
    }

    /// File name without extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory segments between the watch root and the file.
    pub fn parent_segments(&self) -> Vec<String> {
        self.relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|c| match c {
                        std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One page of a source document submitted for orientation and saving.
#[derive(Debug, Clone, Copy)]
pub struct PageJob<'a> {
    pub source: &'a SourceDocument,
    /// Zero-based page index.
    pub index: usize,
}

impl PageJob<'_> {
    /// One-based page number, as used in file names and log lines.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Clockwise rotation needed to bring a page upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Parse an angle in degrees. Only multiples of 90 are accepted.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// A single reading from the orientation classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OsdReading {
    pub rotation: Rotation,
    pub confidence: f32,
}

impl OsdReading {
    /// The observation recorded for a trial that failed outright.
    pub const FAILED: Self = Self {
        rotation: Rotation::None,
        confidence: 0.0,
    };
}

/// Outcome of the escalating-confidence orientation protocol for one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationResult {
    pub rotation: Rotation,
    pub confidence: f32,
    /// Number of classifier trials performed (1-based).
    pub trials: u32,
    /// Whether the confidence threshold was reached.
    pub confident: bool,
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// Zero-based page index.
    pub index: usize,
    /// Where the page was written. `None` if even the backup save failed.
    pub output: Option<PathBuf>,
    /// Orientation applied to the saved page, if detection ran.
    pub orientation: Option<OrientationResult>,
    /// The page went through the failure path and was saved unrotated.
    pub backup: bool,
}

/// What happened to one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub pages: Vec<PageReport>,
    pub elapsed_ms: u64,
}

impl DocumentReport {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn backup_count(&self) -> usize {
        self.pages.iter().filter(|p| p.backup).count()
    }
}

/// Result of one document job, as reported back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocumentOutcome {
    /// Every page was attempted and the document closed cleanly.
    Completed(DocumentReport),
    /// Already present in the ledger when the job reached a worker.
    Skipped,
    /// Document-level failure; not ledgered.
    Failed { message: String },
}

impl DocumentOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Request sent to an isolated worker process, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job_id: JobId,
    pub source: PathBuf,
}

/// Reply from an isolated worker process, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub job_id: JobId,
    pub outcome: DocumentOutcome,
}

/// Point-in-time view of the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub enqueued: u64,
    pub completed: u64,
}

impl ProgressSnapshot {
    /// Share of enqueued documents that have finished, in percent.
    pub fn percent(&self) -> f64 {
        if self.enqueued == 0 {
            0.0
        } else {
            self.completed as f64 / self.enqueued as f64 * 100.0
        }
    }
}
