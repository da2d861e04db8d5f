// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Pagewerk.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Pagewerk operations.
#[derive(Debug, Error)]
pub enum PagewerkError {
    // -- Intake errors --
    #[error("{} not ready after {:.1}s", path.display(), waited.as_secs_f64())]
    NotReady { path: PathBuf, waited: Duration },

    #[error("{} cannot be recorded as processed on this platform", path.display())]
    UnrecordablePath { path: PathBuf },

    #[error("filesystem watch failed: {0}")]
    Watch(String),

    // -- Orientation / page errors --
    #[error("orientation classification failed: {0}")]
    Classification(String),

    #[error("rotation failed: {0}")]
    Rotation(String),

    #[error("saving page {page} failed: {detail}")]
    PageSave { page: usize, detail: String },

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Document errors --
    #[error("cannot open {}: {detail}", path.display())]
    DocumentOpen { path: PathBuf, detail: String },

    // -- Execution --
    #[error("worker failed: {0}")]
    Worker(String),

    // -- Persistence --
    #[error("ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How far the damage of an error reaches.
///
/// Everything below [`ErrorScope::Process`] is absorbed where it happens and
/// logged; only process-scoped errors stop the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorScope {
    /// One orientation trial. Degrades to a zero-confidence observation.
    Trial,
    /// One page. Falls back to an unrotated or backup save.
    Page,
    /// One discovered path. Abandoned until the next scan or restart.
    Path,
    /// One source document. Not ledgered, retried later.
    Document,
    /// The whole pipeline.
    Process,
}

impl PagewerkError {
    /// Classify this error for absorb-or-propagate decisions.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::Classification(_) | Self::Render(_) => ErrorScope::Trial,
            Self::Rotation(_) | Self::PageSave { .. } | Self::Pdf(_) | Self::Image(_) => {
                ErrorScope::Page
            }
            Self::NotReady { .. } | Self::UnrecordablePath { .. } | Self::Watch(_) => {
                ErrorScope::Path
            }
            Self::DocumentOpen { .. } | Self::Worker(_) | Self::Serialization(_) => {
                ErrorScope::Document
            }
            Self::Io(_) => ErrorScope::Document,
            Self::LedgerWrite(_) | Self::Config(_) => ErrorScope::Process,
        }
    }

    /// Whether the pipeline must stop because of this error.
    pub fn is_fatal(&self) -> bool {
        self.scope() == ErrorScope::Process
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagewerkError>;
