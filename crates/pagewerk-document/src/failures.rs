// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure recording seam. Processing never stops for a page or trial failure,
// but every one of them is written somewhere an operator can find it.

use std::path::Path;

/// Destination for structured per-path failure records.
pub trait FailureSink: Send + Sync {
    /// Record `message` against `source`. Must not fail or panic.
    fn record(&self, source: &Path, message: &str);
}

/// Sink that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardFailures;

impl FailureSink for DiscardFailures {
    fn record(&self, _source: &Path, _message: &str) {}
}
