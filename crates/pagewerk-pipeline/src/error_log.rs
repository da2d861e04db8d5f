// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only error log: one `timestamp - path - message` line per failure.
//
// Worker processes open the same file in append mode; each record is a
// single short write, so lines from different processes do not interleave.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use pagewerk_core::error::Result;
use pagewerk_document::FailureSink;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Structured failure records for operators.
pub struct ErrorLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ErrorLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record. Newlines in `message` are flattened.
    pub fn append(&self, source: &Path, message: &str) -> Result<()> {
        let line = format!(
            "{} - {} - {}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            source.display(),
            message.replace(['\r', '\n'], " ")
        );
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl FailureSink for ErrorLog {
    fn record(&self, source: &Path, message: &str) {
        if let Err(err) = self.append(source, message) {
            warn!(log = %self.path.display(), error = %err, "Cannot write error log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/error_log.txt");
        let log = ErrorLog::open(&path).unwrap();

        log.record(Path::new("/watch/a.pdf"), "Page 2 error: disk full");
        log.record(Path::new("/watch/b.pdf"), "two\nlines");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - /watch/a.pdf - Page 2 error: disk full"));
        assert!(lines[1].ends_with(" - /watch/b.pdf - two lines"));

        // "YYYY-MM-DD HH:MM:SS"
        let stamp = &lines[0][..19];
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error_log.txt");
        ErrorLog::open(&path).unwrap().record(Path::new("/a"), "first");
        ErrorLog::open(&path).unwrap().record(Path::new("/b"), "second");

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
