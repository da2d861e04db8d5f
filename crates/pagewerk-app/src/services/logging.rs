// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tracing subscriber setup.
//
// Everything goes to stderr under `RUST_LOG` (default `info`). When a warnings
// file is configured, WARN and above are appended there as well.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Install the global subscriber.
///
/// A warnings file that cannot be opened is reported on stderr and skipped;
/// it never stops the service from starting.
pub fn init(warnings_log: Option<&Path>) {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let mut open_error = None;
    let warnings = warnings_log.and_then(|path| match open_append(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::WARN),
        ),
        Err(err) => {
            open_error = Some((path.to_path_buf(), err));
            None
        }
    });

    tracing_subscriber::registry()
        .with(console)
        .with(warnings)
        .init();

    if let Some((path, err)) = open_error {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "Cannot open warnings log; warnings go to stderr only"
        );
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
