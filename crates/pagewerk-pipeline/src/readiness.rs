// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Readiness gate: a discovered file only enters the pipeline once it can be
// opened and read. Files still being copied into the watch folder fail the
// probe and are retried after a fixed delay.

use std::path::Path;
use std::time::{Duration, Instant};

use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Fixed-delay probe-and-retry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessGate {
    /// Number of probes before giving up.
    pub attempts: u32,
    pub delay: Duration,
}

impl ReadinessGate {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.ready_retries, config.ready_delay)
    }

    /// Wait until `path` can be opened and read.
    ///
    /// Sleeps only the calling task. Gives up with [`PagewerkError::NotReady`].
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn wait_ready(&self, path: &Path) -> Result<()> {
        let started = Instant::now();
        for attempt in 1..=self.attempts {
            match probe(path).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(attempt, "File became ready");
                    }
                    return Ok(());
                }
                Err(err) => {
                    debug!(attempt, error = %err, "File not ready");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
        Err(PagewerkError::NotReady {
            path: path.to_path_buf(),
            waited: started.elapsed(),
        })
    }
}

async fn probe(path: &Path) -> std::io::Result<()> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut byte = [0u8; 1];
    file.read(&mut byte).await?;
    Ok(())
}
