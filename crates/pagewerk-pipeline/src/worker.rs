// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker side of the process pool.
//
// A worker process reads one `WorkerRequest` JSON object per line from stdin,
// processes the document, and answers with one `WorkerResponse` line on
// stdout. Logs go to stderr so they never corrupt the protocol stream. The
// loop ends when the parent closes stdin.

use std::sync::Arc;

use pagewerk_core::PipelineConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{DocumentOutcome, DocumentReport, WorkerRequest, WorkerResponse};
use pagewerk_document::{PageProcessor, ProcessDocument};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument};

use crate::error_log::ErrorLog;

/// Map a processing result to the outcome reported to the dispatcher.
pub fn outcome_of(result: Result<DocumentReport>) -> DocumentOutcome {
    match result {
        Ok(report) => DocumentOutcome::Completed(report),
        Err(err) => DocumentOutcome::Failed {
            message: format!("Processing error: {err}"),
        },
    }
}

/// Process one document on the blocking pool.
///
/// A panic inside the processor becomes a failed outcome instead of taking the
/// caller down with it.
pub async fn process_blocking(
    processor: Arc<dyn ProcessDocument>,
    request: &WorkerRequest,
) -> DocumentOutcome {
    let source = request.source.clone();
    let result = tokio::task::spawn_blocking(move || processor.process(&source))
        .await
        .unwrap_or_else(|err| Err(PagewerkError::Worker(format!("processing panicked: {err}"))));
    outcome_of(result)
}

/// Serve requests from `input` until it reaches end of file.
pub async fn serve<R, W>(processor: Arc<dyn ProcessDocument>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line)?;
        debug!(job_id = %request.job_id, source = %request.source.display(), "Request received");

        let outcome = process_blocking(processor.clone(), &request).await;
        let response = WorkerResponse {
            job_id: request.job_id,
            outcome,
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
    }
    Ok(())
}

/// Entry point of a `pagewerk worker` process.
#[instrument(skip_all, fields(pid = std::process::id()))]
pub async fn run_worker(config: PipelineConfig) -> Result<()> {
    let error_log = Arc::new(ErrorLog::open(&config.error_log_path)?);
    let processor: Arc<dyn ProcessDocument> =
        Arc::new(PageProcessor::from_config(&config, error_log));

    info!("Worker ready");
    serve(processor, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("Worker input closed; exiting");
    Ok(())
}
