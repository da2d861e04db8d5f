// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Choice of job executor for the worker pool.

use std::sync::Arc;

use pagewerk_core::error::Result;
use pagewerk_core::WorkerMode;
use pagewerk_document::{PageProcessor, ProcessDocument};
use pagewerk_pipeline::{InProcessExecutor, JobExecutor, Pipeline, ProcessExecutor};
use tracing::info;

/// Build the executor for `pipeline` according to its worker mode.
///
/// Process mode re-executes this binary with the hidden `worker` subcommand,
/// so the children run exactly the code the parent was built from.
pub fn build(pipeline: &Pipeline) -> Result<Arc<dyn JobExecutor>> {
    let config = pipeline.config();
    match config.worker_mode {
        WorkerMode::Process => {
            let program = std::env::current_exe()?;
            info!(program = %program.display(), "Using isolated worker processes");
            Ok(Arc::new(ProcessExecutor::for_worker(program, config)?))
        }
        WorkerMode::InProcess => {
            info!("Using in-process workers");
            let processor: Arc<dyn ProcessDocument> = Arc::new(PageProcessor::from_config(
                config,
                pipeline.error_log().clone(),
            ));
            Ok(Arc::new(InProcessExecutor::new(processor)))
        }
    }
}
