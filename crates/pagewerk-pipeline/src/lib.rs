// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-pipeline: folder intake, job queue, and isolated worker pool.
//
// Provides the readiness gate, the idempotency ledger, the error log,
// progress accounting, the job queue and dispatcher, the process-isolated
// worker pool (and the worker-side serve loop), the ingestion watcher, and
// the shutdown coordinator.

pub mod error_log;
pub mod ledger;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod readiness;
pub mod service;
pub mod shutdown;
pub mod watcher;
pub mod worker;

pub use error_log::ErrorLog;
pub use ledger::Ledger;
pub use pool::{
    ExecutionUnit, InProcessExecutor, JobExecutor, PoolTerminator, ProcessExecutor, WorkerPool,
};
pub use progress::Progress;
pub use readiness::ReadinessGate;
pub use service::{Pipeline, RunMode, RunningPipeline};
pub use watcher::{FolderWatcher, Intake};
pub use worker::run_worker;
