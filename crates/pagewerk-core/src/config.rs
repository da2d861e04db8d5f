// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration, read from the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PagewerkError, Result};
use crate::layout::OutputLayout;

/// How document jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMode {
    /// One child process per pool slot. A crash only loses the current job.
    #[default]
    Process,
    /// Blocking threads inside the service process.
    InProcess,
}

impl std::str::FromStr for WorkerMode {
    type Err = PagewerkError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "in-process" | "inprocess" | "thread" => Ok(Self::InProcess),
            other => Err(PagewerkError::Config(format!(
                "unknown worker mode `{other}` (expected `process` or `in-process`)"
            ))),
        }
    }
}

/// Settings for the whole ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Folder tree watched for new documents.
    pub watch_root: PathBuf,
    /// Folder receiving the single-page outputs.
    pub output_root: PathBuf,
    /// Newline-delimited list of completed source paths.
    pub ledger_path: PathBuf,
    /// Newline-delimited `timestamp - path - message` records.
    pub error_log_path: PathBuf,
    /// Optional copy of every warning-or-worse log line.
    pub warnings_log_path: Option<PathBuf>,
    /// Extension (without dot) of documents to pick up, matched case-insensitively.
    pub extension: String,
    /// Upper bound on concurrently processed documents.
    pub max_workers: usize,
    /// Capacity of the pool's internal backlog before submission blocks.
    pub queue_backlog: usize,
    /// Readiness probe attempts before a file is abandoned.
    pub ready_retries: u32,
    /// Pause between readiness probes.
    pub ready_delay: Duration,
    /// Clear the ledger at startup.
    pub reset_ledger: bool,
    /// Rasterization resolution of the first orientation trial.
    pub base_dpi: u32,
    /// Resolution added after each inconclusive trial.
    pub dpi_step: u32,
    /// Classifier confidence accepted without escalation.
    pub confidence_threshold: f32,
    /// Orientation trials before settling for the last observation.
    pub max_trials: u32,
    /// Resolution of the raster used to build rotated pages.
    pub rotate_dpi: u32,
    pub output_layout: OutputLayout,
    pub worker_mode: WorkerMode,
    /// `pdftoppm` executable used for rasterization.
    pub pdftoppm_bin: PathBuf,
    /// `tesseract` executable used for orientation detection.
    pub tesseract_bin: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::from("./input"),
            output_root: PathBuf::from("./output"),
            ledger_path: PathBuf::from("./processed_files.txt"),
            error_log_path: PathBuf::from("./error_log.txt"),
            warnings_log_path: Some(PathBuf::from("./warnings_log.txt")),
            extension: "pdf".into(),
            max_workers: 4,
            queue_backlog: 256,
            ready_retries: 10,
            ready_delay: Duration::from_secs(1),
            reset_ledger: false,
            base_dpi: 200,
            dpi_step: 100,
            confidence_threshold: 2.0,
            max_trials: 3,
            rotate_dpi: 150,
            output_layout: OutputLayout::Flatten,
            worker_mode: WorkerMode::Process,
            pdftoppm_bin: PathBuf::from("pdftoppm"),
            tesseract_bin: PathBuf::from("tesseract"),
        }
    }
}

impl PipelineConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Unset or blank variables keep their defaults. Paths are made absolute.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("WATCH_FOLDER") {
            config.watch_root = PathBuf::from(v);
        }
        if let Some(v) = get("OUTPUT_FOLDER") {
            config.output_root = PathBuf::from(v);
        }
        if let Some(v) = get("PROCESSED_FILE_PATH") {
            config.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = get("ERROR_LOG_PATH") {
            config.error_log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARNINGS_LOG_PATH") {
            let v = v.trim();
            config.warnings_log_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = get("PAGEWERK_EXTENSION") {
            config.extension = v.trim_start_matches('.').to_ascii_lowercase();
        }
        if let Some(v) = get("MAX_WORKERS") {
            config.max_workers = parse_number("MAX_WORKERS", &v)?;
        }
        if let Some(v) = get("PAGEWERK_QUEUE_BACKLOG") {
            config.queue_backlog = parse_number("PAGEWERK_QUEUE_BACKLOG", &v)?;
        }
        if let Some(v) = get("FILE_READY_RETRIES") {
            config.ready_retries = parse_number("FILE_READY_RETRIES", &v)?;
        }
        if let Some(v) = get("FILE_READY_DELAY") {
            let secs: f64 = parse_number("FILE_READY_DELAY", &v)?;
            config.ready_delay = Duration::try_from_secs_f64(secs).map_err(|err| {
                PagewerkError::Config(format!("FILE_READY_DELAY `{v}`: {err}"))
            })?;
        }
        if let Some(v) = get("RESET_PROGRESS") {
            config.reset_ledger = parse_bool(&v).ok_or_else(|| {
                PagewerkError::Config(format!("RESET_PROGRESS `{v}` is not a boolean"))
            })?;
        }
        if let Some(v) = get("PAGEWERK_BASE_DPI") {
            config.base_dpi = parse_number("PAGEWERK_BASE_DPI", &v)?;
        }
        if let Some(v) = get("PAGEWERK_DPI_STEP") {
            config.dpi_step = parse_number("PAGEWERK_DPI_STEP", &v)?;
        }
        if let Some(v) = get("PAGEWERK_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = parse_number("PAGEWERK_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("PAGEWERK_MAX_TRIALS") {
            config.max_trials = parse_number("PAGEWERK_MAX_TRIALS", &v)?;
        }
        if let Some(v) = get("PAGEWERK_ROTATE_DPI") {
            config.rotate_dpi = parse_number("PAGEWERK_ROTATE_DPI", &v)?;
        }
        if let Some(v) = get("PAGEWERK_OUTPUT_LAYOUT") {
            config.output_layout = v.parse()?;
        }
        if let Some(v) = get("PAGEWERK_WORKER_MODE") {
            config.worker_mode = v.parse()?;
        }
        if let Some(v) = get("PAGEWERK_PDFTOPPM") {
            config.pdftoppm_bin = PathBuf::from(v);
        }
        if let Some(v) = get("PAGEWERK_TESSERACT") {
            config.tesseract_bin = PathBuf::from(v);
        }

        config.absolutize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(PagewerkError::Config("MAX_WORKERS must be at least 1".into()));
        }
        if self.queue_backlog == 0 {
            return Err(PagewerkError::Config(
                "PAGEWERK_QUEUE_BACKLOG must be at least 1".into(),
            ));
        }
        if self.max_trials == 0 {
            return Err(PagewerkError::Config(
                "PAGEWERK_MAX_TRIALS must be at least 1".into(),
            ));
        }
        if !self.confidence_threshold.is_finite() {
            return Err(PagewerkError::Config(
                "PAGEWERK_CONFIDENCE_THRESHOLD must be a finite number".into(),
            ));
        }
        if self.base_dpi == 0 || self.rotate_dpi == 0 {
            return Err(PagewerkError::Config("resolutions must be positive".into()));
        }
        if self.extension.is_empty() {
            return Err(PagewerkError::Config("PAGEWERK_EXTENSION is empty".into()));
        }
        Ok(())
    }

    /// Whether `path` carries the configured document extension.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn absolutize(&mut self) -> Result<()> {
        self.watch_root = std::path::absolute(&self.watch_root)?;
        self.output_root = std::path::absolute(&self.output_root)?;
        self.ledger_path = std::path::absolute(&self.ledger_path)?;
        self.error_log_path = std::path::absolute(&self.error_log_path)?;
        if let Some(path) = self.warnings_log_path.take() {
            self.warnings_log_path = Some(std::path::absolute(path)?);
        }
        Ok(())
    }
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err| PagewerkError::Config(format!("{name} `{raw}`: {err}")))
}

/// Parse a boolean value, accepting common env-style forms.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
