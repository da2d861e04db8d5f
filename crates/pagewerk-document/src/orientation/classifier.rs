// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Orientation and script detection (OSD) through the `tesseract` CLI.
//
// Tesseract is run in `--psm 0` mode, which only estimates orientation. Its
// report looks like:
//
//   Page number: 0
//   Orientation in degrees: 270
//   Rotate: 90
//   Orientation confidence: 4.36
//   Script: Latin
//   Script confidence: 2.18
//
// `Rotate` is the clockwise turn that brings the page upright.

use std::path::PathBuf;
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{OsdReading, Rotation};
use tracing::{debug, instrument};

/// Estimates how far a rasterized page is rotated.
///
/// Implementations may fail on malformed input; callers treat a failure as a
/// zero-confidence observation.
pub trait OrientationClassifier: Send + Sync {
    fn classify(&self, image: &DynamicImage, dpi: u32) -> Result<OsdReading>;
}

/// Classifier backed by the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractOsd {
    binary: PathBuf,
}

impl Default for TesseractOsd {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractOsd {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl OrientationClassifier for TesseractOsd {
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), dpi))]
    fn classify(&self, image: &DynamicImage, dpi: u32) -> Result<OsdReading> {
        let raster = tempfile::Builder::new()
            .prefix("pagewerk-osd-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(raster.path(), ImageFormat::Png)
            .map_err(|err| PagewerkError::Image(format!("cannot encode raster: {err}")))?;

        let output = Command::new(&self.binary)
            .arg(raster.path())
            .arg("stdout")
            .args(["--psm", "0"])
            .arg("--dpi")
            .arg(dpi.to_string())
            .output()
            .map_err(|err| {
                PagewerkError::Classification(format!(
                    "cannot run {}: {err}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            return Err(PagewerkError::Classification(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let reading = parse_osd(&String::from_utf8_lossy(&output.stdout))?;
        debug!(rotation = %reading.rotation, confidence = reading.confidence, "OSD reading");
        Ok(reading)
    }
}

/// Parse the text report printed by `tesseract --psm 0`.
pub fn parse_osd(report: &str) -> Result<OsdReading> {
    let mut rotate: Option<i32> = None;
    let mut confidence: Option<f32> = None;

    for line in report.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Rotate" => {
                rotate = Some(value.parse().map_err(|_| {
                    PagewerkError::Classification(format!("unreadable Rotate value `{value}`"))
                })?);
            }
            "Orientation confidence" => {
                confidence = Some(value.parse().map_err(|_| {
                    PagewerkError::Classification(format!(
                        "unreadable orientation confidence `{value}`"
                    ))
                })?);
            }
            _ => {}
        }
    }

    let degrees = rotate
        .ok_or_else(|| PagewerkError::Classification("OSD report has no Rotate line".into()))?;
    let rotation = Rotation::from_degrees(degrees).ok_or_else(|| {
        PagewerkError::Classification(format!("OSD angle {degrees} is not a right angle"))
    })?;

    Ok(OsdReading {
        rotation,
        confidence: confidence.unwrap_or(0.0),
    })
}
