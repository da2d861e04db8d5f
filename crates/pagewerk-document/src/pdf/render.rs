// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization through poppler's `pdftoppm`.
//
// The PDF is written to a scratch directory, one page is rendered to PNG at the
// requested resolution, and the PNG is decoded with the `image` crate. The
// scratch directory is removed when the call returns.

use std::path::PathBuf;
use std::process::Command;

use image::DynamicImage;
use pagewerk_core::error::{PagewerkError, Result};
use tracing::{debug, instrument};

/// Handle on the `pdftoppm` executable.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    binary: PathBuf,
}

impl Default for Pdftoppm {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl Pdftoppm {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Render page `page_number` (1-based) of `pdf` at `dpi`.
    #[instrument(skip(self, pdf), fields(bytes_len = pdf.len()))]
    pub fn render(&self, pdf: &[u8], page_number: usize, dpi: u32) -> Result<DynamicImage> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("page.pdf");
        let prefix = scratch.path().join("raster");
        std::fs::write(&input, pdf)?;

        let page = page_number.to_string();
        let output = Command::new(&self.binary)
            .arg("-r")
            .arg(dpi.to_string())
            .args(["-f", &page, "-l", &page])
            .args(["-png", "-singlefile"])
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|err| {
                PagewerkError::Render(format!("cannot run {}: {err}", self.binary.display()))
            })?;

        if !output.status.success() {
            return Err(PagewerkError::Render(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let png = prefix.with_extension("png");
        let raster = image::open(&png).map_err(|err| {
            PagewerkError::Image(format!("cannot decode {}: {err}", png.display()))
        })?;

        debug!(
            width = raster.width(),
            height = raster.height(),
            dpi,
            "Page rasterized"
        );
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_render_error() {
        let renderer = Pdftoppm::new("/nonexistent/bin/pdftoppm");
        let result = renderer.render(b"%PDF-1.5", 1, 72);
        assert!(matches!(result, Err(PagewerkError::Render(_))));
    }
}
