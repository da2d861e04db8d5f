// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The production document engine: lopdf documents rendered through pdftoppm.

use std::path::Path;

use image::DynamicImage;
use pagewerk_core::error::Result;

use super::reader::PdfDocument;
use super::render::Pdftoppm;
use super::writer;
use crate::raster::DocumentEngine;

/// Opens PDFs from disk and builds raster-only pages.
#[derive(Debug, Clone, Default)]
pub struct PdfEngine {
    renderer: Pdftoppm,
}

impl PdfEngine {
    pub fn new(renderer: Pdftoppm) -> Self {
        Self { renderer }
    }
}

impl DocumentEngine for PdfEngine {
    type Document = PdfDocument;

    fn open(&self, path: &Path) -> Result<PdfDocument> {
        PdfDocument::open(path, self.renderer.clone())
    }

    fn from_raster(&self, image: &DynamicImage, dpi: u32) -> Result<PdfDocument> {
        let bytes = writer::raster_page(image, dpi, "Pagewerk page")?;
        PdfDocument::from_bytes(&bytes, self.renderer.clone())
    }
}
