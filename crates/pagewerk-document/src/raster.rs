// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterization engine seam. The page processor only ever talks to these two
// traits, so the PDF backend can be swapped (or faked in tests).

use std::path::Path;

use image::DynamicImage;
use pagewerk_core::error::Result;

/// An open document that can be split, rasterized, and saved.
pub trait RasterDocument: Sized + Send {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Render page `index` (zero-based) at `dpi`.
    fn render_page(&self, index: usize, dpi: u32) -> Result<DynamicImage>;

    /// Copy page `index` (zero-based) into a new single-page document.
    fn extract_page(&self, index: usize) -> Result<Self>;

    /// Write the document to `path`, replacing any existing file.
    fn save(&mut self, path: &Path) -> Result<()>;
}

/// Opens documents and composes new ones from rasters.
pub trait DocumentEngine: Send + Sync {
    type Document: RasterDocument;

    /// Open the document at `path`.
    fn open(&self, path: &Path) -> Result<Self::Document>;

    /// Build a single-page document whose entire content is `image`, with the
    /// page sized to the image at `dpi`.
    fn from_raster(&self, image: &DynamicImage, dpi: u32) -> Result<Self::Document>;
}
