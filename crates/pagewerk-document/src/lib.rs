// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-document: per-document processing for the Pagewerk pipeline.
//
// Splits a source PDF into single pages, infers each page's orientation with an
// escalating-resolution OCR protocol, rotates pages through a raster round-trip
// when needed, and writes deterministic single-page outputs.

pub mod failures;
pub mod orientation;
pub mod pdf;
pub mod processor;
pub mod raster;
pub mod rotate;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export the primary structs so callers can use `pagewerk_document::PageProcessor` etc.
pub use failures::{DiscardFailures, FailureSink};
pub use orientation::classifier::{OrientationClassifier, TesseractOsd};
pub use orientation::detector::{DetectorSettings, OrientationDetector};
pub use pdf::engine::PdfEngine;
pub use processor::{PageProcessor, ProcessDocument};
pub use raster::{DocumentEngine, RasterDocument};
