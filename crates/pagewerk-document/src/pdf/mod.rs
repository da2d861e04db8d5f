// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF backend: lopdf for structure, pdftoppm for rasters, printpdf for
// composing raster-only pages.

pub mod engine;
pub mod reader;
pub mod render;
pub mod writer;

pub use engine::PdfEngine;
pub use reader::PdfDocument;
pub use render::Pdftoppm;
