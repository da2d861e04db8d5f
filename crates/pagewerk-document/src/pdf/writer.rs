// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer. Composes a single page whose whole content is one raster image,
// using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use image::DynamicImage;
use pagewerk_core::error::{PagewerkError, Result};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, instrument};

const MM_PER_INCH: f32 = 25.4;

/// Build a one-page PDF sized exactly to `image` rendered at `dpi`.
///
/// The image fills the page edge to edge; no margins, no scaling.
#[instrument(skip(image), fields(width = image.width(), height = image.height(), dpi))]
pub fn raster_page(image: &DynamicImage, dpi: u32, title: &str) -> Result<Vec<u8>> {
    if dpi == 0 || image.width() == 0 || image.height() == 0 {
        return Err(PagewerkError::Image(format!(
            "cannot place a {}x{} raster at {dpi} dpi",
            image.width(),
            image.height()
        )));
    }

    let dpi_f = dpi as f32;
    let page_w = Mm(image.width() as f32 / dpi_f * MM_PER_INCH);
    let page_h = Mm(image.height() as f32 / dpi_f * MM_PER_INCH);

    // Convert to RGB8 for printpdf.
    let rgb = image.to_rgb8();
    let raw = RawImage {
        pixels: RawImageData::U8(rgb.into_raw()),
        width: image.width() as usize,
        height: image.height() as usize,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    };

    let mut doc = PdfDocument::new(title);
    let xobject_id = doc.add_image(&raw);

    let ops = vec![Op::UseXobject {
        id: xobject_id,
        transform: XObjectTransform {
            translate_x: Some(Pt(0.0)),
            translate_y: Some(Pt(0.0)),
            scale_x: None,
            scale_y: None,
            dpi: Some(dpi_f),
            rotate: None,
        },
    }];

    doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

    debug!(
        page_w_mm = page_w.0,
        page_h_mm = page_h.0,
        warnings = warnings.len(),
        "Raster page composed"
    );
    Ok(output)
}
