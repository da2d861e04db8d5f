// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster round-trip rotation.
//
// The page is rendered, the raster turned with the lossless quarter-turn
// operations of the `image` crate, and the result embedded as the whole
// content of a fresh page sized to the turned raster. Page-level `/Rotate`
// metadata is never consulted or written, so the output always shows what the
// classifier saw, corrected.

use image::DynamicImage;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::Rotation;
use tracing::{debug, instrument, warn};

use crate::raster::{DocumentEngine, RasterDocument};

/// Turn `raster` clockwise by `rotation`.
pub fn turn(raster: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => raster,
        Rotation::Cw90 => raster.rotate90(),
        Rotation::Cw180 => raster.rotate180(),
        Rotation::Cw270 => raster.rotate270(),
    }
}

/// Build a rotated copy of the single-page document `page`.
#[instrument(skip(engine, page), fields(rotation = %rotation, dpi))]
pub fn try_rotate<E: DocumentEngine>(
    engine: &E,
    page: &E::Document,
    rotation: Rotation,
    dpi: u32,
) -> Result<E::Document> {
    let raster = page
        .render_page(0, dpi)
        .map_err(|err| PagewerkError::Rotation(format!("cannot rasterize page: {err}")))?;
    let turned = turn(raster, rotation);
    debug!(
        width = turned.width(),
        height = turned.height(),
        "Raster turned"
    );
    engine
        .from_raster(&turned, dpi)
        .map_err(|err| PagewerkError::Rotation(format!("cannot embed rotated raster: {err}")))
}

/// Rotate `page`, or hand it back untouched if the round-trip fails.
pub fn rotate_page<E: DocumentEngine>(
    engine: &E,
    page: E::Document,
    rotation: Rotation,
    dpi: u32,
) -> E::Document {
    if rotation.is_none() {
        return page;
    }
    match try_rotate(engine, &page, rotation, dpi) {
        Ok(rotated) => rotated,
        Err(err) => {
            warn!(error = %err, "Rotation failed; keeping page unrotated");
            page
        }
    }
}
