// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Orientation: the OSD classifier seam and the escalating-confidence detector
// built on top of it.

pub mod classifier;
pub mod detector;

pub use classifier::{OrientationClassifier, TesseractOsd};
pub use detector::{DetectorSettings, OrientationDetector};
