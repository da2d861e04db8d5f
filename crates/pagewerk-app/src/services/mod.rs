// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: process-wide setup the binary does before handing control to
// the pipeline crate.

pub mod executor;
pub mod logging;
