// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagewerk-core: core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use config::{PipelineConfig, WorkerMode};
pub use error::{ErrorScope, PagewerkError};
pub use layout::OutputLayout;
pub use types::*;
