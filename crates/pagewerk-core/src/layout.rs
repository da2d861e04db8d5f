// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output layout: where the single-page files of a source document land and
// what they are called. Names are deterministic so a reprocessed document
// overwrites its earlier output instead of duplicating it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PagewerkError;
use crate::types::SourceDocument;

const OUTPUT_EXTENSION: &str = "pdf";

/// Directory policy for output pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// One bucket per top-level folder under the watch root. Deeper folders
    /// are folded into the file name.
    #[default]
    Flatten,
    /// Mirror the full relative folder and add one folder per document.
    PerDocument,
}

impl std::str::FromStr for OutputLayout {
    type Err = PagewerkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flatten" => Ok(Self::Flatten),
            "per-document" | "per_document" => Ok(Self::PerDocument),
            other => Err(PagewerkError::Config(format!(
                "unknown output layout `{other}` (expected `flatten` or `per-document`)"
            ))),
        }
    }
}

impl OutputLayout {
    /// Directory that receives every page of `source`.
    pub fn directory(self, output_root: &Path, source: &SourceDocument) -> PathBuf {
        let segments = source.parent_segments();
        match self {
            Self::Flatten => match segments.first() {
                Some(first) => output_root.join(first),
                None => output_root.to_path_buf(),
            },
            Self::PerDocument => {
                let mut dir = output_root.to_path_buf();
                dir.extend(&segments);
                dir.join(source.stem())
            }
        }
    }

    /// File name for page `number` (1-based).
    pub fn page_file_name(self, source: &SourceDocument, number: usize) -> String {
        format!("{}.{OUTPUT_EXTENSION}", self.base_name(source, number))
    }

    /// File name for the unrotated fallback copy of page `number`.
    pub fn backup_file_name(self, source: &SourceDocument, number: usize) -> String {
        format!("{}_backup.{OUTPUT_EXTENSION}", self.base_name(source, number))
    }

    fn base_name(self, source: &SourceDocument, number: usize) -> String {
        let stem = source.stem();
        let rest = match self {
            Self::Flatten => source
                .parent_segments()
                .into_iter()
                .skip(1)
                .collect::<Vec<_>>()
                .join("_"),
            Self::PerDocument => String::new(),
        };
        if rest.is_empty() {
            format!("{stem} - page_{number}")
        } else {
            format!("{rest} - {stem} - page_{number}")
        }
    }
}
