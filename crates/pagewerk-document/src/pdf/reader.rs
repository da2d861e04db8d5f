// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF document: open, inspect, split into single pages, and save existing PDF
// documents using the `lopdf` crate.

use std::path::Path;

use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pagewerk_core::error::{PagewerkError, Result};
use tracing::{debug, instrument};

use super::render::Pdftoppm;
use crate::raster::RasterDocument;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// An open PDF document.
///
/// Wraps `lopdf::Document` and renders pages through an external `pdftoppm`.
pub struct PdfDocument {
    /// The underlying lopdf document.
    document: Document,
    renderer: Pdftoppm,
}

impl PdfDocument {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path, renderer: Pdftoppm) -> Result<Self> {
        let document = Document::load(path).map_err(|err| PagewerkError::DocumentOpen {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            renderer,
        })
    }

    /// Create a document from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8], renderer: Pdftoppm) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| PagewerkError::Pdf(format!("failed to load PDF from memory: {err}")))?;

        Ok(Self {
            document,
            renderer,
        })
    }

    /// Serialise the document to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut document = self.document.clone();
        let mut output = Vec::new();
        document
            .save_to(&mut output)
            .map_err(|err| PagewerkError::Pdf(format!("failed to serialise PDF: {err}")))?;
        Ok(output)
    }

    fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        let number = u32::try_from(index + 1)
            .map_err(|_| PagewerkError::Pdf(format!("page index {index} out of range")))?;
        pages.get(&number).copied().ok_or_else(|| {
            PagewerkError::Pdf(format!(
                "page {} out of range (document has {} pages)",
                index + 1,
                pages.len()
            ))
        })
    }
}

impl RasterDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    fn render_page(&self, index: usize, dpi: u32) -> Result<DynamicImage> {
        self.page_id(index)?;
        let bytes = self.to_bytes()?;
        self.renderer.render(&bytes, index + 1, dpi)
    }

    /// The copy keeps object ids from the source; the page gets a fresh
    /// single-entry page tree and everything else unreachable is pruned.
    #[instrument(skip(self), fields(index))]
    fn extract_page(&self, index: usize) -> Result<Self> {
        let page_id = self.page_id(index)?;
        let mut single = self.document.clone();

        let inherited = inherited_attributes(&self.document, page_id);

        let pages_id = single.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
        ]));

        let page = single
            .get_dictionary_mut(page_id)
            .map_err(|err| {
                PagewerkError::Pdf(format!("page {} is not a dictionary: {err}", index + 1))
            })?;
        page.set("Parent", Object::Reference(pages_id));
        for (key, value) in inherited {
            page.set(key, value);
        }

        single
            .catalog_mut()
            .map_err(|err| PagewerkError::Pdf(format!("no catalog: {err}")))?
            .set("Pages", Object::Reference(pages_id));

        single.prune_objects();

        debug!(page = index + 1, objects = single.objects.len(), "Page extracted");

        Ok(Self {
            document: single,
            renderer: self.renderer.clone(),
        })
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.document.save(path).map_err(|err| PagewerkError::PageSave {
            page: 1,
            detail: format!("{}: {err}", path.display()),
        })?;
        Ok(())
    }
}

/// Collect attributes the page inherits from its ancestors but does not set
/// itself, so they survive when the page is detached from its tree.
fn inherited_attributes(document: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    let mut missing: Vec<&[u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();

    let mut parent = parent_of(page);
    // Page trees are shallow; the bound only guards against cyclic /Parent links.
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if missing.is_empty() || depth > 32 {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = parent_of(node);
        depth += 1;
    }

    found
}

fn parent_of(node: &Dictionary) -> Option<ObjectId> {
    node.get(b"Parent").and_then(Object::as_reference).ok()
}
