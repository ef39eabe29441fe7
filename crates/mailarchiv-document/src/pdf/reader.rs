// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — inspect existing PDF documents using the `lopdf` crate:
// page count, page sizes and link annotations.

use lopdf::{Dictionary, Document, Object, ObjectId};
use mailarchiv_core::error::{ArchiveError, Result};
use tracing::{debug, instrument};

/// Upper bound when walking `/Parent` chains, so a cyclic page tree
/// cannot loop forever.
const MAX_TREE_DEPTH: usize = 64;

/// Whether the bytes start like a PDF file. Leading junk before the header is
/// tolerated the way viewers tolerate it.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

/// Read-only view of an existing PDF.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ArchiveError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().into_values().collect()
    }

    /// `(width, height)` in points of every page, in page order.
    pub fn page_sizes(&self) -> Vec<(f32, f32)> {
        self.page_ids()
            .into_iter()
            .map(|id| {
                self.document
                    .get_dictionary(id)
                    .ok()
                    .and_then(|page| inherited(&self.document, page, b"MediaBox"))
                    .and_then(|bbox| media_box_size(&self.document, bbox))
                    .unwrap_or((0.0, 0.0))
            })
            .collect()
    }

    /// Number of `/Link` annotations across all pages.
    pub fn link_count(&self) -> usize {
        self.links().count()
    }

    /// Targets of all URI link annotations, in page order.
    pub fn link_uris(&self) -> Vec<String> {
        self.links()
            .filter_map(|annot| {
                let action = annot.get(b"A").ok()?;
                let action = resolve(&self.document, action)?.as_dict().ok()?;
                match action.get(b"URI").ok()? {
                    Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                }
            })
            .collect()
    }

    fn links(&self) -> impl Iterator<Item = &Dictionary> + '_ {
        self.page_ids().into_iter().flat_map(move |id| {
            let annots: Vec<&Dictionary> = self
                .document
                .get_dictionary(id)
                .ok()
                .and_then(|page| page.get(b"Annots").ok())
                .and_then(|annots| resolve(&self.document, annots))
                .and_then(|annots| annots.as_array().ok())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| resolve(&self.document, item)?.as_dict().ok())
                        .filter(|dict| {
                            matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Link")
                        })
                        .collect()
                })
                .unwrap_or_default();
            annots
        })
    }
}

/// Follow one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, falling back to the page tree ancestors
/// (`/Resources`, `/MediaBox`, `/CropBox` and `/Rotate` are inheritable).
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve(doc, parent)?.as_dict().ok()?;
    }
    None
}

fn media_box_size(doc: &Document, bbox: &Object) -> Option<(f32, f32)> {
    let values = resolve(doc, bbox)?.as_array().ok()?;
    let nums: Vec<f32> = values.iter().filter_map(|v| v.as_float().ok()).collect();
    match nums.as_slice() {
        [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::PdfWriter;
    use mailarchiv_core::PaperSize;

    #[test]
    fn sniffs_pdf_header() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(looks_like_pdf(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04 zip"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = PdfReader::from_bytes(b"hello").err().unwrap();
        assert!(matches!(err, ArchiveError::PdfError(_)));
    }

    #[test]
    fn reports_page_size() {
        let pdf = PdfWriter::new(PaperSize::A5).create_from_text("x").unwrap();
        let sizes = PdfReader::from_bytes(&pdf).unwrap().page_sizes();
        assert_eq!(sizes.len(), 1);
        assert!((sizes[0].0 - 419.5).abs() < 1.0, "width {}", sizes[0].0);
    }

    #[test]
    fn text_urls_are_counted_as_links() {
        let pdf = PdfWriter::a4()
            .create_from_text("one https://a.example\ntwo https://b.example")
            .unwrap();
        let reader = PdfReader::from_bytes(&pdf).unwrap();
        assert_eq!(reader.link_count(), 2);
        assert_eq!(
            reader.link_uris(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
