// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// URI link annotations, written into generated pages with lopdf.

use lopdf::{Document, Object, ObjectId, dictionary};
use mailarchiv_core::error::{ArchiveError, Result};
use tracing::debug;

/// A clickable rectangle on one page, in PDF user space (points, origin
/// bottom-left). `page` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub page: usize,
    pub rect: [f32; 4],
    pub uri: String,
}

/// Attach `/Link` annotations with `/URI` actions to the given pages.
pub fn add_link_annotations(pdf: &[u8], links: &[PageLink]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(pdf)
        .map_err(|err| ArchiveError::PdfError(format!("failed to reload page for links: {err}")))?;
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for link in links {
        let page_id = *pages.get(link.page).ok_or_else(|| {
            ArchiveError::PdfError(format!(
                "link targets page {} of a {} page document",
                link.page + 1,
                pages.len()
            ))
        })?;

        let annotation = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => link.rect.iter().map(|v| Object::Real(*v)).collect::<Vec<Object>>(),
            "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            "A" => dictionary! {
                "S" => "URI",
                "URI" => Object::string_literal(link.uri.as_str()),
            },
        };
        let annotation_id = doc.add_object(annotation);

        let page = doc
            .get_dictionary_mut(page_id)
            .map_err(|err| ArchiveError::PdfError(format!("page dictionary missing: {err}")))?;
        let has_annots = matches!(page.get(b"Annots"), Ok(Object::Array(_)));
        if has_annots {
            if let Ok(Object::Array(annots)) = page.get_mut(b"Annots") {
                annots.push(Object::Reference(annotation_id));
            }
        } else {
            page.set("Annots", vec![Object::Reference(annotation_id)]);
        }
    }

    debug!(links = links.len(), "Link annotations added");

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| ArchiveError::PdfError(format!("failed to serialise linked PDF: {err}")))?;
    Ok(output)
}
