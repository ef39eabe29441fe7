// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Order-preserving merge of independently produced PDFs.
//
// Every page of every source is deep-cloned into a fresh document, sources in
// the given order and pages in their own order. Shared objects (fonts, images)
// are cloned once per source, and annotations pointing back at their page
// keep pointing at the clone, so link annotations survive the merge.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use mailarchiv_core::error::{ArchiveError, Result};
use tracing::{debug, info, instrument, warn};

use super::reader::inherited;

/// Page attributes a page may inherit from its ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Deepest object nesting a source may have. Real documents stay far below;
/// deeper graphs are treated as hostile rather than risking the stack.
const MAX_NESTING: usize = 512;

/// Concatenate `sources` into one PDF.
///
/// Fails if any source cannot be parsed or has no pages; callers are expected
/// to have validated converter output (see [`check_mergeable`]) before merging.
#[instrument(skip_all, fields(sources = sources.len()))]
pub fn merge_documents(sources: &[&[u8]]) -> Result<Vec<u8>> {
    if sources.is_empty() {
        return Err(ArchiveError::PdfError("nothing to merge".into()));
    }

    let mut merged = Merged::new();
    for (index, bytes) in sources.iter().enumerate() {
        let pages = merged.append(index, bytes)?;
        debug!(source = index, pages, "Source pages cloned");
    }
    let mut target = merged.finish();

    let mut output = Vec::new();
    target
        .save_to(&mut output)
        .map_err(|err| ArchiveError::PdfError(format!("failed to serialise merged PDF: {err}")))?;

    info!(output_bytes = output.len(), "Merge complete");
    Ok(output)
}

/// Clone `bytes` into a scratch document the way [`merge_documents`] would,
/// returning its page count. A source that passes here cannot fail the merge.
pub fn check_mergeable(bytes: &[u8]) -> Result<usize> {
    Merged::new().append(0, bytes)
}

/// Target document under construction and the page references collected so far.
struct Merged {
    target: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Merged {
    fn new() -> Self {
        let mut target = Document::with_version("1.7");
        let pages_id = target.new_object_id();
        Self {
            target,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn append(&mut self, index: usize, bytes: &[u8]) -> Result<usize> {
        let source = Document::load_mem(bytes).map_err(|err| {
            ArchiveError::PdfError(format!("failed to load PDF #{}: {err}", index + 1))
        })?;
        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(ArchiveError::PdfError(format!(
                "PDF #{} has no pages",
                index + 1
            )));
        }

        let mut cloner = PageCloner::new(&source);
        // Reserve page ids up front so references to a later page resolve
        // to its clone instead of a stray copy.
        for &page_id in &page_ids {
            cloner.reserve(&mut self.target, page_id);
        }
        for &page_id in &page_ids {
            let new_id = cloner
                .clone_page(&mut self.target, page_id, self.pages_id)
                .map_err(|err| ArchiveError::PdfError(format!("PDF #{}: {err}", index + 1)))?;
            self.kids.push(Object::Reference(new_id));
        }
        Ok(page_ids.len())
    }

    fn finish(self) -> Document {
        let Self {
            mut target,
            pages_id,
            kids,
        } = self;
        let count = kids.len() as i64;
        target.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = target.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        target.trailer.set("Root", Object::Reference(catalog_id));
        target
    }
}

fn is_page(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Page")
}

/// Deep-clones objects from one source document, memoising every cloned
/// reference so shared and cyclic graphs are copied once.
struct PageCloner<'a> {
    source: &'a Document,
    mapped: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCloner<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            mapped: HashMap::new(),
        }
    }

    fn reserve(&mut self, target: &mut Document, source_id: ObjectId) -> ObjectId {
        *self
            .mapped
            .entry(source_id)
            .or_insert_with(|| target.new_object_id())
    }

    fn clone_page(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
        parent: ObjectId,
    ) -> std::result::Result<ObjectId, String> {
        let source = self.source;
        let page = source
            .get_dictionary(page_id)
            .map_err(|err| format!("cannot read page object {page_id:?}: {err}"))?;

        let mut cloned = self.clone_dictionary(target, page, 0)?;
        for key in INHERITABLE {
            if cloned.has(key) {
                continue;
            }
            if let Some(value) = inherited(source, page, key) {
                let value = self.clone_value(target, value, 0)?;
                cloned.set(key.to_vec(), value);
            }
        }
        cloned.set("Parent", Object::Reference(parent));

        let new_id = self.reserve(target, page_id);
        target.objects.insert(new_id, Object::Dictionary(cloned));
        Ok(new_id)
    }

    /// A page's `/Parent` is dropped; the page tree is rebuilt by the caller.
    /// Other dictionaries (form fields, popups) keep theirs.
    fn clone_dictionary(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
        depth: usize,
    ) -> std::result::Result<Dictionary, String> {
        let page = is_page(dict);
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            if page && key == b"Parent" {
                continue;
            }
            let value = self.clone_value(target, value, depth + 1)?;
            out.set(key.clone(), value);
        }
        Ok(out)
    }

    fn clone_value(
        &mut self,
        target: &mut Document,
        object: &Object,
        depth: usize,
    ) -> std::result::Result<Object, String> {
        if depth > MAX_NESTING {
            return Err(format!("objects nested deeper than {MAX_NESTING} levels"));
        }
        let cloned = match object {
            Object::Reference(id) => {
                if let Some(mapped) = self.mapped.get(id) {
                    return Ok(Object::Reference(*mapped));
                }
                let source = self.source;
                match source.get_object(*id) {
                    Ok(referenced) => {
                        let new_id = self.reserve(target, *id);
                        let cloned = self.clone_value(target, referenced, depth + 1)?;
                        target.objects.insert(new_id, cloned);
                        Object::Reference(new_id)
                    }
                    Err(err) => {
                        warn!(?id, %err, "Cannot resolve reference, using Null");
                        Object::Null
                    }
                }
            }
            Object::Dictionary(dict) => {
                Object::Dictionary(self.clone_dictionary(target, dict, depth)?)
            }
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_value(target, item, depth + 1))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Object::Stream(stream) => {
                let mut cloned = stream.clone();
                cloned.dict = self.clone_dictionary(target, &stream.dict, depth)?;
                Object::Stream(cloned)
            }
            other => other.clone(),
        };
        Ok(cloned)
    }
}
