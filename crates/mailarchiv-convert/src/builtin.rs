// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process collaborators built on mailarchiv-document.
//
// PDF generation is CPU-bound, so every conversion runs on tokio's blocking
// pool and never stalls the runtime threads driving the other conversions.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use mailarchiv_core::error::Result as ArchiveResult;
use mailarchiv_core::{BodyKind, ConvertError, PaperSize};
use mailarchiv_document::PdfReader;
use mailarchiv_document::PdfWriter;
use mailarchiv_document::pdf::layout::{blocks_from_html, blocks_from_text};
use mailarchiv_document::pdf::reader::looks_like_pdf;
use tracing::{debug, instrument};

use crate::traits::{AttachmentConverter, BodyRenderer, ConversionRequest, RenderRequest};

async fn blocking<F>(job: F) -> Result<Vec<u8>, ConvertError>
where
    F: FnOnce() -> ArchiveResult<Vec<u8>> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ConvertError::Tool(format!("conversion task failed: {err}")))?
        .map_err(ConvertError::from)
}

fn decode_text(content: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    encoding.decode(content).0.into_owned()
}

// -- PDF ----------------------------------------------------------------------

/// Attachments that already are PDFs, by declared type or by their bytes.
pub struct PdfPassthrough;

#[async_trait]
impl AttachmentConverter for PdfPassthrough {
    fn name(&self) -> &str {
        "pdf-passthrough"
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        request.content_type == "application/pdf" || looks_like_pdf(&request.content)
    }

    #[instrument(skip_all, fields(filename = %request.filename))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        let content = request.content.clone();
        blocking(move || {
            let pages = PdfReader::from_bytes(&content)?.page_count();
            if pages == 0 {
                return Err(mailarchiv_core::ArchiveError::PdfError(
                    "PDF has no pages".into(),
                ));
            }
            debug!(pages, "PDF attachment taken as is");
            Ok(content)
        })
        .await
    }
}

// -- Images -------------------------------------------------------------------

/// Raster images, one per page, scaled to fit.
pub struct ImageConverter {
    paper: PaperSize,
}

impl ImageConverter {
    pub fn new(paper: PaperSize) -> Self {
        Self { paper }
    }
}

#[async_trait]
impl AttachmentConverter for ImageConverter {
    fn name(&self) -> &str {
        "image"
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        request.content_type.starts_with("image/") && !request.content_type.contains("svg")
    }

    #[instrument(skip_all, fields(filename = %request.filename, content_type = %request.content_type))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        let content = request.content.clone();
        let paper = self.paper;
        blocking(move || PdfWriter::new(paper).create_from_image(&content)).await
    }
}

// -- Text ---------------------------------------------------------------------

/// Text attachments: plain text keeps its layout, html is reflowed.
pub struct TextConverter {
    paper: PaperSize,
}

impl TextConverter {
    pub fn new(paper: PaperSize) -> Self {
        Self { paper }
    }
}

#[async_trait]
impl AttachmentConverter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        request.content_type.starts_with("text/")
    }

    #[instrument(skip_all, fields(filename = %request.filename, content_type = %request.content_type))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        let text = decode_text(&request.content, request.charset.as_deref());
        let is_html = request.content_type == "text/html";
        let paper = self.paper;
        let title = request.filename.clone();
        blocking(move || {
            let mut writer = PdfWriter::new(paper);
            writer.set_title(title);
            if is_html {
                writer.create_document(&[], &blocks_from_html(&text))
            } else {
                writer.create_from_text(&text)
            }
        })
        .await
    }
}

// -- Body ---------------------------------------------------------------------

/// Renders banner and body with the builtin fonts.
///
/// Html is reflowed into paragraphs with `<a href>` kept as link annotations.
/// Inline images are shown by their alt text; resources are not embedded.
#[derive(Default)]
pub struct BuiltinRenderer;

#[async_trait]
impl BodyRenderer for BuiltinRenderer {
    fn name(&self) -> &str {
        "builtin"
    }

    #[instrument(skip_all, fields(kind = ?request.kind, bytes_len = request.markup.len()))]
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, ConvertError> {
        let banner = request.banner.clone();
        let markup = request.markup.clone();
        let kind = request.kind;
        let paper = request.paper;
        blocking(move || {
            let blocks = match kind {
                BodyKind::Text => blocks_from_text(&markup),
                BodyKind::Html => blocks_from_html(&markup),
                BodyKind::None => Vec::new(),
            };
            PdfWriter::new(paper).create_document(&banner, &blocks)
        })
        .await
    }
}
