// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — banner pages, message bodies, images and placeholders using
// `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`. Link annotations are added afterwards with lopdf
// (see `links.rs`) because the builtin-font ops carry no annotation support.

use mailarchiv_core::PaperSize;
use mailarchiv_core::error::{ArchiveError, Result};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

use super::layout::{Block, BlockStyle, LineSpan, Word, blocks_from_text, wrap_block};
use super::links::{PageLink, add_link_annotations};

const MARGIN_MM: f32 = 20.0;
const FONT_SIZE_PT: f32 = 10.0;
const LINE_HEIGHT_PT: f32 = 13.0;
/// Width of the banner's label column.
const LABEL_COLUMN_MM: f32 = 28.0;

/// One `label: value` line of the banner block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerRow {
    pub label: String,
    pub value: String,
}

impl BannerRow {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Builtin faces used by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Mono,
}

impl Face {
    fn builtin(self) -> BuiltinFont {
        match self {
            Self::Regular => BuiltinFont::Helvetica,
            Self::Bold => BuiltinFont::HelveticaBold,
            Self::Mono => BuiltinFont::Courier,
        }
    }

    /// Average glyph advance in points. Courier is exact; Helvetica is an
    /// estimate good enough for wrapping and link rectangles.
    fn char_width_pt(self, size: f32) -> f32 {
        match self {
            Self::Regular => 0.50 * size,
            Self::Bold => 0.55 * size,
            Self::Mono => 0.60 * size,
        }
    }

    fn for_block(style: BlockStyle) -> Self {
        match style {
            BlockStyle::Body => Self::Regular,
            BlockStyle::Heading => Self::Bold,
            BlockStyle::Mono => Self::Mono,
        }
    }
}

/// A positioned line before pagination.
struct LaidLine {
    label: Option<String>,
    text: String,
    face: Face,
    indent_pt: f32,
    links: Vec<LineSpan>,
}

/// Creates new PDF documents: banner-plus-body pages, plain text, single
/// images and failure placeholders.
pub struct PdfWriter {
    /// Paper size for page creation.
    paper_size: PaperSize,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl PdfWriter {
    /// Create a new writer targeting the given paper size.
    pub fn new(paper_size: PaperSize) -> Self {
        Self {
            paper_size,
            title: None,
        }
    }

    /// Create a new writer defaulting to A4.
    pub fn a4() -> Self {
        Self::new(PaperSize::A4)
    }

    /// Set a title for the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Paper dimensions in printpdf's Mm units.
    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    // -- Banner + body --------------------------------------------------------

    /// Lay out a banner followed by body blocks, paginating as needed.
    ///
    /// Banner labels are bold with their values wrapped in a second column.
    /// Words carrying an href become clickable link annotations.
    #[instrument(skip_all, fields(rows = banner.len(), blocks = blocks.len()))]
    pub fn create_document(&self, banner: &[BannerRow], blocks: &[Block]) -> Result<Vec<u8>> {
        let (page_w, page_h) = self.page_dimensions();
        let title = self.title.as_deref().unwrap_or("Mailarchiv Document");
        info!(paper = ?self.paper_size, title, "Creating document PDF");

        let margin_pt = Mm(MARGIN_MM).into_pt().0;
        let usable_w_pt = page_w.into_pt().0 - 2.0 * margin_pt;
        let page_h_pt = page_h.into_pt().0;
        let lines_per_page = (((page_h_pt - 2.0 * margin_pt) / LINE_HEIGHT_PT) as usize).max(1);

        let lines = self.lay_out(banner, blocks, usable_w_pt);

        let mut doc = PdfDocument::new(title);
        let mut pages: Vec<PdfPage> = Vec::new();
        let mut links: Vec<PageLink> = Vec::new();

        for (page_index, chunk) in lines.chunks(lines_per_page).enumerate() {
            let mut ops: Vec<Op> = Vec::new();
            for (line_idx, line) in chunk.iter().enumerate() {
                let y_pt = page_h_pt - margin_pt - FONT_SIZE_PT - line_idx as f32 * LINE_HEIGHT_PT;

                if let Some(label) = &line.label {
                    push_text(&mut ops, margin_pt, y_pt, Face::Bold, label);
                }
                if !line.text.is_empty() {
                    let x_pt = margin_pt + line.indent_pt;
                    push_text(&mut ops, x_pt, y_pt, line.face, &line.text);

                    let advance = line.face.char_width_pt(FONT_SIZE_PT);
                    for span in &line.links {
                        let x0 = x_pt + span.start as f32 * advance;
                        let x1 = x0 + span.len as f32 * advance;
                        links.push(PageLink {
                            page: page_index,
                            rect: [
                                x0,
                                y_pt - 0.25 * FONT_SIZE_PT,
                                x1,
                                y_pt + 0.85 * FONT_SIZE_PT,
                            ],
                            uri: span.href.clone(),
                        });
                    }
                }
            }
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        // An empty body still yields one (blank) page.
        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        doc.with_pages(pages);
        debug!(
            total_lines = lines.len(),
            pages = doc.pages.len(),
            links = links.len(),
            "Document layout complete"
        );

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        if links.is_empty() {
            Ok(output)
        } else {
            add_link_annotations(&output, &links)
        }
    }

    fn lay_out(&self, banner: &[BannerRow], blocks: &[Block], usable_w_pt: f32) -> Vec<LaidLine> {
        let mut lines = Vec::new();

        let label_w_pt = Mm(LABEL_COLUMN_MM).into_pt().0;
        let value_chars = chars_fitting(usable_w_pt - label_w_pt, Face::Regular);
        for row in banner {
            let block = Block {
                style: BlockStyle::Body,
                words: row.value.split_whitespace().map(Word::plain).collect(),
            };
            for (i, wrapped) in wrap_block(&block, value_chars).into_iter().enumerate() {
                lines.push(LaidLine {
                    label: (i == 0).then(|| format!("{}:", sanitize(&row.label))),
                    text: sanitize(&wrapped.text),
                    face: Face::Regular,
                    indent_pt: label_w_pt,
                    links: Vec::new(),
                });
            }
        }
        if !banner.is_empty() {
            lines.push(blank_line());
        }

        for block in blocks {
            let face = Face::for_block(block.style);
            for wrapped in wrap_block(block, chars_fitting(usable_w_pt, face)) {
                lines.push(LaidLine {
                    label: None,
                    text: sanitize(&wrapped.text),
                    face,
                    indent_pt: 0.0,
                    links: wrapped.links,
                });
            }
        }

        lines
    }

    // -- Text to PDF ----------------------------------------------------------

    /// Create a PDF from plain text content in a fixed-width face.
    ///
    /// Lines keep their spacing, long lines wrap and pages break
    /// automatically. Bare URLs become links.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn create_from_text(&self, text: &str) -> Result<Vec<u8>> {
        self.create_document(&[], &blocks_from_text(text))
    }

    /// Page substituted for a part that could not be converted.
    #[instrument(skip(self))]
    pub fn create_placeholder(&self, filename: &str, reason: &str) -> Result<Vec<u8>> {
        let block = Block {
            style: BlockStyle::Heading,
            words: Self::placeholder_text(filename, reason)
                .split_whitespace()
                .map(Word::plain)
                .collect(),
        };
        self.create_document(&[], &[block])
    }

    /// The sentence printed on a placeholder page.
    pub fn placeholder_text(filename: &str, reason: &str) -> String {
        format!("could not convert {filename}: {reason}")
    }

    // -- Image to PDF ---------------------------------------------------------

    /// Create a single-page PDF containing the given image.
    ///
    /// The image is scaled to fit within the page margins while preserving its
    /// aspect ratio.
    #[instrument(skip(self, image_bytes), fields(bytes_len = image_bytes.len()))]
    pub fn create_from_image(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let (page_w, page_h) = self.page_dimensions();
        let title = self.title.as_deref().unwrap_or("Mailarchiv Image");

        info!(paper = ?self.paper_size, title, "Creating image PDF");

        let dynamic_image = ::image::load_from_memory(image_bytes).map_err(|err| {
            ArchiveError::ImageError(format!("failed to decode image for PDF: {err}"))
        })?;

        let img_width = dynamic_image.width() as usize;
        let img_height = dynamic_image.height() as usize;
        if img_width == 0 || img_height == 0 {
            return Err(ArchiveError::ImageError("image has no pixels".into()));
        }

        let rgb_image = dynamic_image.to_rgb8();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb_image.into_raw()),
            width: img_width,
            height: img_height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };

        let mut doc = PdfDocument::new(title);
        let xobject_id = doc.add_image(&raw);

        let margin_mm: f32 = 15.0;
        let usable_w_pt = Mm(page_w.0 - 2.0 * margin_mm).into_pt().0;
        let usable_h_pt = Mm(page_h.0 - 2.0 * margin_mm).into_pt().0;

        // Native size at 150 dpi; never upscaled.
        let dpi: f32 = 150.0;
        let img_w_pt = img_width as f32 / dpi * 72.0;
        let img_h_pt = img_height as f32 / dpi * 72.0;

        let scale = (usable_w_pt / img_w_pt).min(usable_h_pt / img_h_pt).min(1.0);
        let rendered_w_pt = img_w_pt * scale;
        let rendered_h_pt = img_h_pt * scale;

        // Top-aligned and horizontally centred.
        let margin_pt = Mm(margin_mm).into_pt().0;
        let x_offset = margin_pt + (usable_w_pt - rendered_w_pt) / 2.0;
        let y_offset = margin_pt + usable_h_pt - rendered_h_pt;

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(x_offset)),
                translate_y: Some(Pt(y_offset)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(dpi),
                rotate: None,
            },
        }];

        doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);
        debug!(rendered_w_pt, rendered_h_pt, scale, "Image placed on page");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }
}

fn push_text(ops: &mut Vec<Op>, x_pt: f32, y_pt: f32, face: Face, text: &str) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x_pt),
            y: Pt(y_pt),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(FONT_SIZE_PT),
        font: face.builtin(),
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(text.to_string())],
        font: face.builtin(),
    });
    ops.push(Op::EndTextSection);
}

fn blank_line() -> LaidLine {
    LaidLine {
        label: None,
        text: String::new(),
        face: Face::Regular,
        indent_pt: 0.0,
        links: Vec::new(),
    }
}

fn chars_fitting(width_pt: f32, face: Face) -> usize {
    ((width_pt / face.char_width_pt(FONT_SIZE_PT)) as usize).max(1)
}

/// Map text onto what the builtin (WinAnsi) fonts can show, one character
/// for one so link columns stay aligned.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '\u{2022}' | '\u{2023}' | '\u{25CF}' => '*',
            '\u{2026}' => '.',
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' => ' ',
            c if c.is_control() => ' ',
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c,
            _ => '?',
        })
        .collect()
}
