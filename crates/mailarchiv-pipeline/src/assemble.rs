// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document merger — banner and body first, then every attachment (or its
// placeholder) in tree order. Excluded parts leave no trace in the pages.

use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::{
    AssembledDocument, ConsumptionScope, ConversionOutcome, ConvertError, PageSource,
    PageSourceKind, PaperSize,
};
use mailarchiv_document::{PdfReader, PdfWriter, check_mergeable, merge_documents};
use tracing::{debug, info, instrument};

/// One attachment or attached message with its outcome, in tree order.
#[derive(Debug, Clone)]
pub struct Entry {
    pub index: usize,
    /// Filename, or the subject for an attached message.
    pub label: String,
    pub nested: bool,
    pub outcome: ConversionOutcome,
}

/// Check that converter output is a PDF with at least one page that the
/// merger can take apart, so a bad part ends up as a placeholder instead of
/// failing the whole document.
pub async fn validate_pdf(pdf: Vec<u8>) -> std::result::Result<Vec<u8>, ConvertError> {
    tokio::task::spawn_blocking(move || {
        let pages = PdfReader::from_bytes(&pdf)
            .map_err(|err| ConvertError::InvalidOutput(err.to_string()))?
            .page_count();
        if pages == 0 {
            return Err(ConvertError::InvalidOutput("PDF has no pages".into()));
        }
        check_mergeable(&pdf).map_err(|err| ConvertError::InvalidOutput(err.to_string()))?;
        Ok(pdf)
    })
    .await
    .map_err(|err| ConvertError::Tool(format!("validation task failed: {err}")))?
}

fn page_count(pdf: &[u8]) -> Result<usize> {
    Ok(PdfReader::from_bytes(pdf)?.page_count())
}

/// Merge `body_pdf` and the entries into one document.
///
/// Failed entries are replaced by a placeholder page naming the part and the
/// reason. Under `MailOnly` no entry contributes pages.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn assemble(
    body_pdf: Vec<u8>,
    entries: &[Entry],
    scope: ConsumptionScope,
    paper: PaperSize,
) -> Result<AssembledDocument> {
    let writer = PdfWriter::new(paper);
    let mut sources = vec![PageSource {
        kind: PageSourceKind::Body,
        pages: page_count(&body_pdf)?,
    }];
    let mut pdfs: Vec<Vec<u8>> = vec![body_pdf];

    if scope == ConsumptionScope::MailAndAttachments {
        for entry in entries {
            let (kind, pdf) = match &entry.outcome {
                ConversionOutcome::Excluded(reason) => {
                    debug!(index = entry.index, %reason, "part omitted");
                    continue;
                }
                ConversionOutcome::Converted(pdf) => {
                    let kind = if entry.nested {
                        PageSourceKind::NestedMessage {
                            index: entry.index,
                            subject: entry.label.clone(),
                        }
                    } else {
                        PageSourceKind::Attachment {
                            index: entry.index,
                            filename: entry.label.clone(),
                        }
                    };
                    (kind, pdf.clone())
                }
                ConversionOutcome::Failed(reason) => {
                    let placeholder = writer.create_placeholder(&entry.label, &reason.to_string())?;
                    let kind = PageSourceKind::Placeholder {
                        index: entry.index,
                        filename: entry.label.clone(),
                    };
                    (kind, placeholder)
                }
            };
            let pages = page_count(&pdf)?;
            sources.push(PageSource { kind, pages });
            pdfs.push(pdf);
        }
    }

    let slices: Vec<&[u8]> = pdfs.iter().map(Vec::as_slice).collect();
    let merged = merge_documents(&slices)?;

    let document = AssembledDocument {
        pdf: merged,
        sources,
        is_archival_profile: false,
    };
    let expected = document.page_count();
    let actual = page_count(&document.pdf)?;
    if expected != actual {
        return Err(ArchiveError::PdfError(format!(
            "merged document has {actual} pages, expected {expected}"
        )));
    }

    info!(pages = actual, sources = document.sources.len(), "document assembled");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailarchiv_core::ExclusionReason;

    fn pdf(paper: PaperSize, text: &str) -> Vec<u8> {
        PdfWriter::new(paper).create_from_text(text).unwrap()
    }

    fn entry(index: usize, label: &str, outcome: ConversionOutcome) -> Entry {
        Entry {
            index,
            label: label.into(),
            nested: false,
            outcome,
        }
    }

    #[test]
    fn order_is_body_then_entries_without_excluded() {
        let entries = vec![
            entry(1, "a.pdf", ConversionOutcome::Converted(pdf(PaperSize::A5, "a"))),
            entry(2, "sig.p7s", ConversionOutcome::Excluded(ExclusionReason::Signature)),
            entry(
                3,
                "b.xyz",
                ConversionOutcome::Failed(ConvertError::Unsupported("application/x-b".into())),
            ),
            entry(4, "c.pdf", ConversionOutcome::Converted(pdf(PaperSize::Letter, "c"))),
        ];
        let doc = assemble(
            pdf(PaperSize::A4, "body"),
            &entries,
            ConsumptionScope::MailAndAttachments,
            PaperSize::A4,
        )
        .unwrap();

        let kinds: Vec<&PageSourceKind> = doc.sources.iter().map(|s| &s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &PageSourceKind::Body,
                &PageSourceKind::Attachment {
                    index: 1,
                    filename: "a.pdf".into()
                },
                &PageSourceKind::Placeholder {
                    index: 3,
                    filename: "b.xyz".into()
                },
                &PageSourceKind::Attachment {
                    index: 4,
                    filename: "c.pdf".into()
                },
            ]
        );
        assert_eq!(doc.page_count(), 4);

        let widths: Vec<i32> = PdfReader::from_bytes(&doc.pdf)
            .unwrap()
            .page_sizes()
            .iter()
            .map(|(w, _)| w.round() as i32)
            .collect();
        assert_eq!(widths, vec![595, 420, 595, 612]);
    }

    #[test]
    fn mail_only_keeps_just_the_body() {
        let entries = vec![entry(
            1,
            "a.pdf",
            ConversionOutcome::Converted(pdf(PaperSize::A5, "a")),
        )];
        let doc = assemble(
            pdf(PaperSize::A4, "body"),
            &entries,
            ConsumptionScope::MailOnly,
            PaperSize::A4,
        )
        .unwrap();
        assert_eq!(doc.sources.len(), 1);
        assert_eq!(doc.page_count(), 1);
    }

    #[tokio::test]
    async fn validation_rejects_garbage() {
        let err = validate_pdf(b"%PDF-nope".to_vec()).await.unwrap_err();
        assert!(matches!(err, ConvertError::InvalidOutput(_)));
        let good = pdf(PaperSize::A4, "ok");
        assert_eq!(validate_pdf(good.clone()).await.unwrap(), good);
    }
}
