// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mailarchiv-document — PDF operations for the Mailarchiv pipeline.
//
// Provides page generation (banner + body, plain text, images, placeholders)
// with live link annotations, page/link inspection, an order-preserving merge
// of heterogeneous PDFs, and SHA-256 integrity digests.

pub mod integrity;
pub mod pdf;

// Re-export the primary structs so callers can use `mailarchiv_document::PdfWriter` etc.
pub use pdf::layout::{Block, BlockStyle, Word};
pub use pdf::merge::{check_mergeable, merge_documents};
pub use pdf::reader::PdfReader;
pub use pdf::writer::{BannerRow, PdfWriter};
