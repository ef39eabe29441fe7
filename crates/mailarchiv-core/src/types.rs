// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Mailarchiv pipeline.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Dimensions in inches (width, height), as HTML renderers expect them.
    pub fn dimensions_in(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (w as f32 / 25.4, h as f32 / 25.4)
    }
}

// -- Message tree -------------------------------------------------------------

/// Content-Disposition of a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Inline,
    Attachment,
    /// No Content-Disposition header.
    Unspecified,
}

/// A decoded leaf of the message tree.
///
/// `content` holds the part after transfer decoding. Text parts are UTF-8;
/// binary parts are byte-for-byte what the sender attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Lowercase `type/subtype` without parameters.
    pub content_type: String,
    /// Declared charset, if any.
    pub charset: Option<String>,
    pub filename: Option<String>,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    pub disposition: Disposition,
    pub content: Vec<u8>,
}

impl PartInfo {
    /// Content as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// One node of the decoded message tree, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    TextBody(PartInfo),
    HtmlBody(PartInfo),
    Attachment(PartInfo),
    NestedMessage(MessageTree),
}

/// Envelope data shown on the banner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub subject: Option<String>,
    /// Display form `Name <address>` or the bare address.
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<DateTime<FixedOffset>>,
    pub message_id: Option<String>,
}

/// A decoded message: envelope plus its leaf parts in document order.
///
/// Multipart containers are flattened; nested messages keep their own tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTree {
    pub meta: MessageMeta,
    pub parts: Vec<MessagePart>,
}

impl MessageTree {
    /// All `Attachment` parts of this message, excluding nested messages.
    pub fn attachments(&self) -> impl Iterator<Item = &PartInfo> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::Attachment(info) => Some(info),
            _ => None,
        })
    }
}

// -- Body selection -----------------------------------------------------------

/// Which body representation ended up in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Text,
    Html,
    /// No body was available; the banner was rendered alone.
    None,
}

/// The body chosen by the selector. Multiple parts of the chosen kind are
/// joined in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBody {
    pub kind: BodyKind,
    pub content: String,
    pub charset: Option<String>,
}

// -- Conversion ---------------------------------------------------------------

/// Why a part was left out of the document entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Cryptographic signature payload.
    Signature,
    /// `scope = MailOnly`.
    OutOfScope,
    /// Inline resource already rendered as part of the HTML body.
    EmbeddedInBody,
    /// Inline resource of the HTML representation that was not selected.
    UnusedAlternative,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Signature => "signature",
            Self::OutOfScope => "out of scope",
            Self::EmbeddedInBody => "embedded in body",
            Self::UnusedAlternative => "inline in unused html body",
        };
        f.write_str(text)
    }
}

/// Result of processing one attachment (or attached message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(Vec<u8>),
    Excluded(ExclusionReason),
    Failed(ConvertError),
}

impl ConversionOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Converted(_) => OutcomeKind::Converted,
            Self::Excluded(_) => OutcomeKind::Excluded,
            Self::Failed(_) => OutcomeKind::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Converted,
    Excluded,
    Failed,
}

// -- Assembly -----------------------------------------------------------------

/// Origin of a contiguous page run in the assembled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSourceKind {
    /// Banner followed by the selected body.
    Body,
    Attachment { index: usize, filename: String },
    /// Banner and body of an attached message.
    NestedMessage { index: usize, subject: String },
    /// Stand-in for a part that failed to convert.
    Placeholder { index: usize, filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSource {
    #[serde(flatten)]
    pub kind: PageSourceKind,
    pub pages: usize,
}

/// The merged document plus the page runs it was built from, in order.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub pdf: Vec<u8>,
    pub sources: Vec<PageSource>,
    pub is_archival_profile: bool,
}

impl AssembledDocument {
    pub fn page_count(&self) -> usize {
        self.sources.iter().map(|s| s.pages).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_inches_match_a4() {
        let (w, h) = PaperSize::A4.dimensions_in();
        assert!((w - 8.27).abs() < 0.01);
        assert!((h - 11.69).abs() < 0.01);
    }

    #[test]
    fn exclusion_reason_reads_naturally() {
        assert_eq!(ExclusionReason::Signature.to_string(), "signature");
        assert_eq!(
            ExclusionReason::UnusedAlternative.to_string(),
            "inline in unused html body"
        );
    }

    #[test]
    fn attachments_skip_bodies_and_nested_messages() {
        let leaf = |ct: &str| PartInfo {
            content_type: ct.into(),
            charset: None,
            filename: None,
            content_id: None,
            disposition: Disposition::Attachment,
            content: Vec::new(),
        };
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::TextBody(leaf("text/plain")),
                MessagePart::Attachment(leaf("image/png")),
                MessagePart::NestedMessage(MessageTree::default()),
            ],
        };
        let types: Vec<&str> = tree.attachments().map(|a| a.content_type.as_str()).collect();
        assert_eq!(types, vec!["image/png"]);
    }
}
