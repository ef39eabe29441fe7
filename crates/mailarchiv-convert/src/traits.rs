// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits for the pipeline's black-box collaborators.
//
// Each trait is one contract: attachment to PDF, body to PDF, and PDF to the
// archival profile. Implementations are shared as `Arc<dyn …>` across
// concurrent conversions, so they must be `Send + Sync`.

use async_trait::async_trait;
use mailarchiv_core::{BodyKind, ConvertError, PaperSize};
use mailarchiv_document::BannerRow;
use serde::{Deserialize, Serialize};

/// One attachment handed to a converter.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub content: Vec<u8>,
    /// Lowercase `type/subtype`.
    pub content_type: String,
    /// Declared charset for text content.
    pub charset: Option<String>,
    /// Declared or generated filename; never empty.
    pub filename: String,
}

impl ConversionRequest {
    /// Extension of the filename, lowercased, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.filename.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }
}

/// Converts an attachment to PDF bytes.
#[async_trait]
pub trait AttachmentConverter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Cheap pre-check on type and filename; `convert` may still return
    /// `Unsupported`.
    fn accepts(&self, _request: &ConversionRequest) -> bool {
        true
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError>;
}

/// A file the body refers to (inline image etc.), shipped next to the markup.
#[derive(Debug, Clone)]
pub struct Resource {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Banner plus selected body, ready to render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub banner: Vec<BannerRow>,
    /// `BodyKind::None` renders the banner alone.
    pub kind: BodyKind,
    /// Plain text or html, already decoded to UTF-8.
    pub markup: String,
    /// Charset the body was declared in.
    pub charset: Option<String>,
    pub resources: Vec<Resource>,
    pub paper: PaperSize,
}

/// Renders banner and body to PDF. Html links must stay clickable.
#[async_trait]
pub trait BodyRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, ConvertError>;
}

/// What a profile converter is known to do with link annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPreservation {
    Preserves,
    /// Documented to drop links; the report always carries a warning.
    KnownLossy,
    Unknown,
}

/// Normalises a PDF to the long-term preservation profile (PDF/A).
#[async_trait]
pub trait ProfileConverter: Send + Sync {
    fn name(&self) -> &str;

    fn link_preservation(&self) -> LinkPreservation {
        LinkPreservation::Unknown
    }

    async fn normalize(&self, pdf: &[u8]) -> Result<Vec<u8>, ConvertError>;
}
