// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Mailarchiv.
//
// `ArchiveError` is the run-level taxonomy: a pipeline run either returns a
// complete document or exactly one of these. `ConvertError` is the per-call
// failure of an external collaborator; it is recorded per part and never
// aborts a run on its own.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Mailarchiv operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // -- Fatal pipeline errors --
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("message carries neither a text nor an html body")]
    NoBodyAvailable,

    #[error("message body could not be rendered: {0}")]
    BodyRenderFailed(String),

    /// Never returned from a run: the finalizer degrades to the non-profile
    /// document and records this in the report instead.
    #[error("archival profile conversion failed: {0}")]
    ProfileConversionFailed(String),

    #[error("{stage} timed out after {}s", after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    #[error("pipeline run cancelled")]
    Cancelled,

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Configuration / host --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Failure of a single external converter call.
///
/// The `Display` output is the reason printed on placeholder pages, so every
/// variant renders a short, non-empty sentence fragment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unsupported content type {0}")]
    Unsupported(String),

    #[error("converter failed: {0}")]
    Tool(String),

    #[error("converter unreachable: {0}")]
    Transport(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("converter returned an unusable PDF: {0}")]
    InvalidOutput(String),
}

impl ConvertError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ArchiveError> for ConvertError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::PdfError(detail) => Self::InvalidOutput(detail),
            ArchiveError::Timeout { after, .. } => Self::Timeout(after),
            other => Self::Tool(other.to_string()),
        }
    }
}
