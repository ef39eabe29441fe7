// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mailarchiv-convert — The external collaborators of the pipeline.
//
// The pipeline only sees the capability traits in `traits`. Implementations
// cover in-process conversion (PDF passthrough, images, text, a built-in body
// renderer), an external office tool run as a child process, and a Gotenberg
// server reached over HTTP.

pub mod builtin;
pub mod command;
pub mod gotenberg;
pub mod retry;
pub mod router;
pub mod traits;

pub use builtin::{BuiltinRenderer, ImageConverter, PdfPassthrough, TextConverter};
pub use command::CommandConverter;
pub use gotenberg::GotenbergClient;
pub use retry::{RetryConfig, with_retry};
pub use router::ContentRouter;
pub use traits::{
    AttachmentConverter, BodyRenderer, ConversionRequest, LinkPreservation, ProfileConverter,
    RenderRequest, Resource,
};
