// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content router — one attachment converter in front of several
// type-specific ones.

use std::sync::Arc;

use async_trait::async_trait;
use mailarchiv_core::{ConvertError, PaperSize};
use tracing::{debug, instrument};

use crate::builtin::{ImageConverter, PdfPassthrough, TextConverter};
use crate::traits::{AttachmentConverter, ConversionRequest};

/// Tries converters in registration order.
///
/// The first converter that accepts the request and does not answer
/// `Unsupported` decides the outcome. When none does, the result is
/// `Unsupported` with the declared content type.
#[derive(Default, Clone)]
pub struct ContentRouter {
    converters: Vec<Arc<dyn AttachmentConverter>>,
}

impl ContentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// PDF passthrough, images and text: everything that needs no external
    /// tool.
    pub fn builtin(paper: PaperSize) -> Self {
        Self::new()
            .with(Arc::new(PdfPassthrough))
            .with(Arc::new(ImageConverter::new(paper)))
            .with(Arc::new(TextConverter::new(paper)))
    }

    pub fn with(mut self, converter: Arc<dyn AttachmentConverter>) -> Self {
        self.converters.push(converter);
        self
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

#[async_trait]
impl AttachmentConverter for ContentRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        self.converters.iter().any(|c| c.accepts(request))
    }

    #[instrument(skip_all, fields(filename = %request.filename, content_type = %request.content_type))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        for converter in self.converters.iter().filter(|c| c.accepts(request)) {
            match converter.convert(request).await {
                Err(ConvertError::Unsupported(_)) => {
                    debug!(converter = converter.name(), "converter declined");
                }
                result => {
                    debug!(converter = converter.name(), ok = result.is_ok(), "converter answered");
                    return result;
                }
            }
        }
        Err(ConvertError::Unsupported(request.content_type.clone()))
    }
}
