// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gotenberg client — all three converter contracts over one HTTP API.
//
// - attachments: `POST /forms/libreoffice/convert`
// - bodies:      `POST /forms/chromium/convert/html` (index.html + resources)
// - PDF/A:       `POST /forms/pdfengines/merge` with `pdfa=PDF/A-2b`
//
// Connection failures, 429 and 5xx answers are transport errors (retryable);
// any other non-success status means Gotenberg rejected the input.

use async_trait::async_trait;
use mailarchiv_core::{BodyKind, ConvertError};
use mailarchiv_document::BannerRow;
use mailarchiv_document::pdf::layout::blocks_from_text;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};

use crate::traits::{
    AttachmentConverter, BodyRenderer, ConversionRequest, LinkPreservation, ProfileConverter,
    RenderRequest,
};

/// Extensions Gotenberg's LibreOffice route converts.
const LIBREOFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "docm", "dot", "dotx", "odt", "ott", "fodt", "rtf", "txt", "wpd", "pages",
    "xls", "xlsx", "xlsm", "ods", "ots", "fods", "csv", "ppt", "pptx", "pptm", "pps", "ppsx",
    "odp", "otp", "fodp", "odg", "vsd", "vsdx", "svg", "epub", "xml",
];

/// Page margin in inches on every side of a rendered body.
const BODY_MARGIN_IN: &str = "0.1";

/// PDF/A flavour requested from the PDF engines.
const PDFA_FORMAT: &str = "PDF/A-2b";

pub struct GotenbergClient {
    base_url: String,
    client: reqwest::Client,
}

impl GotenbergClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{route}", self.base_url)
    }

    async fn post(&self, route: &str, form: Form) -> Result<Vec<u8>, ConvertError> {
        let url = self.url(route);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ConvertError::Transport(format!("{url}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ConvertError::Transport(format!("{url}: {err}")))?;
            debug!(route, bytes_len = bytes.len(), "Gotenberg answered");
            return Ok(bytes.to_vec());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body.trim()))
    }
}

fn classify_status(status: StatusCode, body: &str) -> ConvertError {
    let detail = if body.is_empty() {
        format!("Gotenberg answered {status}")
    } else {
        format!("Gotenberg answered {status}: {body}")
    };
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ConvertError::Transport(detail)
    } else {
        ConvertError::Tool(detail)
    }
}

fn file_part(content: Vec<u8>, filename: &str) -> Part {
    Part::bytes(content).file_name(filename.to_string())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn banner_html(rows: &[BannerRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut html = String::from(
        "<table style=\"font-family: sans-serif; font-size: 10pt; margin-bottom: 1em\">",
    );
    for row in rows {
        html.push_str(&format!(
            "<tr><th style=\"text-align: left; vertical-align: top; padding-right: 1em\">{}:</th><td>{}</td></tr>",
            escape_html(&row.label),
            escape_html(&row.value)
        ));
    }
    html.push_str("</table><hr>");
    html
}

/// Plain text as preformatted html with its URLs linked.
fn text_html(text: &str) -> String {
    let mut html = String::from("<pre style=\"white-space: pre-wrap; font-size: 10pt\">");
    for block in blocks_from_text(text) {
        for word in &block.words {
            match &word.href {
                Some(href) => html.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(href),
                    escape_html(&word.text)
                )),
                None => html.push_str(&escape_html(&word.text)),
            }
        }
        html.push('\n');
    }
    html.push_str("</pre>");
    html
}

/// The index.html sent to Chromium: banner first, then the body.
///
/// Markup is UTF-8 by now; the leading meta wins over any charset the body
/// declares itself.
fn compose_index(request: &RenderRequest) -> String {
    let banner = banner_html(&request.banner);
    let mut html = String::from("<meta charset=\"utf-8\">\n");
    match request.kind {
        BodyKind::Html => {
            let lower = request.markup.to_ascii_lowercase();
            let insert_at = lower
                .find("<body")
                .and_then(|start| lower[start..].find('>').map(|end| start + end + 1));
            match insert_at {
                Some(at) => {
                    html.push_str(&request.markup[..at]);
                    html.push_str(&banner);
                    html.push_str(&request.markup[at..]);
                }
                None => {
                    html.push_str(&banner);
                    html.push_str(&request.markup);
                }
            }
        }
        BodyKind::Text => {
            html.push_str(&banner);
            html.push_str(&text_html(&request.markup));
        }
        BodyKind::None => html.push_str(&banner),
    }
    html
}

#[async_trait]
impl AttachmentConverter for GotenbergClient {
    fn name(&self) -> &str {
        "gotenberg-libreoffice"
    }

    fn accepts(&self, request: &ConversionRequest) -> bool {
        request
            .extension()
            .is_some_and(|ext| LIBREOFFICE_EXTENSIONS.contains(&ext.as_str()))
    }

    #[instrument(skip_all, fields(filename = %request.filename))]
    async fn convert(&self, request: &ConversionRequest) -> Result<Vec<u8>, ConvertError> {
        let form = Form::new().part("files", file_part(request.content.clone(), &request.filename));
        self.post("forms/libreoffice/convert", form).await
    }
}

#[async_trait]
impl BodyRenderer for GotenbergClient {
    fn name(&self) -> &str {
        "gotenberg-chromium"
    }

    #[instrument(skip_all, fields(kind = ?request.kind, resources = request.resources.len()))]
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, ConvertError> {
        let (width_in, height_in) = request.paper.dimensions_in();
        let mut form = Form::new()
            .part(
                "files",
                file_part(compose_index(request).into_bytes(), "index.html"),
            )
            .text("paperWidth", format!("{width_in:.2}"))
            .text("paperHeight", format!("{height_in:.2}"))
            .text("marginTop", BODY_MARGIN_IN)
            .text("marginBottom", BODY_MARGIN_IN)
            .text("marginLeft", BODY_MARGIN_IN)
            .text("marginRight", BODY_MARGIN_IN);
        for resource in &request.resources {
            form = form.part("files", file_part(resource.content.clone(), &resource.filename));
        }
        self.post("forms/chromium/convert/html", form).await
    }
}

#[async_trait]
impl ProfileConverter for GotenbergClient {
    fn name(&self) -> &str {
        "gotenberg-pdfengines"
    }

    /// The PDF engines rewrite the document while converting and are known
    /// to drop link annotations.
    fn link_preservation(&self) -> LinkPreservation {
        LinkPreservation::KnownLossy
    }

    #[instrument(skip_all, fields(bytes_len = pdf.len()))]
    async fn normalize(&self, pdf: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let form = Form::new()
            .part("files", file_part(pdf.to_vec(), "document.pdf"))
            .text("pdfa", PDFA_FORMAT);
        self.post("forms/pdfengines/merge", form).await
    }
}
