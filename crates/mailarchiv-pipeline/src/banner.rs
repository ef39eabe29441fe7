// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Header injector — banner rows from the message metadata, the render request
// for the selected body, and the searchable plain-text rendition.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use mailarchiv_convert::{BodyRenderer, RenderRequest, RetryConfig, with_retry};
use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::{BodyKind, ConvertError, MessageMeta, PaperSize, PipelineConfig, SelectedBody};
use mailarchiv_document::BannerRow;
use mailarchiv_mime::html::{collapse_blank_lines, html_to_text, rewrite_cid_references, strip_page_css};
use tracing::{instrument, warn};

use crate::assemble::validate_pdf;
use crate::classify::BodyPlan;
use crate::pool::Job;

/// Banner rows in display order. Empty recipient lists and an empty
/// attachment list produce no row.
pub fn banner_rows(meta: &MessageMeta, listed: &[String], date_format: &str) -> Vec<BannerRow> {
    let mut rows = vec![
        BannerRow::new("From", non_empty(meta.from.as_deref()).unwrap_or("(no sender)")),
        BannerRow::new("Subject", non_empty(meta.subject.as_deref()).unwrap_or("(no subject)")),
    ];
    if !meta.to.is_empty() {
        rows.push(BannerRow::new("To", meta.to.join(", ")));
    }
    if !meta.cc.is_empty() {
        rows.push(BannerRow::new("Cc", meta.cc.join(", ")));
    }
    if let Some(date) = meta.date {
        let mut formatted = String::new();
        if write!(formatted, "{}", date.format(date_format)).is_err() {
            warn!(date_format, "invalid date format, falling back to RFC 2822");
            formatted = date.to_rfc2822();
        }
        rows.push(BannerRow::new("Date", formatted));
    }
    if !listed.is_empty() {
        rows.push(BannerRow::new("Attachments", listed.join(", ")));
    }
    rows
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Plain-text rendition for indexing: one `Label: value` line per banner
/// row, a blank line, then the body text.
pub fn searchable_text(rows: &[BannerRow], body: Option<&SelectedBody>) -> String {
    let mut text = String::new();
    for row in rows {
        text.push_str(&row.label);
        text.push_str(": ");
        text.push_str(&row.value);
        text.push('\n');
    }
    if let Some(body) = body {
        text.push('\n');
        match body.kind {
            BodyKind::Html => text.push_str(&html_to_text(&body.content)),
            BodyKind::Text | BodyKind::None => text.push_str(&body.content),
        }
    }
    collapse_blank_lines(&text)
}

/// Renders banner and body of one message through the body renderer.
#[derive(Clone)]
pub struct HeaderInjector {
    renderer: Arc<dyn BodyRenderer>,
    paper: PaperSize,
    date_format: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HeaderInjector {
    pub fn new(renderer: Arc<dyn BodyRenderer>, config: &PipelineConfig) -> Self {
        Self {
            renderer,
            paper: config.paper_size,
            date_format: config.date_format.clone(),
            timeout: config.render_timeout(),
            retry: RetryConfig::from_pipeline(config),
        }
    }

    pub fn rows(&self, plan: &BodyPlan) -> Vec<BannerRow> {
        banner_rows(&plan.meta, &plan.listed, &self.date_format)
    }

    /// Build the renderer input. Html bodies get their `cid:` references
    /// pointed at the shipped resources and their page CSS removed.
    pub fn request_for(&self, plan: &BodyPlan) -> RenderRequest {
        let kind = plan.body_kind();
        let (markup, charset) = match &plan.body {
            Some(body) if body.kind == BodyKind::Html => {
                let rewritten = rewrite_cid_references(
                    &body.content,
                    plan.resources
                        .iter()
                        .map(|r| (r.content_id.as_str(), r.resource.filename.as_str())),
                );
                (strip_page_css(&rewritten), body.charset.clone())
            }
            Some(body) => (body.content.clone(), body.charset.clone()),
            None => (String::new(), None),
        };
        RenderRequest {
            banner: self.rows(plan),
            kind,
            markup,
            charset,
            resources: plan.resources.iter().map(|r| r.resource.clone()).collect(),
            paper: self.paper,
        }
    }

    /// Render with retries and validate the result. No time limit.
    pub async fn render(&self, plan: &BodyPlan) -> std::result::Result<Vec<u8>, ConvertError> {
        let request = self.request_for(plan);
        let request = &request;
        let renderer = self.renderer.as_ref();
        let pdf = with_retry(&self.retry, move || renderer.render(request)).await?;
        validate_pdf(pdf).await
    }

    /// Render the root message. Any failure here ends the run.
    #[instrument(skip_all, fields(renderer = self.renderer.name(), kind = ?plan.body_kind()))]
    pub async fn render_root(&self, plan: &BodyPlan) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.render(plan)).await {
            Ok(Ok(pdf)) => Ok(pdf),
            Ok(Err(err)) => Err(ArchiveError::BodyRenderFailed(err.to_string())),
            Err(_) => Err(ArchiveError::Timeout {
                stage: "body render",
                after: self.timeout,
            }),
        }
    }

    /// Pool job rendering an attached message under the render timeout.
    pub fn job(&self, plan: BodyPlan) -> Job {
        let injector = self.clone();
        Job::new(self.timeout, async move { injector.render(&plan).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use mailarchiv_convert::{BuiltinRenderer, Resource};

    use crate::classify::InlineResource;

    fn meta() -> MessageMeta {
        MessageMeta {
            subject: Some("Quarterly numbers".into()),
            from: Some("Ann <ann@example.org>".into()),
            to: vec!["bob@example.org".into(), "cy@example.org".into()],
            cc: Vec::new(),
            date: DateTime::parse_from_rfc2822("Tue, 3 Mar 2026 14:05:00 +0100").ok(),
            message_id: None,
        }
    }

    #[test]
    fn rows_follow_display_order_and_skip_empty_lists() {
        let rows = banner_rows(&meta(), &["a.pdf (1 KiB)".into()], "%d.%m.%Y %H:%M");
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["From", "Subject", "To", "Date", "Attachments"]);
        assert_eq!(rows[2].value, "bob@example.org, cy@example.org");
        // Formatted in the sender's own offset.
        assert_eq!(rows[3].value, "03.03.2026 14:05");
    }

    #[test]
    fn missing_sender_and_subject_get_stand_ins() {
        let rows = banner_rows(&MessageMeta::default(), &[], "%d.%m.%Y");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, "(no sender)");
        assert_eq!(rows[1].value, "(no subject)");
    }

    #[test]
    fn html_request_points_cids_at_resources_and_drops_page_css() {
        let plan = BodyPlan {
            meta: meta(),
            body: Some(SelectedBody {
                kind: BodyKind::Html,
                content: r#"<style>@page {page: size A3}</style><img src="cid:logo@x">"#.into(),
                charset: Some("utf-8".into()),
            }),
            resources: vec![InlineResource {
                content_id: "logo@x".into(),
                resource: Resource {
                    filename: "logo.png".into(),
                    content_type: "image/png".into(),
                    content: vec![1, 2, 3],
                },
            }],
            listed: Vec::new(),
        };
        let injector = HeaderInjector::new(Arc::new(BuiltinRenderer), &PipelineConfig::default());
        let request = injector.request_for(&plan);
        assert!(request.markup.contains(r#"src="logo.png""#));
        assert!(!request.markup.contains("cid:"));
        assert!(!request.markup.contains("size A3"));
        assert_eq!(request.resources.len(), 1);
        assert_eq!(request.kind, BodyKind::Html);
    }

    #[test]
    fn searchable_text_joins_banner_and_body() {
        let rows = vec![BannerRow::new("Subject", "Hi")];
        let body = SelectedBody {
            kind: BodyKind::Html,
            content: "<p>One</p><p></p><p>Two &amp; three</p>".into(),
            charset: None,
        };
        assert_eq!(
            searchable_text(&rows, Some(&body)),
            "Subject: Hi\n\nOne\n\nTwo & three"
        );
        assert_eq!(searchable_text(&rows, None), "Subject: Hi");
    }

    struct Failing;

    #[async_trait]
    impl BodyRenderer for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn render(&self, _: &RenderRequest) -> std::result::Result<Vec<u8>, ConvertError> {
            Err(ConvertError::Tool("chromium crashed".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl BodyRenderer for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn render(&self, _: &RenderRequest) -> std::result::Result<Vec<u8>, ConvertError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn root_render_failure_is_fatal() {
        let injector = HeaderInjector::new(Arc::new(Failing), &PipelineConfig::default());
        let err = injector.render_root(&BodyPlan::default()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::BodyRenderFailed(ref r) if r.contains("chromium crashed")));
    }

    #[tokio::test]
    async fn root_render_timeout_names_the_stage() {
        let mut injector = HeaderInjector::new(Arc::new(Stalled), &PipelineConfig::default());
        injector.timeout = Duration::from_millis(20);
        let err = injector.render_root(&BodyPlan::default()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Timeout { stage: "body render", .. }));
    }

    #[tokio::test]
    async fn builtin_renders_banner_only_plan() {
        let injector = HeaderInjector::new(Arc::new(BuiltinRenderer), &PipelineConfig::default());
        let pdf = injector.render_root(&BodyPlan::default()).await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }
}
