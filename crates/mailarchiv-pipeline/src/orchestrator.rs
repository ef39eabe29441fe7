// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — sequences decode, body selection, classification,
// banner rendering, bounded conversion, merge and finalisation for one
// message, and turns per-part failures into report lines.
//
// A run either returns a complete document with its report or exactly one
// `ArchiveError`; there is no partial output.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use mailarchiv_convert::{
    AttachmentConverter, BodyRenderer, BuiltinRenderer, ContentRouter, ConversionRequest,
    ProfileConverter, RetryConfig, with_retry,
};
use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::report::PartReport;
use mailarchiv_core::{
    ArchivalPolicy, AssembledDocument, ConversionOutcome, ConvertError, NoBodyPolicy, PaperSize,
    PipelineConfig, PipelineReport,
};
use mailarchiv_document::integrity::hash_bytes;
use mailarchiv_mime::{MessageDecoder, select_body};
use tracing::{info, instrument, warn};

use crate::assemble::{Entry, assemble, validate_pdf};
use crate::banner::{HeaderInjector, searchable_text};
use crate::classify::{self, PlanItem};
use crate::finalize::Finalizer;
use crate::pool::{ConversionPool, Job};

/// The black boxes a run calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub attachments: Arc<dyn AttachmentConverter>,
    pub renderer: Arc<dyn BodyRenderer>,
    /// `None` makes every profile request degrade with a warning.
    pub profile: Option<Arc<dyn ProfileConverter>>,
}

impl Collaborators {
    /// In-process converters only: PDFs, images and text attachments, and
    /// the builtin body renderer. No archival profile.
    pub fn builtin(paper: PaperSize) -> Self {
        Self {
            attachments: Arc::new(ContentRouter::builtin(paper)),
            renderer: Arc::new(BuiltinRenderer),
            profile: None,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    pub document: AssembledDocument,
    pub report: PipelineReport,
    /// Banner lines and body as plain text, for the host's search index.
    pub text: String,
    /// The message's `Date`, in the sender's offset.
    pub created: Option<DateTime<FixedOffset>>,
}

pub struct Archiver {
    config: PipelineConfig,
    collaborators: Collaborators,
    pool: ConversionPool,
    decoder: MessageDecoder,
}

impl Archiver {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: ConversionPool::new(config.max_concurrent_conversions),
            decoder: MessageDecoder::new(config.max_nesting_depth),
            config,
            collaborators,
        })
    }

    /// Share a conversion pool with other archivers.
    pub fn with_pool(mut self, pool: ConversionPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn pool(&self) -> &ConversionPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Archive one raw message. Dropping the returned future aborts every
    /// conversion still in flight.
    pub async fn archive(&self, raw: &[u8], policy: ArchivalPolicy) -> Result<ArchiveOutput> {
        match self.config.run_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run(raw, policy))
                .await
                .map_err(|_| ArchiveError::Timeout {
                    stage: "run",
                    after: limit,
                })?,
            None => self.run(raw, policy).await,
        }
    }

    /// Like [`archive`](Self::archive), but gives up with
    /// `ArchiveError::Cancelled` as soon as `cancel` completes.
    pub async fn archive_until<C>(
        &self,
        raw: &[u8],
        policy: ArchivalPolicy,
        cancel: C,
    ) -> Result<ArchiveOutput>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                warn!("run cancelled by caller");
                Err(ArchiveError::Cancelled)
            }
            result = self.archive(raw, policy) => result,
        }
    }

    #[instrument(
        skip_all,
        fields(bytes_len = raw.len(), scope = ?policy.scope, message_id = tracing::field::Empty)
    )]
    async fn run(&self, raw: &[u8], policy: ArchivalPolicy) -> Result<ArchiveOutput> {
        let mut report = PipelineReport::begin(hash_bytes(raw));

        let tree = self.decoder.decode(raw)?;
        if let Some(id) = &tree.meta.message_id {
            tracing::Span::current().record("message_id", id.as_str());
        }
        report.message_id = tree.meta.message_id.clone();
        let body = select_body(&tree, policy.body_preference);
        if body.is_none() {
            match self.config.no_body {
                NoBodyPolicy::Fail => return Err(ArchiveError::NoBodyAvailable),
                NoBodyPolicy::AttachmentsOnly => {
                    warn!("message has no body, rendering the banner alone");
                    report.warn("message has no text or html body");
                }
            }
        }

        let plan = classify::plan(&tree, body, policy, &self.config);
        report.body_used = plan.root.body_kind();

        let injector = HeaderInjector::new(Arc::clone(&self.collaborators.renderer), &self.config);
        let text = searchable_text(&injector.rows(&plan.root), plan.root.body.as_ref());
        let body_pdf = injector.render_root(&plan.root).await?;

        let jobs: Vec<Job> = plan
            .items
            .iter()
            .filter_map(|item| match item {
                PlanItem::Convert { request, .. } => Some(self.conversion_job(request.clone())),
                PlanItem::Nested { plan, .. } => Some(injector.job(plan.clone())),
                PlanItem::Exclude { .. } => None,
            })
            .collect();
        let mut results = self.pool.run(jobs).await.into_iter();

        let mut entries = Vec::with_capacity(plan.items.len());
        for item in plan.items {
            let (entry, content_type) = match item {
                PlanItem::Convert { index, request } => (
                    Entry {
                        index,
                        label: request.filename,
                        nested: false,
                        outcome: outcome_of(results.next()),
                    },
                    request.content_type,
                ),
                PlanItem::Nested { index, label, .. } => (
                    Entry {
                        index,
                        label,
                        nested: true,
                        outcome: outcome_of(results.next()),
                    },
                    "message/rfc822".to_string(),
                ),
                PlanItem::Exclude {
                    index,
                    filename,
                    content_type,
                    reason,
                } => (
                    Entry {
                        index,
                        label: filename,
                        nested: false,
                        outcome: ConversionOutcome::Excluded(reason),
                    },
                    content_type,
                ),
            };

            let reason = match &entry.outcome {
                ConversionOutcome::Converted(_) => None,
                ConversionOutcome::Excluded(reason) => Some(reason.to_string()),
                ConversionOutcome::Failed(err) => {
                    warn!(part_index = entry.index, filename = %entry.label, %err, "part not converted");
                    Some(err.to_string())
                }
            };
            report.record_part(PartReport {
                index: entry.index,
                filename: entry.label.clone(),
                content_type,
                outcome: entry.outcome.kind(),
                reason,
            });
            entries.push(entry);
        }

        let scope = policy.scope;
        let paper = self.config.paper_size;
        let document =
            tokio::task::spawn_blocking(move || assemble(body_pdf, &entries, scope, paper))
                .await
                .map_err(|err| ArchiveError::PdfError(format!("assembly task failed: {err}")))??;

        let finalizer = Finalizer::new(self.collaborators.profile.clone(), &self.config);
        let document = finalizer.finalize(document, &policy, &mut report).await;

        report.sources = document.sources.clone();
        report.page_count = document.page_count();
        report.is_archival_profile = document.is_archival_profile;
        report.document_sha256 = hash_bytes(&document.pdf);
        report.finished_at = Utc::now();

        info!(
            pages = report.page_count,
            converted = report.converted,
            excluded = report.excluded,
            failed = report.failed,
            archival = report.is_archival_profile,
            "message archived"
        );

        Ok(ArchiveOutput {
            document,
            report,
            text,
            created: tree.meta.date,
        })
    }

    /// One attachment conversion: routing pre-check, retries on transport
    /// errors, and output validation, all inside the attachment timeout.
    fn conversion_job(&self, request: ConversionRequest) -> Job {
        let converter = Arc::clone(&self.collaborators.attachments);
        let retry = RetryConfig::from_pipeline(&self.config);
        Job::new(self.config.attachment_timeout(), async move {
            if !converter.accepts(&request) {
                return Err(ConvertError::Unsupported(request.content_type.clone()));
            }
            let converter = converter.as_ref();
            let request = &request;
            let pdf = with_retry(&retry, move || converter.convert(request)).await?;
            validate_pdf(pdf).await
        })
    }
}

fn outcome_of(result: Option<std::result::Result<Vec<u8>, ConvertError>>) -> ConversionOutcome {
    match result {
        Some(Ok(pdf)) => ConversionOutcome::Converted(pdf),
        Some(Err(err)) => ConversionOutcome::Failed(err),
        None => ConversionOutcome::Failed(ConvertError::Tool("conversion result missing".into())),
    }
}
