// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Archival finalizer. Optional PDF/A normalisation of the assembled document.
//
// A failure here never fails the run: the non-profile document is kept and
// the report says why. Lost link annotations are counted and reported.

use std::sync::Arc;
use std::time::Duration;

use mailarchiv_convert::{LinkPreservation, ProfileConverter, RetryConfig, with_retry};
use mailarchiv_core::error::ArchiveError;
use mailarchiv_core::report::ProfileStatus;
use mailarchiv_core::{ArchivalPolicy, AssembledDocument, ConvertError, PipelineConfig, PipelineReport};
use mailarchiv_document::PdfReader;
use tracing::{info, instrument, warn};

use crate::assemble::validate_pdf;

pub struct Finalizer {
    converter: Option<Arc<dyn ProfileConverter>>,
    timeout: Duration,
    retry: RetryConfig,
}

impl Finalizer {
    pub fn new(converter: Option<Arc<dyn ProfileConverter>>, config: &PipelineConfig) -> Self {
        Self {
            converter,
            timeout: config.profile_timeout(),
            retry: RetryConfig::from_pipeline(config),
        }
    }

    /// Normalise `document` when the policy asks for it, recording the
    /// outcome in `report`. Always returns a usable document.
    #[instrument(skip_all, fields(requested = policy.produce_archival_profile))]
    pub async fn finalize(
        &self,
        document: AssembledDocument,
        policy: &ArchivalPolicy,
        report: &mut PipelineReport,
    ) -> AssembledDocument {
        if !policy.produce_archival_profile {
            report.profile = ProfileStatus::NotRequested;
            return document;
        }
        let Some(converter) = &self.converter else {
            self.degrade(report, "no archival profile converter configured".into());
            return document;
        };

        let before = Survey::of(&document.pdf).await;
        let normalized = self.normalize(converter.as_ref(), &document.pdf);
        let result = match tokio::time::timeout(self.timeout, normalized).await {
            Ok(result) => result,
            Err(_) => Err(ConvertError::Timeout(self.timeout)),
        };
        let pdf = match result {
            Ok(pdf) => pdf,
            Err(err) => {
                self.degrade(report, err.to_string());
                return document;
            }
        };

        let after = Survey::of(&pdf).await;
        if after.pages.len() != before.pages.len() {
            report.warn(format!(
                "archival profile changed the page count from {} to {}",
                before.pages.len(),
                after.pages.len()
            ));
        }

        let links_before = before.links;
        let links_after = after.links;
        if links_after < links_before {
            let missing: Vec<&str> = before
                .uris
                .iter()
                .filter(|uri| !after.uris.contains(uri))
                .map(String::as_str)
                .collect();
            let mut warning = format!(
                "archival profile conversion dropped {} of {links_before} links",
                links_before - links_after
            );
            if !missing.is_empty() {
                warning.push_str(&format!(" ({})", missing.join(", ")));
            }
            report.warn(warning);
        }
        if converter.link_preservation() == LinkPreservation::KnownLossy {
            report.warn(format!(
                "{} is known to drop link annotations",
                converter.name()
            ));
        }

        info!(links_before, links_after, converter = converter.name(), "archival profile produced");
        report.profile = ProfileStatus::Produced {
            links_before,
            links_after,
        };
        AssembledDocument {
            pdf,
            sources: document.sources,
            is_archival_profile: true,
        }
    }

    async fn normalize(
        &self,
        converter: &dyn ProfileConverter,
        pdf: &[u8],
    ) -> Result<Vec<u8>, ConvertError> {
        let out = with_retry(&self.retry, move || converter.normalize(pdf)).await?;
        validate_pdf(out).await
    }

    fn degrade(&self, report: &mut PipelineReport, reason: String) {
        let err = ArchiveError::ProfileConversionFailed(reason.clone());
        warn!(%err, "keeping the document without archival profile");
        report.warn(err.to_string());
        report.profile = ProfileStatus::Failed { reason };
    }
}

/// Page sizes and link annotations of one PDF.
#[derive(Debug, Default)]
struct Survey {
    pages: Vec<(f32, f32)>,
    links: usize,
    uris: Vec<String>,
}

impl Survey {
    /// Parsed on the blocking pool; an unreadable PDF surveys as empty.
    async fn of(pdf: &[u8]) -> Self {
        let bytes = pdf.to_vec();
        let task = tokio::task::spawn_blocking(move || match PdfReader::from_bytes(&bytes) {
            Ok(reader) => Survey {
                pages: reader.page_sizes(),
                links: reader.link_count(),
                uris: reader.link_uris(),
            },
            Err(_) => Survey::default(),
        });
        task.await.unwrap_or_else(|err| {
            warn!(%err, "PDF survey task failed");
            Survey::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailarchiv_core::{BodyPreference, ConsumptionScope, PageSource, PageSourceKind};
    use mailarchiv_document::{Block, BlockStyle, PdfWriter, Word};

    fn linked_document() -> AssembledDocument {
        let blocks = vec![Block {
            style: BlockStyle::Body,
            words: vec![Word {
                text: "docs".into(),
                href: Some("https://example.org/docs".into()),
            }],
        }];
        let pdf = PdfWriter::a4().create_document(&[], &blocks).unwrap();
        AssembledDocument {
            pdf,
            sources: vec![PageSource {
                kind: PageSourceKind::Body,
                pages: 1,
            }],
            is_archival_profile: false,
        }
    }

    fn policy(produce: bool) -> ArchivalPolicy {
        ArchivalPolicy {
            scope: ConsumptionScope::MailAndAttachments,
            body_preference: BodyPreference::PreferText,
            produce_archival_profile: produce,
        }
    }

    /// Returns a fresh text-only PDF, dropping every link.
    struct Flattening;

    #[async_trait]
    impl ProfileConverter for Flattening {
        fn name(&self) -> &str {
            "flattening"
        }
        async fn normalize(&self, _pdf: &[u8]) -> Result<Vec<u8>, ConvertError> {
            Ok(PdfWriter::a4().create_from_text("flattened").unwrap())
        }
    }

    struct Identity;

    #[async_trait]
    impl ProfileConverter for Identity {
        fn name(&self) -> &str {
            "identity"
        }
        fn link_preservation(&self) -> LinkPreservation {
            LinkPreservation::Preserves
        }
        async fn normalize(&self, pdf: &[u8]) -> Result<Vec<u8>, ConvertError> {
            Ok(pdf.to_vec())
        }
    }

    struct Broken;

    #[async_trait]
    impl ProfileConverter for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn normalize(&self, _pdf: &[u8]) -> Result<Vec<u8>, ConvertError> {
            Err(ConvertError::Tool("ghostscript exited with 1".into()))
        }
    }

    fn finalizer(converter: Option<Arc<dyn ProfileConverter>>) -> Finalizer {
        Finalizer::new(converter, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn not_requested_passes_through() {
        let mut report = PipelineReport::begin(String::new());
        let doc = linked_document();
        let out = finalizer(Some(Arc::new(Broken)))
            .finalize(doc.clone(), &policy(false), &mut report)
            .await;
        assert_eq!(out.pdf, doc.pdf);
        assert!(!out.is_archival_profile);
        assert_eq!(report.profile, ProfileStatus::NotRequested);
    }

    #[tokio::test]
    async fn failure_keeps_the_original_document() {
        let mut report = PipelineReport::begin(String::new());
        let doc = linked_document();
        let out = finalizer(Some(Arc::new(Broken)))
            .finalize(doc.clone(), &policy(true), &mut report)
            .await;
        assert_eq!(out.pdf, doc.pdf);
        assert!(!out.is_archival_profile);
        assert!(matches!(report.profile, ProfileStatus::Failed { ref reason } if reason.contains("ghostscript")));
        assert!(report.warnings[0].starts_with("archival profile conversion failed"));
    }

    #[tokio::test]
    async fn lost_links_are_reported() {
        let mut report = PipelineReport::begin(String::new());
        let out = finalizer(Some(Arc::new(Flattening)))
            .finalize(linked_document(), &policy(true), &mut report)
            .await;
        assert!(out.is_archival_profile);
        assert_eq!(
            report.profile,
            ProfileStatus::Produced {
                links_before: 1,
                links_after: 0
            }
        );
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.contains("dropped 1 of 1 links (https://example.org/docs)"))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn survey_reads_pages_and_links_off_the_runtime() {
        let survey = Survey::of(&linked_document().pdf).await;
        assert_eq!(survey.pages.len(), 1);
        assert_eq!(survey.pages[0].0.round() as i32, 595);
        assert_eq!(survey.links, 1);
        assert_eq!(survey.uris, vec!["https://example.org/docs".to_string()]);

        let garbage = Survey::of(b"not a pdf").await;
        assert!(garbage.pages.is_empty());
        assert_eq!(garbage.links, 0);
    }

    #[tokio::test]
    async fn preserving_converter_leaves_no_warning() {
        let mut report = PipelineReport::begin(String::new());
        let out = finalizer(Some(Arc::new(Identity)))
            .finalize(linked_document(), &policy(true), &mut report)
            .await;
        assert!(out.is_archival_profile);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_converter_degrades() {
        let mut report = PipelineReport::begin(String::new());
        let out = finalizer(None)
            .finalize(linked_document(), &policy(true), &mut report)
            .await;
        assert!(!out.is_archival_profile);
        assert!(matches!(report.profile, ProfileStatus::Failed { .. }));
    }
}
