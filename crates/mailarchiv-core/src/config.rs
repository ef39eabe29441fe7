// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Archival policy and pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Which parts of a message end up in the archived document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionScope {
    /// Only the banner and the selected body.
    MailOnly,
    /// Banner, body, then every attachment converted (or placeholdered).
    MailAndAttachments,
}

/// Which body representation wins when a message carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPreference {
    PreferText,
    PreferHtml,
}

/// Per-run policy supplied by the host. Immutable for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalPolicy {
    pub scope: ConsumptionScope,
    pub body_preference: BodyPreference,
    pub produce_archival_profile: bool,
}

impl Default for ArchivalPolicy {
    fn default() -> Self {
        Self {
            scope: ConsumptionScope::MailAndAttachments,
            body_preference: BodyPreference::PreferText,
            produce_archival_profile: false,
        }
    }
}

/// What to do when a message has neither a text nor an html body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoBodyPolicy {
    /// Abort the run with `ArchiveError::NoBodyAvailable`.
    Fail,
    /// Render the banner alone and continue with the attachments.
    AttachmentsOnly,
}

/// Engine settings shared by every run of one `Archiver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on concurrently running attachment conversions.
    pub max_concurrent_conversions: usize,
    pub attachment_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub profile_timeout_secs: u64,
    /// Bound on a whole run; `None` leaves it to the caller.
    pub run_timeout_secs: Option<u64>,
    pub no_body: NoBodyPolicy,
    /// Content types that are never converted nor placeholdered.
    pub excluded_content_types: Vec<String>,
    pub paper_size: crate::PaperSize,
    /// `chrono` format string for the banner's Date row.
    pub date_format: String,
    /// Nesting guard for multipart containers and attached messages.
    pub max_nesting_depth: usize,
    /// Retries for transient converter errors (transport failures only).
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_conversions: 4,
            attachment_timeout_secs: 60,
            render_timeout_secs: 60,
            profile_timeout_secs: 120,
            run_timeout_secs: None,
            no_body: NoBodyPolicy::AttachmentsOnly,
            excluded_content_types: vec![
                "application/pkcs7-signature".into(),
                "application/x-pkcs7-signature".into(),
                "application/pgp-signature".into(),
            ],
            paper_size: crate::PaperSize::A4,
            date_format: "%d.%m.%Y %H:%M".into(),
            max_nesting_depth: 10,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl PipelineConfig {
    pub fn attachment_timeout(&self) -> Duration {
        Duration::from_secs(self.attachment_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_secs(self.profile_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Whether `content_type` belongs to the exclusion set (case-insensitive,
    /// parameters ignored).
    pub fn is_excluded_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        self.excluded_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(essence))
    }

    /// Reject settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_conversions == 0 {
            return Err(ArchiveError::Config(
                "max_concurrent_conversions must be at least 1".into(),
            ));
        }
        if self.attachment_timeout_secs == 0
            || self.render_timeout_secs == 0
            || self.profile_timeout_secs == 0
        {
            return Err(ArchiveError::Config("timeouts must be non-zero".into()));
        }
        if self.max_nesting_depth == 0 {
            return Err(ArchiveError::Config(
                "max_nesting_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_types_excluded_by_default() {
        let config = PipelineConfig::default();
        assert!(config.is_excluded_type("application/pkcs7-signature"));
        assert!(config.is_excluded_type("Application/X-PKCS7-Signature; name=smime.p7s"));
        assert!(!config.is_excluded_type("application/pdf"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = PipelineConfig {
            max_concurrent_conversions: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ArchiveError::Config(_))));
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn policy_uses_snake_case_on_the_wire() {
        let json = r#"{"scope":"mail_only","body_preference":"prefer_html","produce_archival_profile":true}"#;
        let policy: ArchivalPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.scope, ConsumptionScope::MailOnly);
        assert_eq!(policy.body_preference, BodyPreference::PreferHtml);
        assert!(policy.produce_archival_profile);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"max_concurrent_conversions": 8}"#).unwrap();
        assert_eq!(config.max_concurrent_conversions, 8);
        assert_eq!(config.attachment_timeout_secs, 60);
        assert_eq!(config.no_body, NoBodyPolicy::AttachmentsOnly);
    }
}
