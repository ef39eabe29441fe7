// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-run outcome report returned to the host next to the document bytes.
// The core never persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BodyKind, OutcomeKind, PageSource};

/// One line of the report per attachment or attached message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReport {
    /// Position in depth-first document order.
    pub index: usize,
    pub filename: String,
    pub content_type: String,
    pub outcome: OutcomeKind,
    /// Exclusion or failure reason; `None` for converted parts.
    pub reason: Option<String>,
}

/// State of the optional archival-profile step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProfileStatus {
    NotRequested,
    Produced {
        links_before: usize,
        links_after: usize,
    },
    /// `ProfileConversionFailed`: the non-profile document was returned.
    Failed { reason: String },
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    /// `Message-ID` of the archived message, without angle brackets.
    pub message_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub body_used: BodyKind,
    pub converted: usize,
    pub excluded: usize,
    pub failed: usize,
    pub parts: Vec<PartReport>,
    pub sources: Vec<PageSource>,
    pub page_count: usize,
    pub is_archival_profile: bool,
    pub profile: ProfileStatus,
    /// Degradations the host should surface (lost links, profile fallback).
    pub warnings: Vec<String>,
    /// SHA-256 of the raw input message.
    pub message_sha256: String,
    /// SHA-256 of the returned document.
    pub document_sha256: String,
}

impl PipelineReport {
    /// Start a report for a run that begins now.
    pub fn begin(message_sha256: String) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            message_id: None,
            started_at: now,
            finished_at: now,
            body_used: BodyKind::None,
            converted: 0,
            excluded: 0,
            failed: 0,
            parts: Vec::new(),
            sources: Vec::new(),
            page_count: 0,
            is_archival_profile: false,
            profile: ProfileStatus::NotRequested,
            warnings: Vec::new(),
            message_sha256,
            document_sha256: String::new(),
        }
    }

    /// Record one part and bump the matching counter.
    pub fn record_part(&mut self, part: PartReport) {
        match part.outcome {
            OutcomeKind::Converted => self.converted += 1,
            OutcomeKind::Excluded => self.excluded += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        self.parts.push(part);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_degraded(&self) -> bool {
        self.failed > 0 || !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(index: usize, outcome: OutcomeKind) -> PartReport {
        PartReport {
            index,
            filename: format!("file-{index}"),
            content_type: "application/octet-stream".into(),
            outcome,
            reason: None,
        }
    }

    #[test]
    fn counters_follow_recorded_parts() {
        let mut report = PipelineReport::begin(String::new());
        report.record_part(part(0, OutcomeKind::Converted));
        report.record_part(part(1, OutcomeKind::Excluded));
        report.record_part(part(2, OutcomeKind::Failed));
        report.record_part(part(3, OutcomeKind::Converted));

        assert_eq!(report.converted, 2);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.is_degraded());
    }

    #[test]
    fn report_serialises_profile_status_with_tag() {
        let mut report = PipelineReport::begin("abc".into());
        report.profile = ProfileStatus::Failed {
            reason: "engine down".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["profile"]["status"], "failed");
        assert_eq!(json["body_used"], "none");
    }
}
