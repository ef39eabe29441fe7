// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attachment classifier — decides, per part and without looking at any other
// part's outcome, whether it is converted, rendered as an attached message,
// or excluded.
//
// The result is a flat plan in depth-first document order: an attached
// message is followed directly by its own attachments.

use std::collections::BTreeSet;

use mailarchiv_convert::{ConversionRequest, Resource};
use mailarchiv_core::{
    ArchivalPolicy, BodyKind, ConsumptionScope, Disposition, ExclusionReason, MessageMeta,
    MessagePart, MessageTree, PartInfo, PipelineConfig, SelectedBody,
};
use mailarchiv_mime::html::referenced_content_ids;
use mailarchiv_mime::select_body;
use tracing::debug;

/// A part the html body shows inline, shipped to the renderer by filename.
#[derive(Debug, Clone)]
pub struct InlineResource {
    pub content_id: String,
    pub resource: Resource,
}

/// Everything needed to render one message's banner and body.
#[derive(Debug, Clone, Default)]
pub struct BodyPlan {
    pub meta: MessageMeta,
    pub body: Option<SelectedBody>,
    pub resources: Vec<InlineResource>,
    /// `name (size)` of this message's own attachments that will be converted.
    pub listed: Vec<String>,
}

impl BodyPlan {
    pub fn body_kind(&self) -> BodyKind {
        self.body.as_ref().map_or(BodyKind::None, |b| b.kind)
    }
}

#[derive(Debug, Clone)]
pub enum PlanItem {
    Convert {
        index: usize,
        request: ConversionRequest,
    },
    Exclude {
        index: usize,
        filename: String,
        content_type: String,
        reason: ExclusionReason,
    },
    /// Attached message, rendered like the root.
    Nested {
        index: usize,
        label: String,
        plan: BodyPlan,
    },
}

impl PlanItem {
    pub fn index(&self) -> usize {
        match self {
            Self::Convert { index, .. } | Self::Exclude { index, .. } | Self::Nested { index, .. } => {
                *index
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub root: BodyPlan,
    pub items: Vec<PlanItem>,
}

/// Build the plan for `tree`, whose body was already selected by the caller.
pub fn plan(
    tree: &MessageTree,
    root_body: Option<SelectedBody>,
    policy: ArchivalPolicy,
    config: &PipelineConfig,
) -> Plan {
    let mut walker = Walker {
        policy,
        config,
        items: Vec::new(),
        counter: 0,
    };
    let root = walker.walk(tree, root_body);
    debug!(items = walker.items.len(), "attachments classified");
    Plan {
        root,
        items: walker.items,
    }
}

/// Label of an attached message: its subject.
pub fn nested_label(tree: &MessageTree) -> String {
    tree.meta
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no subject)")
        .to_string()
}

/// Content-IDs referenced by the html of one message.
struct ContentIds<'a> {
    /// By the selected html body.
    referenced: &'a BTreeSet<String>,
    /// By html parts that were not selected.
    unused: &'a BTreeSet<String>,
}

struct Walker<'a> {
    policy: ArchivalPolicy,
    config: &'a PipelineConfig,
    items: Vec<PlanItem>,
    /// Running attachment number across the whole tree, starting at 1.
    counter: usize,
}

impl Walker<'_> {
    fn next_index(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    fn walk(&mut self, tree: &MessageTree, body: Option<SelectedBody>) -> BodyPlan {
        let shows_html = body.as_ref().is_some_and(|b| b.kind == BodyKind::Html);
        let referenced: BTreeSet<String> = match &body {
            Some(selected) if shows_html => referenced_content_ids(&selected.content),
            _ => BTreeSet::new(),
        };
        // Inline parts of an html alternative that lost to the text body.
        let unused: BTreeSet<String> = if shows_html {
            BTreeSet::new()
        } else {
            tree.parts
                .iter()
                .filter_map(|part| match part {
                    MessagePart::HtmlBody(info) => Some(referenced_content_ids(&info.text())),
                    _ => None,
                })
                .flatten()
                .collect()
        };
        let cids = ContentIds {
            referenced: &referenced,
            unused: &unused,
        };
        let mut plan = BodyPlan {
            meta: tree.meta.clone(),
            body,
            resources: Vec::new(),
            listed: Vec::new(),
        };

        for part in &tree.parts {
            match part {
                MessagePart::TextBody(_) | MessagePart::HtmlBody(_) => {}
                MessagePart::Attachment(info) => {
                    let index = self.next_index();
                    let item = self.classify(index, info, &cids, &mut plan);
                    self.items.push(item);
                }
                MessagePart::NestedMessage(inner) => {
                    let index = self.next_index();
                    let label = nested_label(inner);
                    if self.policy.scope == ConsumptionScope::MailOnly {
                        self.items.push(PlanItem::Exclude {
                            index,
                            filename: label,
                            content_type: "message/rfc822".into(),
                            reason: ExclusionReason::OutOfScope,
                        });
                        // Inner attachments still need their own outcome.
                        self.walk(inner, None);
                        continue;
                    }
                    // Reserve the slot so the message precedes its attachments.
                    let slot = self.items.len();
                    self.items.push(PlanItem::Nested {
                        index,
                        label: label.clone(),
                        plan: BodyPlan::default(),
                    });
                    let inner_body = select_body(inner, self.policy.body_preference);
                    let inner_plan = self.walk(inner, inner_body);
                    self.items[slot] = PlanItem::Nested {
                        index,
                        label,
                        plan: inner_plan,
                    };
                }
            }
        }
        plan
    }

    fn classify(
        &self,
        index: usize,
        info: &PartInfo,
        cids: &ContentIds<'_>,
        plan: &mut BodyPlan,
    ) -> PlanItem {
        let filename = info
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| format!("attachment-{index}"), str::to_string);

        let exclude = |reason| PlanItem::Exclude {
            index,
            filename: filename.clone(),
            content_type: info.content_type.clone(),
            reason,
        };

        if self.policy.scope == ConsumptionScope::MailOnly {
            return exclude(ExclusionReason::OutOfScope);
        }
        if self.config.is_excluded_type(&info.content_type) {
            return exclude(ExclusionReason::Signature);
        }
        if let Some(content_id) = info
            .content_id
            .as_ref()
            .filter(|cid| cids.referenced.contains(cid.as_str()))
        {
            plan.resources.push(InlineResource {
                content_id: content_id.clone(),
                resource: Resource {
                    filename: filename.clone(),
                    content_type: info.content_type.clone(),
                    content: info.content.clone(),
                },
            });
            return exclude(ExclusionReason::EmbeddedInBody);
        }
        if info.disposition != Disposition::Attachment
            && info
                .content_id
                .as_ref()
                .is_some_and(|cid| cids.unused.contains(cid.as_str()))
        {
            return exclude(ExclusionReason::UnusedAlternative);
        }

        plan.listed.push(format!(
            "{filename} ({})",
            humansize::format_size(info.size(), humansize::BINARY)
        ));
        PlanItem::Convert {
            index,
            request: ConversionRequest {
                content: info.content.clone(),
                content_type: info.content_type.clone(),
                charset: info.charset.clone(),
                filename,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailarchiv_core::{BodyPreference, Disposition};

    fn part(content_type: &str, filename: Option<&str>, cid: Option<&str>) -> PartInfo {
        PartInfo {
            content_type: content_type.into(),
            charset: None,
            filename: filename.map(Into::into),
            content_id: cid.map(Into::into),
            disposition: Disposition::Attachment,
            content: vec![0; 2048],
        }
    }

    fn html_body(html: &str) -> SelectedBody {
        SelectedBody {
            kind: BodyKind::Html,
            content: html.into(),
            charset: None,
        }
    }

    fn policy(scope: ConsumptionScope) -> ArchivalPolicy {
        ArchivalPolicy {
            scope,
            body_preference: BodyPreference::PreferText,
            produce_archival_profile: false,
        }
    }

    fn kinds(plan: &Plan) -> Vec<String> {
        plan.items
            .iter()
            .map(|item| match item {
                PlanItem::Convert { request, .. } => format!("convert {}", request.filename),
                PlanItem::Exclude {
                    filename, reason, ..
                } => format!("exclude {filename} ({reason})"),
                PlanItem::Nested { label, .. } => format!("nested {label}"),
            })
            .collect()
    }

    #[test]
    fn signatures_are_excluded_and_others_converted() {
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::Attachment(part("image/png", Some("a.png"), None)),
                MessagePart::Attachment(part("application/pkcs7-signature", Some("smime.p7s"), None)),
            ],
        };
        let plan = plan(
            &tree,
            None,
            policy(ConsumptionScope::MailAndAttachments),
            &PipelineConfig::default(),
        );
        assert_eq!(
            kinds(&plan),
            vec!["convert a.png", "exclude smime.p7s (signature)"]
        );
        assert_eq!(plan.root.listed, vec!["a.png (2 KiB)".to_string()]);
    }

    #[test]
    fn mail_only_excludes_everything_as_out_of_scope() {
        let inner = MessageTree::default();
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::Attachment(part("image/png", Some("a.png"), None)),
                MessagePart::NestedMessage(inner),
            ],
        };
        let plan = plan(&tree, None, policy(ConsumptionScope::MailOnly), &PipelineConfig::default());
        assert_eq!(
            kinds(&plan),
            vec![
                "exclude a.png (out of scope)",
                "exclude (no subject) (out of scope)"
            ]
        );
        assert!(plan.root.listed.is_empty());
    }

    #[test]
    fn mail_only_still_reports_attachments_of_attached_messages() {
        let inner = MessageTree {
            meta: MessageMeta {
                subject: Some("Inner".into()),
                ..Default::default()
            },
            parts: vec![MessagePart::Attachment(part("image/png", Some("inner.png"), None))],
        };
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::NestedMessage(inner),
                MessagePart::Attachment(part("image/png", Some("a.png"), None)),
            ],
        };
        let plan = plan(&tree, None, policy(ConsumptionScope::MailOnly), &PipelineConfig::default());
        assert_eq!(
            kinds(&plan),
            vec![
                "exclude Inner (out of scope)",
                "exclude inner.png (out of scope)",
                "exclude a.png (out of scope)"
            ]
        );
        let indices: Vec<usize> = plan.items.iter().map(PlanItem::index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn inline_parts_of_the_unselected_html_are_dropped() {
        let mut logo = part("image/png", Some("logo.png"), Some("logo@x"));
        logo.disposition = Disposition::Inline;
        let mut html = part("text/html", None, None);
        html.content = br#"<img src="cid:logo@x">"#.to_vec();
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::HtmlBody(html),
                MessagePart::Attachment(logo),
                // Same cid, but sent as a real attachment.
                MessagePart::Attachment(part("image/png", Some("copy.png"), Some("logo@x"))),
            ],
        };
        let text = SelectedBody {
            kind: BodyKind::Text,
            content: "Hi there".into(),
            charset: None,
        };
        let plan = plan(
            &tree,
            Some(text),
            policy(ConsumptionScope::MailAndAttachments),
            &PipelineConfig::default(),
        );
        assert_eq!(
            kinds(&plan),
            vec!["exclude logo.png (inline in unused html body)", "convert copy.png"]
        );
        assert!(plan.root.resources.is_empty());
        assert_eq!(plan.root.listed, vec!["copy.png (2 KiB)".to_string()]);
    }

    #[test]
    fn referenced_inline_parts_become_resources() {
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::Attachment(part("image/png", Some("logo.png"), Some("logo@x"))),
                MessagePart::Attachment(part("image/png", None, Some("unused@x"))),
            ],
        };
        let body = html_body(r#"<img src="cid:logo@x">"#);
        let plan = plan(
            &tree,
            Some(body),
            policy(ConsumptionScope::MailAndAttachments),
            &PipelineConfig::default(),
        );
        assert_eq!(
            kinds(&plan),
            vec!["exclude logo.png (embedded in body)", "convert attachment-2"]
        );
        assert_eq!(plan.root.resources.len(), 1);
        assert_eq!(plan.root.resources[0].content_id, "logo@x");
        assert_eq!(plan.root.resources[0].resource.filename, "logo.png");
    }

    #[test]
    fn nested_message_precedes_its_attachments() {
        let inner = MessageTree {
            meta: MessageMeta {
                subject: Some("Forwarded".into()),
                ..Default::default()
            },
            parts: vec![MessagePart::Attachment(part("application/pdf", Some("inner.pdf"), None))],
        };
        let tree = MessageTree {
            meta: MessageMeta::default(),
            parts: vec![
                MessagePart::NestedMessage(inner),
                MessagePart::Attachment(part("image/png", Some("outer.png"), None)),
            ],
        };
        let plan = plan(
            &tree,
            None,
            policy(ConsumptionScope::MailAndAttachments),
            &PipelineConfig::default(),
        );
        assert_eq!(
            kinds(&plan),
            vec!["nested Forwarded", "convert inner.pdf", "convert outer.png"]
        );
        let indices: Vec<usize> = plan.items.iter().map(PlanItem::index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        match &plan.items[0] {
            PlanItem::Nested { plan, .. } => {
                assert_eq!(plan.listed, vec!["inner.pdf (2 KiB)".to_string()])
            }
            other => panic!("unexpected item {other:?}"),
        }
    }
}
