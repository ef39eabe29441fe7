// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Body selector — exactly one representation (text or html) per message.

use mailarchiv_core::config::BodyPreference;
use mailarchiv_core::types::{BodyKind, MessagePart, MessageTree, PartInfo, SelectedBody};
use tracing::debug;

/// Pick the body that goes into the archive.
///
/// `PreferText` takes the text body when present, else the html body;
/// `PreferHtml` mirrors that. Only the message's own parts are considered,
/// never those of attached messages. Whitespace-only bodies count as absent.
/// Returns `None` when neither representation exists.
pub fn select_body(tree: &MessageTree, preference: BodyPreference) -> Option<SelectedBody> {
    let order = match preference {
        BodyPreference::PreferText => [BodyKind::Text, BodyKind::Html],
        BodyPreference::PreferHtml => [BodyKind::Html, BodyKind::Text],
    };

    let selected = order
        .into_iter()
        .find_map(|kind| collect(tree, kind));

    match &selected {
        Some(body) => debug!(kind = ?body.kind, len = body.content.len(), "body selected"),
        None => debug!("no body representation available"),
    }
    selected
}

fn collect(tree: &MessageTree, kind: BodyKind) -> Option<SelectedBody> {
    let parts: Vec<&PartInfo> = tree
        .parts
        .iter()
        .filter_map(|part| match (part, kind) {
            (MessagePart::TextBody(info), BodyKind::Text) => Some(info),
            (MessagePart::HtmlBody(info), BodyKind::Html) => Some(info),
            _ => None,
        })
        .filter(|info| !info.text().trim().is_empty())
        .collect();

    let first = parts.first()?;
    let separator = match kind {
        BodyKind::Html => "\n",
        _ => "\n\n",
    };
    let content = parts
        .iter()
        .map(|info| info.text().into_owned())
        .collect::<Vec<_>>()
        .join(separator);

    Some(SelectedBody {
        kind,
        content,
        charset: first.charset.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailarchiv_core::types::{Disposition, MessageMeta};

    fn info(content: &str) -> PartInfo {
        PartInfo {
            content_type: "text/plain".into(),
            charset: Some("utf-8".into()),
            filename: None,
            content_id: None,
            disposition: Disposition::Unspecified,
            content: content.as_bytes().to_vec(),
        }
    }

    fn tree(parts: Vec<MessagePart>) -> MessageTree {
        MessageTree {
            meta: MessageMeta::default(),
            parts,
        }
    }

    #[test]
    fn text_only_wins_under_both_preferences() {
        let t = tree(vec![MessagePart::TextBody(info("Hello"))]);
        for pref in [BodyPreference::PreferText, BodyPreference::PreferHtml] {
            let body = select_body(&t, pref).unwrap();
            assert_eq!(body.kind, BodyKind::Text);
            assert_eq!(body.content, "Hello");
        }
    }

    #[test]
    fn preference_decides_when_both_exist() {
        let t = tree(vec![
            MessagePart::TextBody(info("plain")),
            MessagePart::HtmlBody(info("<p>rich</p>")),
        ]);
        let text = select_body(&t, BodyPreference::PreferText).unwrap();
        assert_eq!((text.kind, text.content.as_str()), (BodyKind::Text, "plain"));
        let html = select_body(&t, BodyPreference::PreferHtml).unwrap();
        assert_eq!((html.kind, html.content.as_str()), (BodyKind::Html, "<p>rich</p>"));
    }

    #[test]
    fn blank_text_falls_back_to_html() {
        let t = tree(vec![
            MessagePart::TextBody(info("  \n")),
            MessagePart::HtmlBody(info("<b>x</b>")),
        ]);
        let body = select_body(&t, BodyPreference::PreferText).unwrap();
        assert_eq!(body.kind, BodyKind::Html);
    }

    #[test]
    fn nested_bodies_are_ignored() {
        let inner = tree(vec![MessagePart::TextBody(info("inner"))]);
        let t = tree(vec![MessagePart::NestedMessage(inner)]);
        assert!(select_body(&t, BodyPreference::PreferText).is_none());
    }

    #[test]
    fn several_parts_of_one_kind_are_joined_in_order() {
        let t = tree(vec![
            MessagePart::TextBody(info("first")),
            MessagePart::Attachment(info("ignored")),
            MessagePart::TextBody(info("second")),
        ]);
        let body = select_body(&t, BodyPreference::PreferText).unwrap();
        assert_eq!(body.content, "first\n\nsecond");
    }
}
