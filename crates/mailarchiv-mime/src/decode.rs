// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Message tree decoder — raw message bytes to `MessageTree`.
//
// `mail-parser` resolves transfer encodings and charsets; this module adds the
// structural checks it is lenient about (header syntax, unterminated
// boundaries, nesting depth) and maps its flat part list onto the typed tree
// in document order.

use chrono::DateTime;
use encoding_rs::{Encoding, UTF_8};
use mail_parser::{Addr, Address, Message, MessageParser, MimeHeaders, PartType};
use tracing::{debug, instrument, warn};

use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::types::{Disposition, MessageMeta, MessagePart, MessageTree, PartInfo};

/// Default nesting guard (multipart containers and attached messages).
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Decodes raw messages into typed trees.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    max_depth: usize,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl MessageDecoder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Parse `raw` into a tree, or fail with `MalformedMessage`.
    #[instrument(skip_all, fields(bytes_len = raw.len()))]
    pub fn decode(&self, raw: &[u8]) -> Result<MessageTree> {
        let bytes = skip_from_line(raw);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ArchiveError::MalformedMessage("empty message".into()));
        }

        validate_header_block(bytes)?;

        let message = MessageParser::default().parse(bytes).ok_or_else(|| {
            ArchiveError::MalformedMessage("no parsable header block".into())
        })?;

        let tree = self.build_tree(&message, 0)?;
        debug!(parts = tree.parts.len(), "message decoded");
        Ok(tree)
    }

    fn build_tree(&self, message: &Message<'_>, depth: usize) -> Result<MessageTree> {
        let mut parts = Vec::new();
        self.walk(message, 0, depth, &mut parts)?;
        Ok(MessageTree {
            meta: extract_meta(message),
            parts,
        })
    }

    fn walk(
        &self,
        message: &Message<'_>,
        id: usize,
        depth: usize,
        out: &mut Vec<MessagePart>,
    ) -> Result<()> {
        if depth > self.max_depth {
            return Err(ArchiveError::MalformedMessage(format!(
                "parts nested deeper than {} levels",
                self.max_depth
            )));
        }

        let part = message.parts.get(id).ok_or_else(|| {
            ArchiveError::MalformedMessage(format!("dangling part reference {id}"))
        })?;

        match &part.body {
            PartType::Multipart(children) => {
                check_boundary_terminated(message, part)?;
                for child in children {
                    self.walk(message, *child as usize, depth + 1, out)?;
                }
            }
            PartType::Message(nested) => {
                let tree = self.build_tree(nested, depth + 1)?;
                out.push(MessagePart::NestedMessage(tree));
            }
            PartType::Text(text) => {
                let mut info = leaf_info(part, "text/plain");
                if is_listed_body(message, id) {
                    info.content = text.as_bytes().to_vec();
                    out.push(MessagePart::TextBody(info));
                } else {
                    info.content = reencode(text, info.charset.as_deref());
                    out.push(MessagePart::Attachment(info));
                }
            }
            PartType::Html(html) => {
                let mut info = leaf_info(part, "text/html");
                if is_listed_body(message, id) {
                    info.content = html.as_bytes().to_vec();
                    out.push(MessagePart::HtmlBody(info));
                } else {
                    info.content = reencode(html, info.charset.as_deref());
                    out.push(MessagePart::Attachment(info));
                }
            }
            PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
                let mut info = leaf_info(part, "application/octet-stream");
                info.content = bytes.to_vec();
                out.push(MessagePart::Attachment(info));
            }
        }

        if part.is_encoding_problem {
            warn!(part = id, "part had a transfer-encoding problem, content may be partial");
        }
        Ok(())
    }
}

/// Whether `mail-parser` listed part `id` as a displayable body of `message`.
fn is_listed_body(message: &Message<'_>, id: usize) -> bool {
    message
        .text_body
        .iter()
        .chain(message.html_body.iter())
        .any(|body| *body as usize == id)
}

/// Header-derived metadata of a leaf; `content` is filled in by the caller.
fn leaf_info(part: &mail_parser::MessagePart<'_>, fallback_type: &str) -> PartInfo {
    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| fallback_type.to_string())
        .to_ascii_lowercase();

    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(|c| c.to_ascii_lowercase());

    let disposition = match part
        .content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase())
        .as_deref()
    {
        Some("inline") => Disposition::Inline,
        Some("attachment") => Disposition::Attachment,
        _ => Disposition::Unspecified,
    };

    PartInfo {
        content_type,
        charset,
        filename: part.attachment_name().map(str::to_string),
        content_id: part
            .content_id()
            .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string()),
        disposition,
        content: Vec::new(),
    }
}

/// Text attachments come back from the parser as UTF-8; re-encode them to
/// their declared charset so the archived bytes match what was attached.
fn reencode(text: &str, charset: Option<&str>) -> Vec<u8> {
    match charset.and_then(|label| Encoding::for_label(label.as_bytes())) {
        Some(encoding) if encoding != UTF_8 => {
            let (bytes, _, had_errors) = encoding.encode(text);
            if had_errors {
                debug!(charset = encoding.name(), "unmappable characters while re-encoding");
            }
            bytes.into_owned()
        }
        _ => text.as_bytes().to_vec(),
    }
}

fn extract_meta(message: &Message<'_>) -> MessageMeta {
    MessageMeta {
        subject: message.subject().map(str::to_string),
        from: message
            .from()
            .and_then(|addr| addr.first())
            .map(format_addr)
            .filter(|s| !s.is_empty()),
        to: address_list(message.to()),
        cc: address_list(message.cc()),
        date: message
            .date()
            .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok()),
        message_id: message.message_id().map(str::to_string),
    }
}

fn format_addr(addr: &Addr<'_>) -> String {
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

fn address_list(addr: Option<&Address<'_>>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    let formatted: Vec<String> = match addr {
        Address::List(list) => list.iter().map(format_addr).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().map(format_addr))
            .collect(),
    };
    formatted.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Skip a BOM and the `From ` separator line of mbox-exported messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Reject header blocks with lines that are neither `name: value` fields nor
/// folded continuations.
fn validate_header_block(data: &[u8]) -> Result<()> {
    let mut seen_field = false;

    for (number, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            if !seen_field {
                return Err(ArchiveError::MalformedMessage(
                    "header block starts with a continuation line".into(),
                ));
            }
            continue;
        }

        let valid_field = line
            .iter()
            .position(|&b| b == b':')
            .is_some_and(|colon| colon > 0 && line[..colon].iter().all(|&b| (33..=126).contains(&b)));
        if !valid_field {
            return Err(ArchiveError::MalformedMessage(format!(
                "invalid header syntax on line {}",
                number + 1
            )));
        }
        seen_field = true;
    }

    if seen_field {
        Ok(())
    } else {
        Err(ArchiveError::MalformedMessage("missing header block".into()))
    }
}

/// A multipart container must be closed by `--boundary--`.
fn check_boundary_terminated(
    message: &Message<'_>,
    part: &mail_parser::MessagePart<'_>,
) -> Result<()> {
    let Some(boundary) = part.content_type().and_then(|ct| ct.attribute("boundary")) else {
        return Err(ArchiveError::MalformedMessage(
            "multipart container without boundary parameter".into(),
        ));
    };

    let closing = format!("--{boundary}--");
    let raw = message.raw_message();
    let terminated = raw
        .windows(closing.len())
        .any(|window| window == closing.as_bytes());

    if terminated {
        Ok(())
    } else {
        Err(ArchiveError::MalformedMessage(format!(
            "unterminated multipart boundary \"{boundary}\""
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    const ALTERNATIVE: &str = concat!(
        "From: Alice Example <alice@example.com>\n",
        "To: bob@example.com, Carol <carol@example.com>\n",
        "Subject: Quarterly report\n",
        "Date: Tue, 4 Mar 2025 09:30:00 +0100\n",
        "MIME-Version: 1.0\n",
        "Content-Type: multipart/alternative; boundary=\"alt\"\n",
        "\n",
        "--alt\n",
        "Content-Type: text/plain; charset=utf-8\n",
        "\n",
        "Plain version\n",
        "--alt\n",
        "Content-Type: text/html; charset=utf-8\n",
        "\n",
        "<p>Html version</p>\n",
        "--alt--\n",
    );

    fn decode(raw: &str) -> Result<MessageTree> {
        MessageDecoder::default().decode(raw.as_bytes())
    }

    #[test]
    fn single_part_text_message() {
        let tree = decode("From: a@example.com\nSubject: Hi\n\nHello\n").unwrap();
        assert_eq!(tree.parts.len(), 1);
        match &tree.parts[0] {
            MessagePart::TextBody(info) => assert_eq!(info.text().trim(), "Hello"),
            other => panic!("expected text body, got {other:?}"),
        }
        assert_eq!(tree.meta.subject.as_deref(), Some("Hi"));
        assert_eq!(tree.meta.from.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn alternative_keeps_document_order_and_meta() {
        let tree = decode(ALTERNATIVE).unwrap();
        assert!(matches!(tree.parts[0], MessagePart::TextBody(_)));
        assert!(matches!(tree.parts[1], MessagePart::HtmlBody(_)));
        assert_eq!(tree.meta.from.as_deref(), Some("Alice Example <alice@example.com>"));
        assert_eq!(
            tree.meta.to,
            vec!["bob@example.com".to_string(), "Carol <carol@example.com>".to_string()]
        );
        let date = tree.meta.date.expect("date parsed");
        assert_eq!(date.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn base64_attachment_is_decoded_byte_for_byte() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&payload);
        let raw = format!(
            concat!(
                "From: a@example.com\n",
                "Subject: data\n",
                "Content-Type: multipart/mixed; boundary=\"mix\"\n",
                "\n",
                "--mix\n",
                "Content-Type: text/plain\n",
                "\n",
                "see attached\n",
                "--mix\n",
                "Content-Type: application/octet-stream; name=\"blob.bin\"\n",
                "Content-Disposition: attachment; filename=\"blob.bin\"\n",
                "Content-Transfer-Encoding: base64\n",
                "\n",
                "{}\n",
                "--mix--\n",
            ),
            encoded
        );
        let tree = decode(&raw).unwrap();
        let attachment = tree.attachments().next().expect("one attachment");
        assert_eq!(attachment.filename.as_deref(), Some("blob.bin"));
        assert_eq!(attachment.disposition, Disposition::Attachment);
        assert_eq!(attachment.content, payload);
    }

    #[test]
    fn quoted_printable_latin1_body_becomes_utf8() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: cafe\n",
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=E9\n",
        );
        let tree = decode(raw).unwrap();
        match &tree.parts[0] {
            MessagePart::TextBody(info) => {
                assert_eq!(info.text().trim(), "café");
                assert_eq!(info.charset.as_deref(), Some("iso-8859-1"));
            }
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[test]
    fn latin1_text_attachment_keeps_original_bytes() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: notes\n",
            "Content-Type: multipart/mixed; boundary=\"b\"\n",
            "\n",
            "--b\n",
            "Content-Type: text/plain\n",
            "\n",
            "body\n",
            "--b\n",
            "Content-Type: text/plain; charset=iso-8859-1; name=\"notes.txt\"\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\n",
            "Content-Transfer-Encoding: quoted-printable\n",
            "\n",
            "caf=E9\n",
            "--b--\n",
        );
        let tree = decode(raw).unwrap();
        let attachment = tree.attachments().next().expect("attachment");
        assert!(attachment.content.starts_with(&[b'c', b'a', b'f', 0xE9]));
    }

    #[test]
    fn nested_message_keeps_its_own_tree() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: Fwd: original\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\n",
            "\n",
            "--outer\n",
            "Content-Type: text/plain\n",
            "\n",
            "forwarding this\n",
            "--outer\n",
            "Content-Type: message/rfc822\n",
            "\n",
            "From: b@example.com\n",
            "Subject: original\n",
            "Content-Type: text/plain\n",
            "\n",
            "inner body\n",
            "--outer--\n",
        );
        let tree = decode(raw).unwrap();
        assert_eq!(tree.parts.len(), 2);
        match &tree.parts[1] {
            MessagePart::NestedMessage(inner) => {
                assert_eq!(inner.meta.subject.as_deref(), Some("original"));
                assert!(matches!(inner.parts[0], MessagePart::TextBody(_)));
            }
            other => panic!("expected nested message, got {other:?}"),
        }
    }

    #[test]
    fn nesting_guard_rejects_deep_trees() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: deep\n",
            "Content-Type: multipart/mixed; boundary=\"outer\"\n",
            "\n",
            "--outer\n",
            "Content-Type: message/rfc822\n",
            "\n",
            "From: b@example.com\n",
            "Subject: inner\n",
            "\n",
            "inner body\n",
            "--outer--\n",
        );
        let shallow = MessageDecoder::new(1).decode(raw.as_bytes());
        assert!(matches!(shallow, Err(ArchiveError::MalformedMessage(_))));
        assert!(MessageDecoder::default().decode(raw.as_bytes()).is_ok());
    }

    #[test]
    fn unterminated_boundary_is_malformed() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: broken\n",
            "Content-Type: multipart/mixed; boundary=\"never\"\n",
            "\n",
            "--never\n",
            "Content-Type: text/plain\n",
            "\n",
            "body without end\n",
        );
        assert!(matches!(decode(raw), Err(ArchiveError::MalformedMessage(_))));
    }

    #[test]
    fn invalid_header_line_is_malformed() {
        let raw = "From: a@example.com\nthis is not a header\nSubject: x\n\nbody\n";
        let err = decode(raw).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(decode("  \n"), Err(ArchiveError::MalformedMessage(_))));
    }

    #[test]
    fn mbox_separator_line_is_skipped() {
        let raw = "From alice@example.com Thu Jan 01 00:00:00 2024\nFrom: alice@example.com\nSubject: T\n\nBody\n";
        let tree = decode(raw).unwrap();
        assert_eq!(tree.meta.subject.as_deref(), Some("T"));
    }

    #[test]
    fn content_id_loses_angle_brackets() {
        let raw = concat!(
            "From: a@example.com\n",
            "Subject: logo\n",
            "Content-Type: multipart/related; boundary=\"rel\"\n",
            "\n",
            "--rel\n",
            "Content-Type: text/html\n",
            "\n",
            "<img src=\"cid:logo@x\">\n",
            "--rel\n",
            "Content-Type: image/png; name=\"logo.png\"\n",
            "Content-Disposition: inline; filename=\"logo.png\"\n",
            "Content-ID: <logo@x>\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "iVBORw0KGgo=\n",
            "--rel--\n",
        );
        let tree = decode(raw).unwrap();
        let image = tree.attachments().next().expect("inline image");
        assert_eq!(image.content_id.as_deref(), Some("logo@x"));
        assert_eq!(image.disposition, Disposition::Inline);
        assert_eq!(image.content_type, "image/png");
    }
}
