// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTML body helpers: inline-resource references, page-CSS stripping, and a
// plain-text rendition for the host's search index.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static CID_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)cid:([^"'\s)>]+)"#).expect("static regex"));

static PAGE_CSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{page:.*?\}").expect("static regex"));

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>").expect("static regex")
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/?p|/?div|/?tr|/?li|/?h[1-6]|/?table|/?blockquote)\b[^>]*>")
        .expect("static regex")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// Content-IDs referenced from the html via `cid:` URLs.
pub fn referenced_content_ids(html: &str) -> BTreeSet<String> {
    CID_REF
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Replace `cid:<id>` references with the resource's filename so a renderer
/// that receives the resources next to the html can resolve them.
pub fn rewrite_cid_references<'a>(
    html: &str,
    resources: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut out = html.to_string();
    for (content_id, filename) in resources {
        out = out.replace(&format!("cid:{content_id}"), filename);
    }
    out
}

/// Remove `{page: …}` CSS rules, which would push the body onto its own page
/// after the banner.
pub fn strip_page_css(html: &str) -> String {
    PAGE_CSS.replace_all(html, "").into_owned()
}

/// Convert HTML to plain text for indexing.
///
/// Block elements become line breaks, `<a href="url">text</a>` stays as its
/// text, scripts, styles and `<head>` are dropped, common entities are
/// decoded, and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, "");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    collapse_blank_lines(&text)
}

/// Collapse consecutive blank lines and trim every line.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut prev_was_blank = true;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }
    cleaned.trim_end().to_string()
}

/// Decode the named entities mail clients actually emit plus numeric ones.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|&end| end <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };

        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
