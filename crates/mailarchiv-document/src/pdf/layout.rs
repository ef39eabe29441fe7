// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text flow for the built-in page renderer.
//
// Bodies are turned into blocks of words, where each word remembers the link
// it belongs to. Wrapping then yields lines whose link spans are expressed in
// character columns, which the writer maps to annotation rectangles.

use std::sync::LazyLock;

use mailarchiv_mime::html::decode_entities;
use regex::Regex;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("static regex"));

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("static regex")
});

static ALT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\balt\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("static regex")
});

/// Typeface family of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    /// Proportional body text (html bodies).
    Body,
    /// Bold heading text.
    Heading,
    /// Fixed-width text; whitespace is kept as written (plain-text bodies).
    Mono,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub href: Option<String>,
}

impl Word {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: None,
        }
    }
}

/// A paragraph: one or more wrapped lines in a single style.
/// An empty block renders as a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub style: BlockStyle,
    pub words: Vec<Word>,
}

/// A link run within a wrapped line, in character columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub len: usize,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrappedLine {
    pub text: String,
    pub links: Vec<LineSpan>,
}

// -- Plain text ---------------------------------------------------------------

/// One mono block per source line; bare `http(s)://` URLs become links.
pub fn blocks_from_text(text: &str) -> Vec<Block> {
    text.lines()
        .map(|line| {
            let line = line.replace('\t', "    ");
            let mut words = Vec::new();
            let mut last = 0;
            for found in URL.find_iter(&line) {
                if found.start() > last {
                    words.push(Word::plain(&line[last..found.start()]));
                }
                words.push(Word {
                    text: found.as_str().to_string(),
                    href: Some(found.as_str().to_string()),
                });
                last = found.end();
            }
            if last < line.len() {
                words.push(Word::plain(&line[last..]));
            }
            Block {
                style: BlockStyle::Mono,
                words,
            }
        })
        .collect()
}

// -- HTML ---------------------------------------------------------------------

/// Flatten html into blocks, keeping `<a href>` targets on their words.
///
/// Scripts, styles and `<head>` are skipped, block-level tags start a new
/// block, headings are bold, and images are replaced by their alt text.
pub fn blocks_from_html(html: &str) -> Vec<Block> {
    let mut builder = HtmlBlocks::default();
    let mut rest = html;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }
        if rest.starts_with('<') {
            let opens_tag = rest[1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
            match rest.find('>') {
                Some(end) if opens_tag => {
                    builder.tag(&rest[1..end]);
                    rest = &rest[end + 1..];
                }
                _ => {
                    builder.text("<");
                    rest = &rest[1..];
                }
            }
            continue;
        }
        let end = rest.find('<').unwrap_or(rest.len());
        builder.text(&rest[..end]);
        rest = &rest[end..];
    }

    builder.finish()
}

struct HtmlBlocks {
    blocks: Vec<Block>,
    words: Vec<Word>,
    style: BlockStyle,
    href: Option<String>,
    /// Depth inside elements whose text is not rendered.
    skip: usize,
    /// Previous text ended mid-word, so the next text continues that word.
    glue: bool,
}

impl Default for HtmlBlocks {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            words: Vec::new(),
            style: BlockStyle::Body,
            href: None,
            skip: 0,
            glue: false,
        }
    }
}

impl HtmlBlocks {
    fn tag(&mut self, raw: &str) {
        let raw = raw.trim();
        let closing = raw.starts_with('/');
        let body = raw.trim_start_matches('/');
        let name = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match name.as_str() {
            "script" | "style" | "head" | "title" => {
                if closing {
                    self.skip = self.skip.saturating_sub(1);
                } else if !raw.ends_with('/') {
                    self.skip += 1;
                }
            }
            _ if self.skip > 0 => {}
            "br" => self.flush(true),
            "p" | "div" | "tr" | "table" | "blockquote" | "ul" | "ol" | "hr" | "pre"
            | "section" | "article" | "header" | "footer" => self.flush(false),
            "li" => {
                self.flush(false);
                if !closing {
                    self.words.push(Word::plain("-"));
                }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush(false);
                self.style = if closing {
                    BlockStyle::Body
                } else {
                    BlockStyle::Heading
                };
            }
            "td" | "th" => self.glue = false,
            "a" => {
                self.href = if closing {
                    None
                } else {
                    attribute(&HREF, body)
                        .filter(|href| !href.to_ascii_lowercase().starts_with("javascript:"))
                };
            }
            "img" => {
                let alt = attribute(&ALT, body).filter(|alt| !alt.trim().is_empty());
                let label = alt.map_or_else(|| "[image]".to_string(), |alt| format!("[{alt}]"));
                self.words.push(Word {
                    text: label,
                    href: self.href.clone(),
                });
                self.glue = false;
            }
            _ => {}
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip > 0 {
            return;
        }
        let decoded = decode_entities(raw);
        if decoded.trim().is_empty() {
            self.glue = false;
            return;
        }

        let starts_with_space = decoded.starts_with(char::is_whitespace);
        for (i, piece) in decoded.split_whitespace().enumerate() {
            let continues = i == 0 && !starts_with_space && self.glue;
            match self.words.last_mut() {
                Some(last) if continues && last.href == self.href => last.text.push_str(piece),
                _ => self.words.push(Word {
                    text: piece.to_string(),
                    href: self.href.clone(),
                }),
            }
        }
        self.glue = !decoded.ends_with(char::is_whitespace);
    }

    fn flush(&mut self, force: bool) {
        if force || !self.words.is_empty() {
            self.blocks.push(Block {
                style: self.style,
                words: std::mem::take(&mut self.words),
            });
        }
        self.glue = false;
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush(false);

        // At most one blank line in a row, none at the end.
        let mut blocks: Vec<Block> = Vec::with_capacity(self.blocks.len());
        for block in self.blocks {
            let blank = block.words.is_empty();
            let prev_blank = blocks.last().is_none_or(|b| b.words.is_empty());
            if blank && prev_blank {
                continue;
            }
            blocks.push(block);
        }
        while blocks.last().is_some_and(|b| b.words.is_empty()) {
            blocks.pop();
        }
        blocks
    }
}

fn attribute(pattern: &Regex, tag_body: &str) -> Option<String> {
    let captures = pattern.captures(tag_body)?;
    let value = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?;
    Some(decode_entities(value.as_str()))
}

// -- Wrapping -----------------------------------------------------------------

/// Wrap a block to at most `max_chars` columns.
///
/// Proportional blocks word-wrap with single spaces; mono blocks hard-wrap
/// and keep their whitespace. Words longer than a line are force-broken.
/// An empty block yields one empty line.
pub fn wrap_block(block: &Block, max_chars: usize) -> Vec<WrappedLine> {
    let max_chars = max_chars.max(1);
    let lines = match block.style {
        BlockStyle::Mono => wrap_mono(&block.words, max_chars),
        BlockStyle::Body | BlockStyle::Heading => wrap_words(&block.words, max_chars),
    };
    if lines.is_empty() {
        vec![WrappedLine::default()]
    } else {
        lines
    }
}

#[derive(Default)]
struct LineBuilder {
    line: WrappedLine,
    len: usize,
}

impl LineBuilder {
    fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append characters, extending the previous link span when the href
    /// continues.
    fn push(&mut self, text: &str, href: Option<&str>) {
        let count = text.chars().count();
        if let Some(href) = href {
            match self.line.links.last_mut() {
                Some(span) if span.href == href && span.start + span.len == self.len => {
                    span.len += count;
                }
                _ => self.line.links.push(LineSpan {
                    start: self.len,
                    len: count,
                    href: href.to_string(),
                }),
            }
        }
        self.line.text.push_str(text);
        self.len += count;
    }

    fn finish(self) -> WrappedLine {
        self.line
    }
}

fn wrap_words(words: &[Word], max_chars: usize) -> Vec<WrappedLine> {
    let mut lines = Vec::new();
    let mut current = LineBuilder::default();

    for word in words {
        for piece in break_long(&word.text, max_chars) {
            let count = piece.chars().count();
            if !current.is_empty() && current.len + 1 + count > max_chars {
                lines.push(std::mem::take(&mut current).finish());
            }
            if !current.is_empty() {
                // The gap belongs to the link only when both neighbours do.
                let joins_link = word.href.is_some()
                    && current
                        .line
                        .links
                        .last()
                        .is_some_and(|span| {
                            Some(span.href.as_str()) == word.href.as_deref()
                                && span.start + span.len == current.len
                        });
                current.push(" ", if joins_link { word.href.as_deref() } else { None });
            }
            current.push(&piece, word.href.as_deref());
        }
    }

    if !current.is_empty() {
        lines.push(current.finish());
    }
    lines
}

fn wrap_mono(words: &[Word], max_chars: usize) -> Vec<WrappedLine> {
    let mut lines = Vec::new();
    let mut current = LineBuilder::default();

    for word in words {
        for ch in word.text.chars() {
            if current.len == max_chars {
                lines.push(std::mem::take(&mut current).finish());
            }
            let mut buf = [0u8; 4];
            current.push(ch.encode_utf8(&mut buf), word.href.as_deref());
        }
    }

    if !current.is_empty() {
        lines.push(current.finish());
    }
    lines
}

/// Split a word into chunks of at most `max_chars` characters.
fn break_long(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
