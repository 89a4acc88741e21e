//! Prismic rich text: block model plus HTML and plain-text serialization

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::helpers::html_escape;

/// One block of a rich-text field
///
/// The block type is kept as the raw string so that blocks this renderer does
/// not understand survive a copy unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    // image blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,

    // embed blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oembed: Option<Embed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

/// A formatting span over `text`, offsets in UTF-16 code units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Target of a hyperlink span pointing at another CMS document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentLink {
    pub id: Option<String>,
    pub uid: Option<String>,
    pub doc_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading(u8),
    Paragraph,
    Preformatted,
    ListItem,
    OrderedListItem,
    Image,
    Embed,
    Unknown,
}

impl RichTextBlock {
    /// A paragraph block without spans
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::with_text("paragraph", text)
    }

    /// A text block of the given type without spans
    pub fn with_text(kind: &str, text: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            text: Some(text.into()),
            spans: Vec::new(),
            label: None,
            url: None,
            alt: None,
            dimensions: None,
            oembed: None,
        }
    }

    fn block_kind(&self) -> BlockKind {
        match self.kind.as_str() {
            "paragraph" => BlockKind::Paragraph,
            "preformatted" => BlockKind::Preformatted,
            "list-item" => BlockKind::ListItem,
            "o-list-item" => BlockKind::OrderedListItem,
            "image" => BlockKind::Image,
            "embed" => BlockKind::Embed,
            other => match other.strip_prefix("heading").and_then(|n| n.parse::<u8>().ok()) {
                Some(level @ 1..=6) => BlockKind::Heading(level),
                _ => BlockKind::Unknown,
            },
        }
    }
}

/// Plain text of a rich-text field, blocks joined by a single space
pub fn as_text(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serialize a rich-text field to HTML
///
/// Blocks are concatenated without separators. Consecutive list items are
/// grouped into one `<ul>`/`<ol>`. Document links are turned into URLs by
/// `resolve`. The output is not sanitized; see [`super::sanitize`].
pub fn as_html(blocks: &[RichTextBlock], resolve: &dyn Fn(&DocumentLink) -> String) -> String {
    let mut out = String::new();
    let mut i = 0;

    while i < blocks.len() {
        let kind = blocks[i].block_kind();
        match kind {
            BlockKind::ListItem | BlockKind::OrderedListItem => {
                let list_tag = if kind == BlockKind::ListItem { "ul" } else { "ol" };
                out.push_str(&format!("<{}>", list_tag));
                while i < blocks.len() && blocks[i].block_kind() == kind {
                    push_text_element(&mut out, "li", &blocks[i], resolve);
                    i += 1;
                }
                out.push_str(&format!("</{}>", list_tag));
            }
            _ => {
                push_block(&mut out, &blocks[i], kind, resolve);
                i += 1;
            }
        }
    }

    out
}

fn push_block(
    out: &mut String,
    block: &RichTextBlock,
    kind: BlockKind,
    resolve: &dyn Fn(&DocumentLink) -> String,
) {
    match kind {
        BlockKind::Heading(level) => {
            push_text_element(out, &format!("h{}", level), block, resolve)
        }
        BlockKind::Paragraph => push_text_element(out, "p", block, resolve),
        BlockKind::Preformatted => push_text_element(out, "pre", block, resolve),
        BlockKind::Image => {
            let Some(url) = block.url.as_deref().filter(|u| !u.is_empty()) else {
                tracing::debug!("Skipping image block without url");
                return;
            };
            let size = block
                .dimensions
                .map(|d| format!(r#" width="{}" height="{}""#, d.width, d.height))
                .unwrap_or_default();
            out.push_str(&format!(
                r#"<p class="block-img"><img src="{}" alt="{}"{}></p>"#,
                html_escape(url),
                html_escape(block.alt.as_deref().unwrap_or("")),
                size
            ));
        }
        BlockKind::Embed => {
            let embed = block.oembed.clone().unwrap_or_default();
            out.push_str(&format!(
                r#"<div data-oembed="{}" data-oembed-type="{}" data-oembed-provider="{}">{}</div>"#,
                html_escape(embed.embed_url.as_deref().unwrap_or("")),
                html_escape(embed.kind.as_deref().unwrap_or("")),
                html_escape(&embed.provider_name.unwrap_or_default().to_lowercase()),
                embed.html.unwrap_or_default()
            ));
        }
        BlockKind::ListItem | BlockKind::OrderedListItem => {
            push_text_element(out, "li", block, resolve)
        }
        BlockKind::Unknown => {
            tracing::debug!("Skipping unknown rich text block '{}'", block.kind);
        }
    }
}

fn push_text_element(
    out: &mut String,
    tag: &str,
    block: &RichTextBlock,
    resolve: &dyn Fn(&DocumentLink) -> String,
) {
    let class = block
        .label
        .as_deref()
        .map(|l| format!(r#" class="{}""#, html_escape(l)))
        .unwrap_or_default();
    let text = block.text.as_deref().unwrap_or("");

    out.push_str(&format!("<{}{}>", tag, class));
    out.push_str(&render_spans(text, &block.spans, resolve));
    out.push_str(&format!("</{}>", tag));
}

/// Inline markup produced by a span
#[derive(Debug, Clone, PartialEq)]
enum SpanTag {
    Strong,
    Em,
    Link { href: String, target: Option<String> },
    Label(String),
}

impl SpanTag {
    fn from_span(span: &Span, resolve: &dyn Fn(&DocumentLink) -> String) -> Option<Self> {
        let data = span.data.as_ref();
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        match span.kind.as_str() {
            "strong" => Some(SpanTag::Strong),
            "em" => Some(SpanTag::Em),
            "hyperlink" => {
                let href = match field("link_type").as_deref() {
                    Some("Document") => resolve(&DocumentLink {
                        id: field("id"),
                        uid: field("uid"),
                        doc_type: field("type"),
                    }),
                    _ => field("url")?,
                };
                if href.is_empty() {
                    return None;
                }
                Some(SpanTag::Link {
                    href,
                    target: field("target"),
                })
            }
            "label" => field("label").map(SpanTag::Label),
            other => {
                tracing::debug!("Skipping unknown span '{}'", other);
                None
            }
        }
    }

    fn open(&self) -> String {
        match self {
            SpanTag::Strong => "<strong>".to_string(),
            SpanTag::Em => "<em>".to_string(),
            SpanTag::Link { href, target } => match target {
                Some(target) => format!(
                    r#"<a href="{}" target="{}">"#,
                    html_escape(href),
                    html_escape(target)
                ),
                None => format!(r#"<a href="{}">"#, html_escape(href)),
            },
            SpanTag::Label(label) => format!(r#"<span class="{}">"#, html_escape(label)),
        }
    }

    fn close(&self) -> &'static str {
        match self {
            SpanTag::Strong => "</strong>",
            SpanTag::Em => "</em>",
            SpanTag::Link { .. } => "</a>",
            SpanTag::Label(_) => "</span>",
        }
    }
}

/// Render text with its spans as properly nested inline markup
///
/// Text is cut at every span boundary. For each piece the set of covering
/// spans is computed, outer spans first; tags that stop covering are closed
/// and new ones opened, so overlapping spans still yield well-formed HTML.
fn render_spans(text: &str, spans: &[Span], resolve: &dyn Fn(&DocumentLink) -> String) -> String {
    let mut ranges: Vec<(usize, usize, SpanTag)> = spans
        .iter()
        .filter_map(|span| {
            let start = utf16_to_byte(text, span.start);
            let end = utf16_to_byte(text, span.end);
            if start >= end {
                return None;
            }
            SpanTag::from_span(span, resolve).map(|tag| (start, end, tag))
        })
        .collect();
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut cuts: Vec<usize> = vec![0, text.len()];
    for (start, end, _) in &ranges {
        cuts.push(*start);
        cuts.push(*end);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = String::with_capacity(text.len());
    let mut open: Vec<usize> = Vec::new();

    for window in cuts.windows(2) {
        let (from, to) = (window[0], window[1]);
        let active: Vec<usize> = ranges
            .iter()
            .enumerate()
            .filter(|(_, (start, end, _))| *start <= from && *end >= to)
            .map(|(i, _)| i)
            .collect();

        let keep = open
            .iter()
            .zip(&active)
            .take_while(|(a, b)| a == b)
            .count();
        while open.len() > keep {
            if let Some(idx) = open.pop() {
                out.push_str(ranges[idx].2.close());
            }
        }
        for &idx in &active[keep..] {
            out.push_str(&ranges[idx].2.open());
            open.push(idx);
        }

        out.push_str(&escape_text(&text[from..to]));
    }

    while let Some(idx) = open.pop() {
        out.push_str(ranges[idx].2.close());
    }

    out
}

fn escape_text(text: &str) -> String {
    html_escape(text).replace('\n', "<br />")
}

/// Byte offset of a UTF-16 code-unit offset, clamped to the text length
fn utf16_to_byte(text: &str, unit: usize) -> usize {
    let mut units = 0;
    for (byte, ch) in text.char_indices() {
        if units >= unit {
            return byte;
        }
        units += ch.len_utf16();
    }
    text.len()
}
