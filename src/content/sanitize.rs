//! Allow-list sanitizer for CMS-provided markup
//!
//! Rich-text HTML is treated as untrusted: only the tags and attributes the
//! rich-text serializer can legitimately produce survive.

use std::collections::{HashMap, HashSet};

const TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "ul", "ol", "li", "strong", "em", "a",
    "span", "br", "img", "div", "iframe",
];

const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "target"]),
    ("img", &["src", "alt", "width", "height"]),
    (
        "div",
        &["data-oembed", "data-oembed-type", "data-oembed-provider"],
    ),
    (
        "iframe",
        &["src", "width", "height", "frameborder", "allowfullscreen"],
    ),
];

const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Strip everything outside the allow-list from `html`
pub fn sanitize_html(html: &str) -> String {
    let tag_attributes: HashMap<&str, HashSet<&str>> = TAG_ATTRIBUTES
        .iter()
        .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
        .collect();

    ammonia::Builder::empty()
        .tags(TAGS.iter().copied().collect())
        .clean_content_tags(HashSet::from(["script", "style"]))
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::from(["class"]))
        .url_schemes(URL_SCHEMES.iter().copied().collect())
        .link_rel(Some("noopener noreferrer"))
        .clean(html)
        .to_string()
}
