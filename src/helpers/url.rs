//! URL helper functions

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::config::SiteConfig;
use crate::content::DocumentLink;

/// Characters escaped in a single path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Generate a URL with the root path
///
/// # Examples
/// ```ignore
/// url_for(&config, "/images/logo.svg") // -> "/blog/images/logo.svg"
/// ```
pub fn url_for(config: &SiteConfig, path: &str) -> String {
    let root = config.root.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        format!("{}/", root)
    } else {
        format!("{}/{}", root, path)
    }
}

/// Encode one URL path segment
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Public URL of a post page
pub fn post_url(config: &SiteConfig, uid: &str) -> String {
    url_for(config, &format!("post/{}", encode_segment(uid)))
}

/// URL of the load-more endpoint
pub fn api_posts_url(config: &SiteConfig) -> String {
    url_for(config, "api/posts")
}

/// Resolve a link to another CMS document
pub fn document_url(config: &SiteConfig, link: &DocumentLink) -> String {
    match (&link.doc_type, &link.uid) {
        (Some(doc_type), Some(uid)) if *doc_type == config.prismic.document_type => {
            post_url(config, uid)
        }
        _ => url_for(config, "/"),
    }
}

/// Whether a uid can be used as a single file-system path segment
pub fn is_safe_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid != "."
        && uid != ".."
        && !uid.contains(['/', '\\', '\0'])
}
