//! HTML helper functions

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Generate an image tag; `src` and `alt` are escaped
pub fn image_tag(src: &str, alt: &str) -> String {
    format!(r#"<img src="{}" alt="{}">"#, html_escape(src), html_escape(alt))
}
