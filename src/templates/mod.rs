//! Built-in spacetraveling templates using the Tera template engine
//!
//! Templates are embedded in the binary. Autoescaping is off: every value
//! placed in a view struct is already HTML-safe, either escaped when the
//! view is built or passed through the sanitizer for rich-text bodies.

use anyhow::Result;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::reading_time::estimate_minutes;
use crate::content::richtext::as_html;
use crate::content::sanitize::sanitize_html;
use crate::content::{PostDetail, PostSummary};
use crate::helpers::{
    date_xml, document_url, format_publication_date, html_escape, image_tag, post_url, url_for,
};

/// Default logo written when the static directory has none
pub const DEFAULT_LOGO: &str = include_str!("spacetraveling/logo.svg");

/// Seconds between reloads of the loading placeholder
const LOADING_REFRESH_SECS: u64 = 1;

/// Template renderer with the embedded theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        // View structs carry pre-escaped HTML
        tera.autoescape_on(vec![]);

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("spacetraveling/layout.html")),
            ("index.html", include_str!("spacetraveling/index.html")),
            ("post.html", include_str!("spacetraveling/post.html")),
            ("loading.html", include_str!("spacetraveling/loading.html")),
            ("error.html", include_str!("spacetraveling/error.html")),
            // Partials
            (
                "partials/header.html",
                include_str!("spacetraveling/partials/header.html"),
            ),
            (
                "partials/post_items.html",
                include_str!("spacetraveling/partials/post_items.html"),
            ),
        ])?;

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }

    /// The list page
    pub fn render_index(
        &self,
        site: &SiteData,
        posts: &[PostCardData],
        next_page: Option<&str>,
        api_url: &str,
    ) -> Result<String> {
        let mut context = Context::new();
        context.insert("site", site);
        context.insert("posts", posts);
        context.insert("next_page", &next_page.map(html_escape));
        context.insert("api_url", &html_escape(api_url));
        self.render("index.html", &context)
    }

    /// Only the list items, appended by the load-more script
    pub fn render_post_items(&self, posts: &[PostCardData]) -> Result<String> {
        let mut context = Context::new();
        context.insert("posts", posts);
        self.render("partials/post_items.html", &context)
    }

    /// A post page
    pub fn render_post(&self, site: &SiteData, post: &PostPageData) -> Result<String> {
        let mut context = Context::new();
        context.insert("site", site);
        context.insert("post", post);
        self.render("post.html", &context)
    }

    /// Placeholder shown while a post is generated on demand
    pub fn render_loading(&self, site: &SiteData) -> Result<String> {
        let mut context = Context::new();
        context.insert("site", site);
        context.insert("refresh_secs", &LOADING_REFRESH_SECS);
        self.render("loading.html", &context)
    }

    /// Error page; `retry` adds a reload link
    pub fn render_error(
        &self,
        site: &SiteData,
        heading: &str,
        message: &str,
        retry: bool,
    ) -> Result<String> {
        let mut context = Context::new();
        context.insert("site", site);
        context.insert("heading", &html_escape(heading));
        context.insert("message", &html_escape(message));
        context.insert("retry", &retry);
        self.render("error.html", &context)
    }
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub language: String,
    pub home_url: String,
    /// `<img>` tag of the header logo
    pub logo: String,
}

impl SiteData {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            title: html_escape(&config.title),
            language: html_escape(&config.language),
            home_url: html_escape(&url_for(config, "/")),
            logo: image_tag(&url_for(config, &config.logo), "logo"),
        }
    }
}

/// One entry of the post list
#[derive(Debug, Clone, Serialize)]
pub struct PostCardData {
    pub href: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub date: String,
    pub datetime: Option<String>,
}

impl PostCardData {
    pub fn new(config: &SiteConfig, post: &PostSummary) -> Self {
        let date = post.first_publication_date.as_deref();
        Self {
            href: html_escape(&post_url(config, &post.uid)),
            title: html_escape(&post.data.title),
            subtitle: html_escape(&post.data.subtitle),
            author: html_escape(&post.data.author),
            date: html_escape(&format_publication_date(date, &config.language, config.tz())),
            datetime: date_xml(date),
        }
    }
}

/// A full post page
#[derive(Debug, Clone, Serialize)]
pub struct PostPageData {
    pub uid: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub date: String,
    pub datetime: Option<String>,
    /// `<img>` tag of the banner
    pub banner: Option<String>,
    pub reading_time: String,
    pub sections: Vec<SectionData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionData {
    pub heading: String,
    /// Sanitized HTML of the rich-text body
    pub body: String,
}

impl PostPageData {
    pub fn new(config: &SiteConfig, post: &PostDetail) -> Self {
        let date = post.first_publication_date.as_deref();
        let resolve = |link: &crate::content::DocumentLink| document_url(config, link);
        let minutes = estimate_minutes(&post.data.content, config.words_per_minute);

        Self {
            uid: html_escape(&post.uid),
            title: html_escape(&post.data.title),
            subtitle: html_escape(&post.data.subtitle),
            author: html_escape(&post.data.author),
            date: html_escape(&format_publication_date(date, &config.language, config.tz())),
            datetime: date_xml(date),
            banner: post
                .data
                .banner
                .as_ref()
                .map(|banner| image_tag(&banner.url, "Banner")),
            reading_time: format!("{} min", minutes),
            sections: post
                .data
                .content
                .iter()
                .map(|section| SectionData {
                    heading: html_escape(&section.heading),
                    body: sanitize_html(&as_html(&section.body, &resolve)),
                })
                .collect(),
        }
    }
}

/// View data of a list of posts
pub fn post_cards(config: &SiteConfig, posts: &[PostSummary]) -> Vec<PostCardData> {
    posts.iter().map(|p| PostCardData::new(config, p)).collect()
}
