//! Generator module - renders pages from the content source with the built-in templates

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::cache::{unix_now, BuildManifest};
use crate::content::{fetch_post, fetch_post_list, fetch_post_uids, PostSummary};
use crate::helpers::{api_posts_url, is_safe_uid};
use crate::prismic::ContentSource;
use crate::templates::{post_cards, PostPageData, SiteData, TemplateRenderer, DEFAULT_LOGO};
use crate::{Blog, Error};

/// Route of a post page
pub fn post_route(uid: &str) -> String {
    format!("/post/{}", uid)
}

/// Output file of a route, relative to the public directory
pub fn output_path(route: &str) -> String {
    let route = route.trim_matches('/');
    if route.is_empty() {
        "index.html".to_string()
    } else {
        format!("{}/index.html", route)
    }
}

/// Whether a failed render was caused by an unknown uid
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::NotFound { .. }))
}

/// Page generator backed by a content source
pub struct Generator {
    blog: Blog,
    source: Arc<dyn ContentSource>,
    renderer: TemplateRenderer,
}

impl Generator {
    /// Create a new generator
    pub fn new(blog: &Blog, source: Arc<dyn ContentSource>) -> Result<Self> {
        let renderer = TemplateRenderer::new()?;

        Ok(Self {
            blog: blog.clone(),
            source,
            renderer,
        })
    }

    pub fn blog(&self) -> &Blog {
        &self.blog
    }

    pub fn source(&self) -> &dyn ContentSource {
        self.source.as_ref()
    }

    fn site_data(&self) -> SiteData {
        SiteData::new(&self.blog.config)
    }

    /// Render the list page from the first page of posts
    pub async fn build_index(&self) -> Result<String> {
        let config = &self.blog.config;
        let pagination = fetch_post_list(self.source(), &config.prismic).await?;
        tracing::debug!(
            posts = pagination.results.len(),
            has_more = pagination.next_page.is_some(),
            "Fetched post list"
        );

        self.renderer.render_index(
            &self.site_data(),
            &post_cards(config, &pagination.results),
            pagination.next_page.as_deref(),
            &api_posts_url(config),
        )
    }

    /// Render one post page
    ///
    /// Content errors are kept as [`Error`] inside the returned
    /// `anyhow::Error`, so callers can tell an unknown uid apart with
    /// [`is_not_found`].
    pub async fn build_post(&self, uid: &str) -> Result<String> {
        let config = &self.blog.config;
        let post = fetch_post(self.source(), &config.prismic, uid).await?;
        self.renderer
            .render_post(&self.site_data(), &PostPageData::new(config, &post))
    }

    /// List items appended by the load-more control
    pub fn render_post_items(&self, posts: &[PostSummary]) -> Result<String> {
        self.renderer
            .render_post_items(&post_cards(&self.blog.config, posts))
    }

    pub fn render_loading(&self) -> Result<String> {
        self.renderer.render_loading(&self.site_data())
    }

    pub fn render_error(&self, heading: &str, message: &str, retry: bool) -> Result<String> {
        self.renderer
            .render_error(&self.site_data(), heading, message, retry)
    }

    /// Write a rendered route below the public directory
    ///
    /// Returns the output path relative to the public directory.
    pub fn write_page(&self, route: &str, html: &str) -> Result<String> {
        let relative = output_path(route);
        let path = self.blog.public_dir.join(&relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        fs::write(&path, html).with_context(|| format!("Failed to write: {:?}", path))?;
        tracing::debug!("Generated: {:?}", path);

        Ok(relative)
    }

    /// Generate the entire site
    pub async fn generate(&self) -> Result<BuildManifest> {
        let config = &self.blog.config;
        fs::create_dir_all(&self.blog.public_dir)?;

        self.copy_static_assets()?;

        let mut manifest = BuildManifest::new(config.revalidate);

        // List page
        let index = self
            .build_index()
            .await
            .context("Failed to build the post list")?;
        self.write_page("/", &index)?;
        manifest.index_generated_at = unix_now();

        // Post pages
        let uids: Vec<String> = fetch_post_uids(self.source(), &config.prismic)
            .await
            .context("Failed to enumerate posts")?
            .into_iter()
            .filter(|uid| {
                let safe = is_safe_uid(uid);
                if !safe {
                    tracing::warn!("Skipping post with unusable uid {:?}", uid);
                }
                safe
            })
            .collect();

        let rendered: Vec<(String, Result<String>)> = stream::iter(uids)
            .map(|uid| async move {
                let html = self.build_post(&uid).await;
                (uid, html)
            })
            .buffer_unordered(config.build_concurrency.max(1))
            .collect()
            .await;

        for (uid, html) in rendered {
            match html {
                Ok(html) => {
                    let path = self.write_page(&post_route(&uid), &html)?;
                    manifest.posts.insert(uid, path);
                }
                Err(e) if is_not_found(&e) => {
                    tracing::warn!("Post '{}' disappeared during the build, skipping", uid);
                }
                Err(e) => return Err(e.context(format!("Failed to build post '{}'", uid))),
            }
        }

        tracing::info!("Generated {} post pages", manifest.posts.len());

        manifest.generated_at = unix_now();
        manifest.save(&self.blog.base_dir)?;

        Ok(manifest)
    }

    /// Copy the static directory into the public directory
    ///
    /// Writes the default logo when the configured local logo is missing.
    pub fn copy_static_assets(&self) -> Result<usize> {
        let static_dir = &self.blog.static_dir;
        let public_dir = &self.blog.public_dir;
        let mut copied = 0;

        if static_dir.exists() {
            for entry in WalkDir::new(static_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }

                let relative = path.strip_prefix(static_dir)?;
                let dest = public_dir.join(relative);

                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::copy(path, &dest)
                    .with_context(|| format!("Failed to copy {:?} to {:?}", path, dest))?;
                copied += 1;
            }
        }

        if let Some(logo) = local_asset(&self.blog.config.logo) {
            let dest = public_dir.join(logo);
            if !dest.exists() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&dest, DEFAULT_LOGO)?;
                tracing::debug!("Wrote default logo to {:?}", dest);
            }
        }

        tracing::debug!("Copied {} static files", copied);
        Ok(copied)
    }
}

/// A site-relative asset path that may be written below the public directory
fn local_asset(path: &str) -> Option<&Path> {
    if path.contains("://") || path.starts_with("//") {
        return None;
    }
    let relative = path.trim_start_matches('/');
    if relative.is_empty() || relative.split('/').any(|s| s == "..") {
        return None;
    }
    Some(Path::new(relative))
}
