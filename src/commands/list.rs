//! List site content

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::cache::BuildManifest;
use crate::config::SiteConfig;
use crate::content::{fetch_post_list, PostSummary};
use crate::feed::PostFeed;
use crate::helpers::format_publication_date;
use crate::prismic::ContentSource;
use crate::Blog;

/// List site content by type
pub async fn run(blog: &Blog, content_type: &str) -> Result<()> {
    match content_type {
        "post" | "posts" => {
            let source = blog.content_source()?;
            let posts = list_posts(source.as_ref(), &blog.config).await?;
            println!("Posts ({}):", posts.len());
            for post in posts {
                println!(
                    "  {} - {} [{}]",
                    format_publication_date(
                        post.first_publication_date.as_deref(),
                        &blog.config.language,
                        blog.config.tz()
                    ),
                    post.data.title,
                    post.uid
                );
            }
        }
        "route" | "routes" => {
            let Some(manifest) = BuildManifest::load(&blog.base_dir) else {
                bail!("No build manifest found. Run `spacetraveling generate` first.");
            };
            let routes = manifest.routes();
            println!("Routes ({}):", routes.len());
            for route in routes {
                println!("  {}", route);
            }
        }
        _ => {
            bail!("Unknown type: {}. Available: post, route", content_type);
        }
    }

    Ok(())
}

/// Every post, walking the list with the load-more feed
pub async fn list_posts(
    source: &dyn ContentSource,
    config: &SiteConfig,
) -> Result<Vec<PostSummary>> {
    let feed = PostFeed::new(fetch_post_list(source, &config.prismic).await?);
    let mut seen = HashSet::new();

    while let Some(cursor) = feed.next_page() {
        if !seen.insert(cursor.clone()) {
            tracing::warn!("Cursor {} repeats, stopping", cursor);
            break;
        }
        feed.load_more(source).await?;
    }

    Ok(feed.posts())
}
