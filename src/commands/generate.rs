//! Generate static files

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::BuildManifest;
use crate::generator::Generator;
use crate::prismic::ContentSource;
use crate::Blog;

/// Generate the site from the configured Prismic repository
///
/// The output is self-contained except for the list page's load-more
/// control, which fetches from `/api/posts` and therefore needs the server.
pub async fn run(blog: &Blog) -> Result<BuildManifest> {
    let source = blog.content_source()?;
    run_with_source(blog, source).await
}

/// Generate the site from any content source
pub async fn run_with_source(
    blog: &Blog,
    source: Arc<dyn ContentSource>,
) -> Result<BuildManifest> {
    let start = Instant::now();

    let generator = Generator::new(blog, source)?;
    let manifest = generator.generate().await?;

    let duration = start.elapsed();
    tracing::info!(
        "Generated {} pages in {:.2}s",
        manifest.routes().len(),
        duration.as_secs_f64()
    );

    Ok(manifest)
}
