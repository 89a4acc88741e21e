//! spacetraveling: a blog front-end rendered from a Prismic repository
//!
//! Posts live in a headless CMS. This crate fetches them over the Prismic
//! REST API, renders a paginated list page and one page per post with
//! embedded Tera templates, and either writes them out as static files or
//! serves them with on-demand rendering and periodic revalidation.

pub mod cache;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod feed;
pub mod generator;
pub mod helpers;
pub mod prismic;
pub mod server;
pub mod templates;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::prismic::{ContentSource, PrismicClient};

/// The blog application
#[derive(Debug, Clone)]
pub struct Blog {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
    /// Static assets copied verbatim into the output
    pub static_dir: PathBuf,
}

impl Blog {
    /// Create a blog from a directory, reading `_config.yml` when present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let mut config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            tracing::debug!("No _config.yml in {:?}, using defaults", base_dir);
            config::SiteConfig::default()
        };
        config.apply_env();

        Ok(Self::with_config(base_dir, config))
    }

    /// Create a blog from an already loaded configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let public_dir = base_dir.join(&config.public_dir);
        let static_dir = base_dir.join(&config.static_dir);

        Self {
            config,
            base_dir,
            public_dir,
            static_dir,
        }
    }

    /// Client for the configured Prismic repository
    pub fn content_source(&self) -> Result<Arc<dyn ContentSource>> {
        Ok(Arc::new(PrismicClient::new(&self.config.prismic)?))
    }

    /// Directory holding the build manifest
    pub fn manifest_dir(&self) -> PathBuf {
        self.base_dir.join(cache::CACHE_DIR)
    }

    /// Clean the public directory and the build manifest
    pub fn clean(&self) -> anyhow::Result<()> {
        commands::clean::run(self)
    }
}
