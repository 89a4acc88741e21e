//! Site configuration (_config.yml)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// Environment variable overriding `prismic.endpoint`
pub const ENDPOINT_ENV: &str = "PRISMIC_API_ENDPOINT";
/// Environment variable overriding `prismic.access_token`
pub const ACCESS_TOKEN_ENV: &str = "PRISMIC_ACCESS_TOKEN";

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub description: String,
    pub language: String,
    pub timezone: String,

    // URL
    pub url: String,
    pub root: String,

    // Directory
    pub public_dir: String,
    pub static_dir: String,

    // Layout
    pub logo: String,

    // Rendering
    /// Seconds the list page may be served before it is regenerated
    pub revalidate: u64,
    pub words_per_minute: usize,
    pub build_concurrency: usize,

    // Content source
    #[serde(default)]
    pub prismic: PrismicConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "spacetraveling".to_string(),
            description: String::new(),
            language: "pt-BR".to_string(),
            timezone: "UTC".to_string(),

            url: "http://localhost:3000".to_string(),
            root: "/".to_string(),

            public_dir: "public".to_string(),
            static_dir: "static".to_string(),

            logo: "/images/logo.svg".to_string(),

            revalidate: 60 * 60,
            words_per_minute: 200,
            build_concurrency: 4,

            prismic: PrismicConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: SiteConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `PRISMIC_API_ENDPOINT` / `PRISMIC_ACCESS_TOKEN` overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENDPOINT_ENV).ok(),
            std::env::var(ACCESS_TOKEN_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, endpoint: Option<String>, token: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using API endpoint from {}", ENDPOINT_ENV);
            self.prismic.endpoint = endpoint;
        }
        if let Some(token) = token.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using access token from {}", ACCESS_TOKEN_ENV);
            self.prismic.access_token = Some(token);
        }
    }

    /// Revalidation interval of the list page
    pub fn revalidate_after(&self) -> Duration {
        Duration::from_secs(self.revalidate)
    }

    /// Parsed display timezone; unknown names fall back to UTC
    pub fn tz(&self) -> chrono_tz::Tz {
        match self.timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                if !self.timezone.is_empty() {
                    tracing::warn!("Unknown timezone '{}', using UTC", self.timezone);
                }
                chrono_tz::UTC
            }
        }
    }
}

/// Prismic repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrismicConfig {
    /// API root, e.g. `https://my-repo.cdn.prismic.io/api/v2`
    pub endpoint: String,
    pub access_token: Option<String>,
    pub document_type: String,
    /// Page size of the list page query
    pub page_size: usize,
    /// Fields fetched for the list page
    pub fetch: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for PrismicConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_token: None,
            document_type: "posts".to_string(),
            page_size: 1,
            fetch: vec![
                "title".to_string(),
                "subtitle".to_string(),
                "author".to_string(),
            ],
            timeout_secs: 30,
        }
    }
}

impl PrismicConfig {
    /// Check that a client can be built from this configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(format!(
                "prismic.endpoint is not set (or export {})",
                ENDPOINT_ENV
            )));
        }
        if self.page_size == 0 {
            return Err(Error::Config("prismic.page_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Fully-qualified field names, e.g. `posts.title`
    pub fn fetch_fields(&self) -> Vec<String> {
        self.fetch
            .iter()
            .map(|field| {
                if field.contains('.') {
                    field.clone()
                } else {
                    format!("{}.{}", self.document_type, field)
                }
            })
            .collect()
    }
}
