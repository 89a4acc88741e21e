//! Initialize a new blog

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

use crate::config::{ACCESS_TOKEN_ENV, ENDPOINT_ENV};
use crate::templates::DEFAULT_LOGO;

/// Initialize a new blog in the given directory
pub fn init_site(target_dir: &Path) -> Result<()> {
    let config_path = target_dir.join("_config.yml");
    if config_path.exists() {
        bail!("{:?} already exists", config_path);
    }

    // Create directory structure
    fs::create_dir_all(target_dir.join("static/images"))?;

    let config_content = format!(
        r#"# spacetraveling configuration

# Site
title: spacetraveling
description: ''
language: pt-BR
timezone: UTC

# URL
url: http://localhost:3000
root: /

# Directory
public_dir: public
static_dir: static

# Layout
logo: /images/logo.svg

# Rendering
## Seconds the list page is served before it is regenerated
revalidate: 3600
words_per_minute: 200
build_concurrency: 4

# Content source
## {endpoint_env} and {token_env} override the values below
prismic:
  endpoint: https://your-repository.cdn.prismic.io/api/v2
  access_token:
  document_type: posts
  page_size: 1
  fetch:
    - title
    - subtitle
    - author
  timeout_secs: 30
"#,
        endpoint_env = ENDPOINT_ENV,
        token_env = ACCESS_TOKEN_ENV,
    );

    fs::write(&config_path, config_content)?;

    let logo_path = target_dir.join("static/images/logo.svg");
    if !logo_path.exists() {
        fs::write(&logo_path, DEFAULT_LOGO)?;
    }

    Ok(())
}
