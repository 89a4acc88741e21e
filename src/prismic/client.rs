//! HTTP client for the Prismic REST API

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, trace};
use url::Url;

use super::api::{query_string, ApiInfo, Document, Predicate, QueryOptions, SearchResponse};
use super::ContentSource;
use crate::config::PrismicConfig;
use crate::error::{Error, Result};

/// Authenticated client for one Prismic repository
#[derive(Debug, Clone)]
pub struct PrismicClient {
    http: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl PrismicClient {
    /// Create a client from the repository configuration
    pub fn new(config: &PrismicConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = Url::parse(config.endpoint.trim().trim_end_matches('/')).map_err(|e| {
            Error::Config(format!("invalid prismic.endpoint '{}': {}", config.endpoint, e))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// The API root this client talks to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Resolve the ref of the published content
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn master_ref(&self) -> Result<String> {
        let mut url = self.endpoint.clone();
        self.append_token(&mut url);
        debug!("Resolving master ref");

        let info: ApiInfo = self.get_json(url).await?;
        info.master_ref()
            .map(str::to_string)
            .ok_or_else(|| Error::unavailable("API root lists no master ref"))
    }

    /// Parse a cursor and make sure it points back at this repository
    pub fn check_cursor(&self, cursor: &str) -> Result<Url> {
        let url = Url::parse(cursor).map_err(|e| Error::InvalidCursor {
            cursor: cursor.to_string(),
            reason: e.to_string(),
        })?;

        if url.origin() != self.endpoint.origin() {
            return Err(Error::InvalidCursor {
                cursor: cursor.to_string(),
                reason: "origin does not match the API endpoint".to_string(),
            });
        }

        Ok(url)
    }

    fn search_url(&self) -> Result<Url> {
        let url = format!(
            "{}/documents/search",
            self.endpoint.as_str().trim_end_matches('/')
        );
        Url::parse(&url).map_err(|e| Error::Config(format!("invalid search url: {}", e)))
    }

    fn append_token(&self, url: &mut Url) {
        if let Some(token) = &self.access_token {
            let present = url.query_pairs().any(|(key, _)| key == "access_token");
            if !present {
                url.query_pairs_mut().append_pair("access_token", token);
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        trace!(path = url.path(), "GET");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(Error::ContentSourceUnavailable {
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ContentSource for PrismicClient {
    #[instrument(skip(self, options), fields(endpoint = %self.endpoint))]
    async fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchResponse> {
        let reference = self.master_ref().await?;
        let mut url = self.search_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("ref", &reference);
            pairs.append_pair("q", &query_string(predicates));
            if !options.fetch.is_empty() {
                pairs.append_pair("fetch", &options.fetch.join(","));
            }
            if let Some(size) = options.page_size {
                pairs.append_pair("pageSize", &size.to_string());
            }
        }
        self.append_token(&mut url);

        let response: SearchResponse = self.get_json(url).await?;
        debug!(
            results = response.results.len(),
            total = response.total_results_size,
            "Search done"
        );
        Ok(response)
    }

    #[instrument(skip(self, cursor), fields(endpoint = %self.endpoint))]
    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse> {
        let mut url = self.check_cursor(cursor)?;
        self.append_token(&mut url);
        debug!("Following pagination cursor");
        self.get_json(url).await
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Document> {
        let options = QueryOptions {
            page_size: Some(1),
            ..QueryOptions::default()
        };
        let response = self
            .query(&[Predicate::uid(doc_type, uid)], &options)
            .await?;

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound {
                uid: uid.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> PrismicClient {
        let config = PrismicConfig {
            endpoint: endpoint.to_string(),
            access_token: Some("secret".to_string()),
            ..PrismicConfig::default()
        };
        PrismicClient::new(&config).unwrap()
    }

    #[test]
    fn test_requires_endpoint() {
        let result = PrismicClient::new(&PrismicConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_search_url() {
        let client = client("https://blog.cdn.prismic.io/api/v2/");
        assert_eq!(
            client.search_url().unwrap().as_str(),
            "https://blog.cdn.prismic.io/api/v2/documents/search"
        );
    }

    #[test]
    fn test_check_cursor() {
        let client = client("https://blog.cdn.prismic.io/api/v2");
        assert!(client
            .check_cursor("https://blog.cdn.prismic.io/api/v2/documents/search?page=2")
            .is_ok());
        assert!(matches!(
            client.check_cursor("https://evil.example.com/api/v2/documents/search?page=2"),
            Err(Error::InvalidCursor { .. })
        ));
        assert!(matches!(
            client.check_cursor("not a url"),
            Err(Error::InvalidCursor { .. })
        ));
    }

    #[test]
    fn test_token_is_appended_once() {
        let client = client("https://blog.cdn.prismic.io/api/v2");
        let mut url =
            Url::parse("https://blog.cdn.prismic.io/api/v2/documents/search?access_token=secret")
                .unwrap();
        client.append_token(&mut url);
        assert_eq!(url.query_pairs().filter(|(k, _)| k == "access_token").count(), 1);
    }
}
