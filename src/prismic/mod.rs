//! Content client for the Prismic headless CMS

mod api;
mod client;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

pub use api::{query_string, ApiInfo, ApiRef, Document, Predicate, QueryOptions, SearchResponse};
pub use client::PrismicClient;

use crate::Result;

/// A query interface over a document repository
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Search documents matching every predicate
    async fn query(&self, predicates: &[Predicate], options: &QueryOptions)
        -> Result<SearchResponse>;

    /// Follow a `next_page` cursor returned by a previous search
    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse>;

    /// Fetch one document by its uid, `Error::NotFound` when absent
    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Document>;
}
