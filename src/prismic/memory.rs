//! In-memory content source used by unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use super::{ContentSource, Document, Predicate, QueryOptions, SearchResponse};
use crate::error::{Error, Result};

pub const MEMORY_ENDPOINT: &str = "https://memory.cdn.prismic.io/api/v2";
const DEFAULT_PAGE_SIZE: usize = 20;

/// Serves a fixed list of documents with Prismic-like pagination
#[derive(Default)]
pub struct MemorySource {
    documents: Mutex<Vec<Document>>,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: Mutex::new(documents),
            ..Self::default()
        }
    }

    /// Make the next `n` calls fail as if the API were down
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(Error::unavailable("connection refused"));
        }
        Ok(())
    }

    fn page(&self, doc_type: Option<&str>, fetch: &[String], page: usize, size: usize) -> SearchResponse {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        let matching: Vec<Document> = documents
            .iter()
            .filter(|d| doc_type.map_or(true, |t| d.doc_type == t))
            .cloned()
            .collect();

        let total = matching.len();
        let total_pages = total.div_ceil(size).max(1);
        let results: Vec<Document> = matching
            .into_iter()
            .skip((page - 1) * size)
            .take(size)
            .map(|doc| restrict_fields(doc, fetch))
            .collect();

        let next_page = (page < total_pages).then(|| {
            let mut url = format!(
                "{}/documents/search?page={}&pageSize={}",
                MEMORY_ENDPOINT,
                page + 1,
                size
            );
            if let Some(doc_type) = doc_type {
                url.push_str(&format!("&type={}", doc_type));
            }
            url
        });

        SearchResponse {
            page,
            results_per_page: size,
            results_size: results.len(),
            total_results_size: total,
            total_pages,
            next_page,
            prev_page: None,
            results,
        }
    }
}

fn restrict_fields(mut doc: Document, fetch: &[String]) -> Document {
    if fetch.is_empty() {
        return doc;
    }
    if let Value::Object(data) = &mut doc.data {
        data.retain(|key, _| {
            fetch
                .iter()
                .any(|f| f.rsplit('.').next() == Some(key.as_str()))
        });
    }
    doc
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchResponse> {
        self.enter()?;
        let doc_type = predicates.iter().find_map(|p| match p {
            Predicate::At { path, value } if path == "document.type" => Some(value.as_str()),
            _ => None,
        });
        Ok(self.page(
            doc_type,
            &options.fetch,
            1,
            options.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
        ))
    }

    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse> {
        let url = Url::parse(cursor).map_err(|e| Error::InvalidCursor {
            cursor: cursor.to_string(),
            reason: e.to_string(),
        })?;
        if !cursor.starts_with(MEMORY_ENDPOINT) {
            return Err(Error::InvalidCursor {
                cursor: cursor.to_string(),
                reason: "origin does not match the API endpoint".to_string(),
            });
        }
        self.enter()?;

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        let page = param("page").and_then(|v| v.parse().ok()).unwrap_or(1);
        let size = param("pageSize")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let doc_type = param("type");

        Ok(self.page(doc_type.as_deref(), &[], page, size))
    }

    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Document> {
        self.enter()?;
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|d| d.doc_type == doc_type && d.uid.as_deref() == Some(uid))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                uid: uid.to_string(),
            })
    }
}

/// A `posts` document with one section of `words` words
pub fn post_document(uid: &str, words: usize) -> Document {
    let body = vec!["palavra"; words].join(" ");
    Document {
        id: format!("id-{}", uid),
        uid: Some(uid.to_string()),
        doc_type: "posts".to_string(),
        first_publication_date: Some("2021-03-15T19:25:28+0000".to_string()),
        data: json!({
            "title": format!("Post {}", uid),
            "subtitle": "Pensando em sincronização em vez de ciclos de vida",
            "author": "Joseph Oliveira",
            "banner": { "url": format!("https://images.prismic.io/{}.png", uid) },
            "content": [{
                "heading": "Proin et varius",
                "body": [{ "type": "paragraph", "text": body, "spans": [] }]
            }]
        }),
        ..Document::default()
    }
}
