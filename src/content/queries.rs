//! Queries behind the list and detail pages

use std::collections::HashSet;

use super::post::{normalize_cursor, PostDetail, PostsPagination};
use crate::config::PrismicConfig;
use crate::error::Result;
use crate::prismic::{ContentSource, Predicate, QueryOptions};

/// First page of the post list, restricted to the summary fields
pub async fn fetch_post_list(
    source: &dyn ContentSource,
    config: &PrismicConfig,
) -> Result<PostsPagination> {
    let options = QueryOptions {
        fetch: config.fetch_fields(),
        page_size: Some(config.page_size),
    };
    let response = source
        .query(&[Predicate::document_type(&config.document_type)], &options)
        .await?;
    Ok(PostsPagination::from_response(response))
}

/// Uids of every post, following the cursor until the last page
pub async fn fetch_post_uids(
    source: &dyn ContentSource,
    config: &PrismicConfig,
) -> Result<Vec<String>> {
    let mut response = source
        .query(
            &[Predicate::document_type(&config.document_type)],
            &QueryOptions::default(),
        )
        .await?;

    let mut uids = Vec::new();
    let mut seen_cursors = HashSet::new();

    loop {
        uids.extend(response.results.iter().filter_map(|doc| doc.uid.clone()));

        match normalize_cursor(response.next_page.take()) {
            Some(cursor) if seen_cursors.insert(cursor.clone()) => {
                response = source.fetch_page(&cursor).await?;
            }
            Some(cursor) => {
                tracing::warn!("Cursor {} repeats, stopping enumeration", cursor);
                break;
            }
            None => break,
        }
    }

    tracing::debug!("Enumerated {} post paths", uids.len());
    Ok(uids)
}

/// One full post by uid
pub async fn fetch_post(
    source: &dyn ContentSource,
    config: &PrismicConfig,
    uid: &str,
) -> Result<PostDetail> {
    let document = source.get_by_uid(&config.document_type, uid).await?;
    PostDetail::from_document(document)
}
