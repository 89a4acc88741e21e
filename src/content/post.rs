//! Post models shaped from CMS documents

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::richtext::{as_text, RichTextBlock};
use crate::error::{Error, Result};
use crate::prismic::{Document, SearchResponse};

/// A post as shown in the list page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub uid: String,
    pub first_publication_date: Option<String>,
    pub data: PostSummaryData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostSummaryData {
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

/// One page of the post list plus the cursor of the next one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostsPagination {
    pub next_page: Option<String>,
    pub results: Vec<PostSummary>,
}

/// A full post as shown in its own page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    pub uid: String,
    pub first_publication_date: Option<String>,
    pub data: PostDetailData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDetailData {
    pub title: String,
    pub subtitle: String,
    pub banner: Option<Banner>,
    pub author: String,
    pub content: Vec<ContentSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub url: String,
}

/// A heading followed by a rich-text body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    pub heading: String,
    pub body: Vec<RichTextBlock>,
}

/// Query parameter carrying the repository access token
const ACCESS_TOKEN_PARAM: &str = "access_token";

/// A cursor worth following: present and not blank
///
/// The access token the API echoes back into `next_page` is removed, so a
/// cursor can be handed to browsers. The client adds it again when the
/// cursor is followed.
pub fn normalize_cursor(cursor: Option<String>) -> Option<String> {
    cursor
        .filter(|c| !c.trim().is_empty())
        .map(|c| strip_access_token(&c))
}

fn strip_access_token(cursor: &str) -> String {
    let Ok(mut url) = Url::parse(cursor) else {
        return cursor.to_string();
    };
    if !url.query_pairs().any(|(key, _)| key == ACCESS_TOKEN_PARAM) {
        return cursor.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ACCESS_TOKEN_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

impl PostsPagination {
    /// Shape a search response; documents without a uid are skipped
    pub fn from_response(response: SearchResponse) -> Self {
        let results = response
            .results
            .into_iter()
            .filter_map(|doc| match PostSummary::from_document(doc) {
                Ok(post) => Some(post),
                Err(e) => {
                    tracing::warn!("Skipping document: {}", e);
                    None
                }
            })
            .collect();

        Self {
            next_page: normalize_cursor(response.next_page),
            results,
        }
    }
}

impl PostSummary {
    pub fn from_document(doc: Document) -> Result<Self> {
        let uid = require_uid(&doc)?;
        let data = require_data(&doc, &uid)?;

        Ok(Self {
            data: PostSummaryData {
                title: text_field(data, "title").unwrap_or_default(),
                subtitle: text_field(data, "subtitle").unwrap_or_default(),
                author: text_field(data, "author").unwrap_or_default(),
            },
            first_publication_date: doc.first_publication_date,
            uid,
        })
    }
}

impl PostDetail {
    /// Shape a full document
    ///
    /// Only a missing uid or a non-object `data` is fatal. Other missing
    /// fields are logged and left empty so the page still renders.
    pub fn from_document(doc: Document) -> Result<Self> {
        let uid = require_uid(&doc)?;
        let data = require_data(&doc, &uid)?;
        let mut missing = Vec::new();

        let mut text = |key: &'static str| {
            text_field(data, key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };
        let title = text("title");
        let subtitle = text("subtitle");
        let author = text("author");

        let banner = data
            .get("banner")
            .and_then(|b| b.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| Banner {
                url: url.to_string(),
            });
        if banner.is_none() {
            missing.push("banner");
        }

        let content = match data.get("content") {
            Some(Value::Array(groups)) => groups
                .iter()
                .map(|group| section_from_value(group, &uid))
                .collect::<Result<Vec<_>>>()?,
            _ => {
                missing.push("content");
                Vec::new()
            }
        };

        if !missing.is_empty() {
            tracing::warn!("Post '{}' is missing {}", uid, missing.join(", "));
        }

        Ok(Self {
            uid,
            first_publication_date: doc.first_publication_date,
            data: PostDetailData {
                title,
                subtitle,
                banner,
                author,
                content,
            },
        })
    }
}

fn section_from_value(group: &Value, uid: &str) -> Result<ContentSection> {
    let heading = text_field(group, "heading").unwrap_or_default();
    let body = match group.get("body") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| Error::SchemaMismatch {
            uid: Some(uid.to_string()),
            reason: format!("invalid rich text in section '{}': {}", heading, e),
        })?,
    };
    Ok(ContentSection { heading, body })
}

fn require_uid(doc: &Document) -> Result<String> {
    match doc.uid.as_deref() {
        Some(uid) if !uid.trim().is_empty() => Ok(uid.to_string()),
        _ => Err(Error::SchemaMismatch {
            uid: None,
            reason: format!("document '{}' has no uid", doc.id),
        }),
    }
}

fn require_data<'a>(doc: &'a Document, uid: &str) -> Result<&'a Value> {
    if doc.data.is_object() {
        Ok(&doc.data)
    } else {
        Err(Error::SchemaMismatch {
            uid: Some(uid.to_string()),
            reason: "document data is not an object".to_string(),
        })
    }
}

/// Read a key-text field, also accepting a rich-text array
fn text_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        value @ Value::Array(_) => serde_json::from_value::<Vec<RichTextBlock>>(value.clone())
            .ok()
            .map(|blocks| as_text(&blocks)),
        _ => None,
    }
}
