//! Content module - post models, rich text and reading time

mod post;
mod queries;
pub mod reading_time;
pub mod richtext;
pub mod sanitize;

pub use post::{
    normalize_cursor, Banner, ContentSection, PostDetail, PostDetailData, PostSummary,
    PostSummaryData, PostsPagination,
};
pub use queries::{fetch_post, fetch_post_list, fetch_post_uids};
pub use richtext::{DocumentLink, RichTextBlock};
