//! Blog server with on-demand rendering
//!
//! Pre-rendered pages from the last build are served as-is. The list page is
//! regenerated in the background once it is older than `revalidate` seconds.
//! Posts missing from the build are rendered on first request: the visitor
//! gets an auto-refreshing placeholder until the page is ready.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cache::{from_unix, BuildManifest, CachedPage, PageFailure, PageState, PageStore};
use crate::content::{normalize_cursor, PostSummary};
use crate::feed::{FeedError, PostFeed};
use crate::generator::{is_not_found, output_path, post_route, Generator};
use crate::helpers::is_safe_uid;
use crate::Error;

const INDEX_ROUTE: &str = "/";

/// State shared by all request handlers
pub struct SiteState {
    generator: Generator,
    pages: PageStore,
}

pub type SharedState = Arc<SiteState>;

/// What a page request resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Ready(String),
    /// Placeholder while the page is rendered in the background
    Loading(String),
    NotFound(String),
    /// Rendering failed; the next request tries again
    Failed(String),
}

impl IntoResponse for PageOutcome {
    fn into_response(self) -> Response {
        match self {
            PageOutcome::Ready(html) => Html(html).into_response(),
            PageOutcome::Loading(html) => {
                ([(header::CACHE_CONTROL, "no-store")], Html(html)).into_response()
            }
            PageOutcome::NotFound(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
            PageOutcome::Failed(html) => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CACHE_CONTROL, "no-store")],
                Html(html),
            )
                .into_response(),
        }
    }
}

impl SiteState {
    pub fn new(generator: Generator) -> Self {
        Self {
            generator,
            pages: PageStore::new(),
        }
    }

    /// Seed the page store with the list page of the last build
    pub async fn load_prerendered(&self) {
        let blog = self.generator.blog();
        let path = blog.public_dir.join(output_path(INDEX_ROUTE));
        let Ok(html) = tokio::fs::read_to_string(&path).await else {
            return;
        };

        // Without a manifest the age is unknown, so the page is due at once
        let generated_at = BuildManifest::load(&blog.base_dir)
            .map(|m| from_unix(m.index_generated_at))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        self.pages
            .store_ready(
                INDEX_ROUTE,
                CachedPage {
                    html,
                    generated_at,
                    revalidate: Some(blog.config.revalidate_after()),
                },
            )
            .await;
        tracing::debug!("Loaded pre-rendered list page from {:?}", path);
    }

    fn error_page(&self, heading: &str, message: &str, retry: bool) -> String {
        self.generator
            .render_error(heading, message, retry)
            .unwrap_or_else(|e| {
                tracing::error!("Failed to render error page: {}", e);
                format!("{}: {}", heading, message)
            })
    }

    fn not_found_page(&self) -> PageOutcome {
        PageOutcome::NotFound(self.error_page(
            "Post não encontrado",
            "O post que você procura não existe ou foi removido.",
            false,
        ))
    }

    fn unavailable_page(&self) -> PageOutcome {
        PageOutcome::Failed(self.error_page(
            "Erro ao carregar",
            "Não foi possível carregar o conteúdo agora.",
            true,
        ))
    }

    fn loading_page(&self) -> PageOutcome {
        match self.generator.render_loading() {
            Ok(html) => PageOutcome::Loading(html),
            Err(e) => {
                tracing::error!("Failed to render loading page: {}", e);
                PageOutcome::Loading("Carregando...".to_string())
            }
        }
    }
}

/// Resolve the list page, revalidating it in the background when stale
pub async fn resolve_index(state: &SharedState) -> PageOutcome {
    if let Some(PageState::Ready(page)) = state.pages.get(INDEX_ROUTE).await {
        if page.is_stale_at(SystemTime::now()) && state.pages.begin_revalidation(INDEX_ROUTE).await
        {
            let state = Arc::clone(state);
            tokio::spawn(async move {
                revalidate_index(&state).await;
            });
        }
        return PageOutcome::Ready(page.html);
    }

    // No build output: render in the request, one request at a time
    if !state.pages.begin_revalidation(INDEX_ROUTE).await {
        return state.loading_page();
    }
    let outcome = match render_index(state).await {
        Ok(html) => PageOutcome::Ready(html),
        Err(e) => {
            tracing::error!("Failed to render the post list: {:#}", e);
            state.unavailable_page()
        }
    };
    state.pages.end_revalidation(INDEX_ROUTE).await;
    outcome
}

async fn render_index(state: &SiteState) -> Result<String> {
    let html = state.generator.build_index().await?;
    if let Err(e) = state.generator.write_page(INDEX_ROUTE, &html) {
        tracing::warn!("Failed to persist the list page: {:#}", e);
    }
    state
        .pages
        .store_ready(
            INDEX_ROUTE,
            CachedPage::new(
                html.clone(),
                Some(state.generator.blog().config.revalidate_after()),
            ),
        )
        .await;
    Ok(html)
}

async fn revalidate_index(state: &SiteState) {
    tracing::info!("Revalidating the post list");
    match render_index(state).await {
        Ok(_) => tracing::debug!("Post list revalidated"),
        // The stale page stays in place until a later attempt succeeds
        Err(e) => tracing::warn!("Revalidation of the post list failed: {:#}", e),
    }
    state.pages.end_revalidation(INDEX_ROUTE).await;
}

/// Resolve a post page, rendering unknown slugs in the background
pub async fn resolve_post(state: &SharedState, slug: &str) -> PageOutcome {
    if !is_safe_uid(slug) {
        return state.not_found_page();
    }
    let route = post_route(slug);

    match state.pages.get(&route).await {
        Some(PageState::Ready(page)) => return PageOutcome::Ready(page.html),
        Some(PageState::Pending) => return state.loading_page(),
        Some(PageState::Failed(..)) => {
            return match state.pages.take_failure(&route).await {
                Some(PageFailure::NotFound) => state.not_found_page(),
                Some(PageFailure::Unavailable(_)) => state.unavailable_page(),
                // Another request took the failure first and a retry may be running
                None => state.loading_page(),
            };
        }
        None => {}
    }

    // Pre-rendered by the last build
    let path = state.generator.blog().public_dir.join(output_path(&route));
    if let Ok(html) = tokio::fs::read_to_string(&path).await {
        state
            .pages
            .store_ready(&route, CachedPage::new(html.clone(), None))
            .await;
        return PageOutcome::Ready(html);
    }

    if state.pages.begin_pending(&route).await {
        tracing::debug!("Rendering post '{}' on demand", slug);
        let state = Arc::clone(state);
        let slug = slug.to_string();
        tokio::spawn(async move {
            render_post(&state, &slug).await;
        });
    }

    state.loading_page()
}

async fn render_post(state: &SiteState, slug: &str) {
    let route = post_route(slug);

    match state.generator.build_post(slug).await {
        Ok(html) => {
            if let Err(e) = state.generator.write_page(&route, &html) {
                tracing::warn!("Failed to persist post '{}': {:#}", slug, e);
            }
            state
                .pages
                .store_ready(&route, CachedPage::new(html, None))
                .await;
            tracing::info!("Rendered post '{}'", slug);
        }
        Err(e) if is_not_found(&e) => {
            tracing::debug!("Post '{}' does not exist", slug);
            state.pages.store_failed(&route, PageFailure::NotFound).await;
        }
        Err(e) => {
            tracing::warn!("Failed to render post '{}': {:#}", slug, e);
            state
                .pages
                .store_failed(&route, PageFailure::Unavailable(e.to_string()))
                .await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostsQuery {
    cursor: Option<String>,
}

/// Body of the load-more endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct PostsPage {
    pub results: Vec<PostSummary>,
    pub next_page: Option<String>,
    /// Rendered list items, ready to append
    pub html: String,
}

/// Fetch the page behind a cursor
pub async fn load_posts_page(
    state: &SiteState,
    cursor: String,
) -> std::result::Result<PostsPage, (StatusCode, String)> {
    let feed = PostFeed::from_cursor(cursor);

    if let Err(e) = feed.load_more(state.generator.source()).await {
        let status = match &e {
            FeedError::Fetch(Error::InvalidCursor { .. }) | FeedError::Exhausted => {
                StatusCode::BAD_REQUEST
            }
            FeedError::Busy => StatusCode::CONFLICT,
            FeedError::Fetch(_) => StatusCode::BAD_GATEWAY,
        };
        return Err((status, e.to_string()));
    }

    let results = feed.posts();
    let html = state.generator.render_post_items(&results).map_err(|e| {
        tracing::error!("Failed to render post items: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "render failed".to_string())
    })?;

    Ok(PostsPage {
        results,
        next_page: feed.next_page(),
        html,
    })
}

async fn index_handler(State(state): State<SharedState>) -> PageOutcome {
    resolve_index(&state).await
}

async fn post_handler(State(state): State<SharedState>, Path(slug): Path<String>) -> PageOutcome {
    resolve_post(&state, &slug).await
}

async fn api_posts_handler(
    State(state): State<SharedState>,
    Query(query): Query<PostsQuery>,
) -> Response {
    let Some(cursor) = normalize_cursor(query.cursor) else {
        return error_json(StatusCode::BAD_REQUEST, "missing cursor");
    };

    match load_posts_page(&state, cursor).await {
        Ok(page) => Json(page).into_response(),
        Err((status, message)) => {
            tracing::warn!("Load more failed ({}): {}", status, message);
            error_json(status, &message)
        }
    }
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let public_dir = state.generator.blog().public_dir.clone();

    Router::new()
        .route("/", get(index_handler))
        .route("/post/:slug", get(post_handler))
        .route("/api/posts", get(api_posts_handler))
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the blog server
pub async fn start(generator: Generator, ip: &str, port: u16, open: bool) -> Result<()> {
    let state = Arc::new(SiteState::new(generator));
    state.load_prerendered().await;

    let app = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Server running at {}", url);
    println!("Press Ctrl+C to stop.");

    // Open browser if requested
    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::prismic::memory::{post_document, MemorySource, MEMORY_ENDPOINT};
    use crate::prismic::{ContentSource, Document, Predicate, QueryOptions, SearchResponse};
    use crate::Blog;
    use async_trait::async_trait;
    use std::time::Duration;

    const SECRET_TOKEN: &str = "s3cr3t-token";

    /// Answers like a private repository, whose cursors carry the token
    struct TokenCursors(MemorySource);

    impl TokenCursors {
        fn with_token(mut response: SearchResponse) -> SearchResponse {
            response.next_page = response
                .next_page
                .map(|next| format!("{}&access_token={}", next, SECRET_TOKEN));
            response
        }
    }

    #[async_trait]
    impl ContentSource for TokenCursors {
        async fn query(
            &self,
            predicates: &[Predicate],
            options: &QueryOptions,
        ) -> crate::Result<SearchResponse> {
            self.0.query(predicates, options).await.map(Self::with_token)
        }

        async fn fetch_page(&self, cursor: &str) -> crate::Result<SearchResponse> {
            self.0.fetch_page(cursor).await.map(Self::with_token)
        }

        async fn get_by_uid(&self, doc_type: &str, uid: &str) -> crate::Result<Document> {
            self.0.get_by_uid(doc_type, uid).await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: Arc<MemorySource>,
        state: SharedState,
    }

    fn fixture(uids: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let blog = Blog::with_config(dir.path(), SiteConfig::default());
        let source = Arc::new(MemorySource::new(
            uids.iter().map(|uid| post_document(uid, 10)).collect(),
        ));
        let generator = Generator::new(&blog, source.clone()).unwrap();
        Fixture {
            _dir: dir,
            source,
            state: Arc::new(SiteState::new(generator)),
        }
    }

    /// Request the post until it leaves the loading state
    async fn settle(state: &SharedState, slug: &str) -> PageOutcome {
        for _ in 0..100 {
            match resolve_post(state, slug).await {
                PageOutcome::Loading(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                outcome => return outcome,
            }
        }
        panic!("post '{}' never left the loading state", slug);
    }

    async fn index_html(state: &SiteState) -> String {
        match state.pages.get(INDEX_ROUTE).await {
            Some(PageState::Ready(page)) => page.html,
            other => panic!("list page not ready: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_shows_loading_then_post() {
        let f = fixture(&["hooks"]);

        let first = resolve_post(&f.state, "hooks").await;
        assert!(matches!(&first, PageOutcome::Loading(html) if html.contains("Carregando...")));

        match settle(&f.state, "hooks").await {
            PageOutcome::Ready(html) => assert!(html.contains("<h1>Post hooks</h1>")),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Persisted for the static fallback
        let path = f.state.generator.blog().public_dir.join("post/hooks/index.html");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_fallback_renders_once() {
        let f = fixture(&["hooks"]);
        resolve_post(&f.state, "hooks").await;
        resolve_post(&f.state, "hooks").await;
        settle(&f.state, "hooks").await;
        assert_eq!(f.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_slug_is_not_found() {
        let f = fixture(&["hooks"]);
        assert!(matches!(
            settle(&f.state, "missing").await,
            PageOutcome::NotFound(html) if html.contains("Post não encontrado")
        ));
        assert!(matches!(
            resolve_post(&f.state, "..").await,
            PageOutcome::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_render_is_retried() {
        let f = fixture(&["hooks"]);
        f.source.fail_next(1);

        match settle(&f.state, "hooks").await {
            PageOutcome::Failed(html) => assert!(html.contains("Tentar novamente")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            settle(&f.state, "hooks").await,
            PageOutcome::Ready(_)
        ));
    }

    #[tokio::test]
    async fn test_prerendered_post_is_served() {
        let f = fixture(&[]);
        f.state
            .generator
            .write_page("/post/static", "<h1>from disk</h1>")
            .unwrap();

        assert_eq!(
            resolve_post(&f.state, "static").await,
            PageOutcome::Ready("<h1>from disk</h1>".to_string())
        );
        assert_eq!(f.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_index_is_revalidated() {
        let f = fixture(&["a", "b"]);
        f.state
            .pages
            .store_ready(
                INDEX_ROUTE,
                CachedPage {
                    html: "stale".to_string(),
                    generated_at: SystemTime::now() - Duration::from_secs(7200),
                    revalidate: Some(Duration::from_secs(3600)),
                },
            )
            .await;

        // The stale copy is served while the new one renders
        assert_eq!(
            resolve_index(&f.state).await,
            PageOutcome::Ready("stale".to_string())
        );

        for _ in 0..100 {
            if index_html(&f.state).await != "stale" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(index_html(&f.state).await.contains("/post/a"));
    }

    #[tokio::test]
    async fn test_fresh_index_is_not_revalidated() {
        let f = fixture(&["a"]);
        f.state
            .pages
            .store_ready(
                INDEX_ROUTE,
                CachedPage::new("fresh".to_string(), Some(Duration::from_secs(3600))),
            )
            .await;

        assert_eq!(
            resolve_index(&f.state).await,
            PageOutcome::Ready("fresh".to_string())
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.source.calls(), 0);
        assert_eq!(index_html(&f.state).await, "fresh");
    }

    #[tokio::test]
    async fn test_index_without_build_renders_inline() {
        let f = fixture(&["a"]);
        match resolve_index(&f.state).await {
            PageOutcome::Ready(html) => assert!(html.contains("/post/a")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_index_without_build_renders_once() {
        let f = fixture(&["a"]);
        // A concurrent request is already rendering the list page
        assert!(f.state.pages.begin_revalidation(INDEX_ROUTE).await);

        assert!(matches!(
            resolve_index(&f.state).await,
            PageOutcome::Loading(_)
        ));
        assert_eq!(f.source.calls(), 0);

        f.state.pages.end_revalidation(INDEX_ROUTE).await;
        assert!(matches!(resolve_index(&f.state).await, PageOutcome::Ready(_)));
        // The guard is released after an inline render
        assert!(f.state.pages.begin_revalidation(INDEX_ROUTE).await);
    }

    #[tokio::test]
    async fn test_index_failure_offers_retry() {
        let f = fixture(&["a"]);
        f.source.fail_next(1);
        assert!(matches!(
            resolve_index(&f.state).await,
            PageOutcome::Failed(html) if html.contains("Tentar novamente")
        ));
        assert!(matches!(resolve_index(&f.state).await, PageOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn test_load_prerendered_without_manifest_is_stale() {
        let f = fixture(&["a"]);
        f.state.generator.write_page(INDEX_ROUTE, "built").unwrap();
        f.state.load_prerendered().await;

        match f.state.pages.get(INDEX_ROUTE).await {
            Some(PageState::Ready(page)) => {
                assert_eq!(page.html, "built");
                assert!(page.is_stale_at(SystemTime::now()));
            }
            other => panic!("list page not loaded: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_posts_page() {
        let f = fixture(&["a", "b", "c"]);
        let cursor = format!(
            "{}/documents/search?page=2&pageSize=1&type=posts",
            MEMORY_ENDPOINT
        );

        let page = load_posts_page(&f.state, cursor).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].uid, "b");
        assert!(page.html.contains("/post/b"));
        assert!(page.next_page.unwrap().contains("page=3"));
    }

    #[tokio::test]
    async fn test_load_posts_page_errors() {
        let f = fixture(&["a", "b"]);

        let (status, _) = load_posts_page(&f.state, "https://evil.example.com/x".to_string())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        f.source.fail_next(1);
        let cursor = format!("{}/documents/search?page=2&pageSize=1", MEMORY_ENDPOINT);
        let (status, _) = load_posts_page(&f.state, cursor).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_access_token_stays_on_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let blog = Blog::with_config(dir.path(), SiteConfig::default());
        let source = TokenCursors(MemorySource::new(
            ["a", "b", "c"].iter().map(|uid| post_document(uid, 10)).collect(),
        ));
        let generator = Generator::new(&blog, Arc::new(source)).unwrap();
        let state = Arc::new(SiteState::new(generator));

        match resolve_index(&state).await {
            PageOutcome::Ready(html) => {
                assert!(html.contains("data-next-page="));
                assert!(!html.contains(SECRET_TOKEN));
                assert!(!html.contains("access_token"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let cursor = format!(
            "{}/documents/search?page=2&pageSize=1&type=posts",
            MEMORY_ENDPOINT
        );
        let page = load_posts_page(&state, cursor).await.unwrap();
        assert!(page.next_page.as_deref().unwrap().contains("page=3"));

        let body = serde_json::to_string(&page).unwrap();
        assert!(!body.contains(SECRET_TOKEN));
        assert!(!body.contains("access_token"));
    }
}
