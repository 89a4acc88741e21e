//! Cache module for generated pages
//!
//! Two layers: the build manifest written next to the site after every
//! generation (which routes exist on disk and when they were built), and the
//! server's in-memory page store that tracks each route through
//! pending/ready/failed and decides when a page is due for revalidation.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

/// Cache directory, relative to the site base directory
pub const CACHE_DIR: &str = ".spacetraveling";
const MANIFEST_FILE: &str = "manifest.json";

/// Record of the last build
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BuildManifest {
    /// Version of the manifest format
    pub version: u32,
    /// When the build finished (unix seconds)
    pub generated_at: u64,
    /// When the list page was rendered (unix seconds)
    pub index_generated_at: u64,
    /// Revalidation interval of the list page in seconds
    pub revalidate: u64,
    /// Pre-rendered posts: uid -> output path relative to the public dir
    pub posts: BTreeMap<String, String>,
}

impl BuildManifest {
    /// Current manifest format version
    const VERSION: u32 = 1;

    /// Create a new manifest with version set
    pub fn new(revalidate: u64) -> Self {
        Self {
            version: Self::VERSION,
            revalidate,
            ..Default::default()
        }
    }

    /// Load the manifest from disk, if a compatible one exists
    pub fn load(base_dir: &Path) -> Option<Self> {
        let path = base_dir.join(CACHE_DIR).join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<BuildManifest>(&content) {
            Ok(manifest) if manifest.version == Self::VERSION => Some(manifest),
            Ok(_) => {
                tracing::info!("Manifest version mismatch, ignoring {:?}", path);
                None
            }
            Err(e) => {
                tracing::warn!("Unreadable manifest {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save the manifest to disk
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let cache_dir = base_dir.join(CACHE_DIR);
        fs::create_dir_all(&cache_dir)?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(cache_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    /// Routes written by the build, list page first
    pub fn routes(&self) -> Vec<String> {
        std::iter::once("/".to_string())
            .chain(self.posts.keys().map(|uid| format!("/post/{}", uid)))
            .collect()
    }
}

/// Current time as unix seconds
pub fn unix_now() -> u64 {
    to_unix(SystemTime::now())
}

pub fn to_unix(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn from_unix(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// A rendered page held in memory
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub html: String,
    pub generated_at: SystemTime,
    /// `None` means the page never goes stale
    pub revalidate: Option<Duration>,
}

impl CachedPage {
    pub fn new(html: String, revalidate: Option<Duration>) -> Self {
        Self {
            html,
            generated_at: SystemTime::now(),
            revalidate,
        }
    }

    /// Whether the page has outlived its revalidation interval at `now`
    pub fn is_stale_at(&self, now: SystemTime) -> bool {
        match self.revalidate {
            Some(interval) => now
                .duration_since(self.generated_at)
                .map(|age| age >= interval)
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Why a page could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    NotFound,
    Unavailable(String),
}

/// How long an unreported failure is kept before it is dropped
pub const FAILURE_TTL: Duration = Duration::from_secs(5 * 60);

/// Lifecycle of a route in the page store
#[derive(Debug, Clone)]
pub enum PageState {
    /// Being generated for the first time
    Pending,
    Ready(CachedPage),
    /// Failure and when it happened
    Failed(PageFailure, SystemTime),
}

/// In-memory pages shared by all requests
#[derive(Debug, Default)]
pub struct PageStore {
    pages: RwLock<HashMap<String, PageState>>,
    revalidating: Mutex<HashSet<String>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, route: &str) -> Option<PageState> {
        self.pages.read().await.get(route).cloned()
    }

    /// Claim a route for first-time generation
    ///
    /// Returns `false` when the route already has a state, in which case the
    /// caller must not start another generation.
    pub async fn begin_pending(&self, route: &str) -> bool {
        let mut pages = self.pages.write().await;
        evict_failures(&mut pages, SystemTime::now());
        if pages.contains_key(route) {
            return false;
        }
        pages.insert(route.to_string(), PageState::Pending);
        true
    }

    pub async fn store_ready(&self, route: &str, page: CachedPage) {
        self.pages
            .write()
            .await
            .insert(route.to_string(), PageState::Ready(page));
    }

    pub async fn store_failed(&self, route: &str, failure: PageFailure) {
        let now = SystemTime::now();
        let mut pages = self.pages.write().await;
        evict_failures(&mut pages, now);
        pages.insert(route.to_string(), PageState::Failed(failure, now));
    }

    /// Report a failure once, clearing the route so the next request retries
    pub async fn take_failure(&self, route: &str) -> Option<PageFailure> {
        let mut pages = self.pages.write().await;
        match pages.get(route) {
            Some(PageState::Failed(..)) => match pages.remove(route) {
                Some(PageState::Failed(failure, _)) => Some(failure),
                _ => None,
            },
            _ => None,
        }
    }

    /// Drop failures nobody came back for within [`FAILURE_TTL`]
    pub async fn evict_failures(&self, now: SystemTime) -> usize {
        evict_failures(&mut *self.pages.write().await, now)
    }

    /// Claim a stale route for background regeneration
    pub async fn begin_revalidation(&self, route: &str) -> bool {
        self.revalidating.lock().await.insert(route.to_string())
    }

    pub async fn end_revalidation(&self, route: &str) {
        self.revalidating.lock().await.remove(route);
    }
}

fn evict_failures(pages: &mut HashMap<String, PageState>, now: SystemTime) -> usize {
    let before = pages.len();
    pages.retain(|_, state| match state {
        PageState::Failed(_, at) => now
            .duration_since(*at)
            .map(|age| age < FAILURE_TTL)
            .unwrap_or(true),
        _ => true,
    });
    before - pages.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = BuildManifest::new(3600);
        manifest.generated_at = 42;
        manifest
            .posts
            .insert("hooks".to_string(), "post/hooks/index.html".to_string());
        manifest.save(dir.path()).unwrap();

        let loaded = BuildManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.routes(), vec!["/", "/post/hooks"]);
    }

    #[test]
    fn test_manifest_missing_or_old() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BuildManifest::load(dir.path()).is_none());

        let old = BuildManifest::default();
        old.save(dir.path()).unwrap();
        assert!(BuildManifest::load(dir.path()).is_none());
    }

    #[test]
    fn test_staleness() {
        let now = SystemTime::now();
        let page = CachedPage {
            html: String::new(),
            generated_at: now - Duration::from_secs(3600),
            revalidate: Some(Duration::from_secs(3600)),
        };
        assert!(page.is_stale_at(now));
        assert!(!page.is_stale_at(now - Duration::from_secs(1)));

        let forever = CachedPage {
            revalidate: None,
            ..page
        };
        assert!(!forever.is_stale_at(now + Duration::from_secs(1_000_000)));
    }

    #[tokio::test]
    async fn test_pending_is_claimed_once() {
        let store = PageStore::new();
        assert!(store.begin_pending("/post/a").await);
        assert!(!store.begin_pending("/post/a").await);
        assert!(matches!(store.get("/post/a").await, Some(PageState::Pending)));
    }

    #[tokio::test]
    async fn test_failure_is_reported_once() {
        let store = PageStore::new();
        store.store_failed("/post/a", PageFailure::NotFound).await;
        assert_eq!(store.take_failure("/post/a").await, Some(PageFailure::NotFound));
        assert!(store.get("/post/a").await.is_none());
        assert_eq!(store.take_failure("/post/a").await, None);
    }

    #[tokio::test]
    async fn test_unreported_failures_expire() {
        let store = PageStore::new();
        store.store_failed("/post/old", PageFailure::NotFound).await;
        store
            .store_ready("/post/kept", CachedPage::new(String::new(), None))
            .await;

        // Still within the time-to-live
        assert_eq!(store.evict_failures(SystemTime::now()).await, 0);

        let later = SystemTime::now() + FAILURE_TTL + Duration::from_secs(1);
        assert_eq!(store.evict_failures(later).await, 1);
        assert!(store.get("/post/old").await.is_none());
        assert!(matches!(
            store.get("/post/kept").await,
            Some(PageState::Ready(_))
        ));
    }

    #[tokio::test]
    async fn test_new_failure_sweeps_expired_ones() {
        let store = PageStore::new();
        let long_ago = SystemTime::now() - FAILURE_TTL - Duration::from_secs(1);
        store.pages.write().await.insert(
            "/post/random".to_string(),
            PageState::Failed(PageFailure::NotFound, long_ago),
        );

        store.store_failed("/post/other", PageFailure::NotFound).await;
        assert!(store.get("/post/random").await.is_none());
        assert!(store.get("/post/other").await.is_some());

        store.pages.write().await.insert(
            "/post/random".to_string(),
            PageState::Failed(PageFailure::NotFound, long_ago),
        );
        assert!(store.begin_pending("/post/random").await);
    }

    #[tokio::test]
    async fn test_revalidation_guard() {
        let store = PageStore::new();
        assert!(store.begin_revalidation("/").await);
        assert!(!store.begin_revalidation("/").await);
        store.end_revalidation("/").await;
        assert!(store.begin_revalidation("/").await);
    }
}
