//! Per-branch fiddle boilerplate.
//!
//! [`TemplateCache`] hands out the boilerplate file set for a runtime version.
//! Work is memoized per [`Branch`]: the first request for a branch starts the
//! acquisition and every later or concurrent request awaits the same cell.
//! Acquisition never fails from the caller's point of view; any network,
//! unpack or read error degrades to the bundled template.
//!
//! # Modules
//!
//! - [`fs`]: `FsTemplateStore`, on-disk cache with zip extraction
//! - [`http`]: `HttpArchiveFetcher`, branch archives from the upstream repo

pub mod fs;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::catalog::VersionCatalog;
use crate::error::TemplateError;
use crate::metrics::METRICS;
use crate::obs::emit_template_resolved;
use crate::version::{normalize_version, Branch};

pub use self::fs::FsTemplateStore;
pub use self::http::HttpArchiveFetcher;

/// File names that make up a fiddle, in editor order.
pub const FIDDLE_FILES: [&str; 5] = [
    "main.js",
    "preload.js",
    "renderer.js",
    "index.html",
    "styles.css",
];

/// Boilerplate for one branch: logical file name to contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    files: BTreeMap<String, String>,
}

impl TemplateEntry {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    /// The template compiled into this binary.
    pub fn bundled() -> Self {
        let files = [
            ("main.js", include_str!("../../static/template/main.js")),
            ("preload.js", include_str!("../../static/template/preload.js")),
            ("renderer.js", include_str!("../../static/template/renderer.js")),
            ("index.html", include_str!("../../static/template/index.html")),
            ("styles.css", include_str!("../../static/template/styles.css")),
        ];
        Self::new(
            files
                .into_iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
        )
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Downloads the template archive for a branch.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch_archive(&self, branch: &Branch) -> Result<Vec<u8>, TemplateError>;
}

/// Local persistence for downloaded templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Previously unpacked template for `branch`, if one is on disk.
    async fn load_cached(&self, branch: &Branch) -> Result<Option<TemplateEntry>, TemplateError>;

    /// Persist and unpack `archive`, then read the unpacked template.
    async fn store_archive(
        &self,
        branch: &Branch,
        archive: Vec<u8>,
    ) -> Result<TemplateEntry, TemplateError>;
}

/// How a branch's template is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Network,
    Fallback,
}

type Slot = Arc<OnceCell<Arc<TemplateEntry>>>;

/// Memoizing template provider.
pub struct TemplateCache {
    catalog: Arc<VersionCatalog>,
    fetcher: Arc<dyn ArchiveFetcher>,
    store: Arc<dyn TemplateStore>,
    fallback: Arc<TemplateEntry>,
    slots: Mutex<HashMap<Branch, Slot>>,
    acquisitions: AtomicUsize,
}

impl TemplateCache {
    pub fn new(
        catalog: Arc<VersionCatalog>,
        fetcher: Arc<dyn ArchiveFetcher>,
        store: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            store,
            fallback: Arc::new(TemplateEntry::bundled()),
            slots: Mutex::new(HashMap::new()),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Replace the bundled fallback template.
    pub fn with_fallback(mut self, fallback: TemplateEntry) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Template for `version` (or for `master` when absent).
    ///
    /// Concurrent calls for the same branch share one acquisition.
    pub async fn get_template(&self, version: Option<&str>) -> Arc<TemplateEntry> {
        let branch = Branch::for_version(version);
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(branch.clone()).or_default())
        };

        if let Some(entry) = slot.get() {
            debug!(branch = %branch, "template cache hit");
            return Arc::clone(entry);
        }

        let strategy = self.strategy_for(version);
        let entry = slot
            .get_or_init(|| self.acquire(branch.clone(), strategy))
            .await;
        Arc::clone(entry)
    }

    /// Number of acquisitions started so far.
    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// The fallback template served when acquisition is not possible.
    pub fn fallback(&self) -> Arc<TemplateEntry> {
        Arc::clone(&self.fallback)
    }

    fn strategy_for(&self, version: Option<&str>) -> Strategy {
        match version {
            None => Strategy::Network,
            Some(raw) => match normalize_version(raw) {
                Ok(parsed) if self.catalog.is_released_major(parsed.major) => Strategy::Network,
                _ => Strategy::Fallback,
            },
        }
    }

    async fn acquire(&self, branch: Branch, strategy: Strategy) -> Arc<TemplateEntry> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        METRICS.inc_template_acquisitions();

        if strategy == Strategy::Fallback {
            emit_template_resolved(branch.as_str(), "bundled");
            return self.fallback();
        }

        match self.acquire_from_network(&branch).await {
            Ok(entry) => {
                emit_template_resolved(branch.as_str(), "network");
                Arc::new(entry)
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "template acquisition failed, using bundled template");
                METRICS.inc_template_fallbacks();
                emit_template_resolved(branch.as_str(), "bundled");
                self.fallback()
            }
        }
    }

    async fn acquire_from_network(&self, branch: &Branch) -> Result<TemplateEntry, TemplateError> {
        if let Some(entry) = self.store.load_cached(branch).await? {
            debug!(branch = %branch, "template found on disk");
            return Ok(entry);
        }
        let archive = self.fetcher.fetch_archive(branch).await?;
        self.store.store_archive(branch, archive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{CountingFetcher, MemoryTemplateStore};
    use crate::version::Version;

    fn catalog(newest: &str) -> Arc<VersionCatalog> {
        Arc::new(VersionCatalog::from_versions(vec![
            Version::remote(newest).unwrap()
        ]))
    }

    #[test]
    fn test_bundled_template_has_all_files() {
        let entry = TemplateEntry::bundled();
        for name in FIDDLE_FILES {
            assert!(entry.get(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_released_version_uses_network() {
        let fetcher = Arc::new(CountingFetcher::serving(TemplateEntry::bundled()));
        let store = Arc::new(MemoryTemplateStore::new());
        let cache = TemplateCache::new(catalog("12.0.0"), fetcher.clone(), store.clone());

        let entry = cache.get_template(Some("12.0.0")).await;
        assert!(!entry.is_empty());
        assert_eq!(fetcher.calls(), 1);
        assert!(store.contains(&Branch::from_major(12)));
    }

    #[tokio::test]
    async fn test_disk_hit_skips_fetch() {
        let fetcher = Arc::new(CountingFetcher::failing());
        let store = Arc::new(MemoryTemplateStore::new());
        let mut files = BTreeMap::new();
        files.insert("main.js".to_string(), "// cached".to_string());
        store.seed(Branch::from_major(11), TemplateEntry::new(files));

        let cache = TemplateCache::new(catalog("12.0.0"), fetcher.clone(), store);
        let entry = cache.get_template(Some("11.1.0")).await;
        assert_eq!(entry.get("main.js"), Some("// cached"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back() {
        let fetcher = Arc::new(CountingFetcher::failing());
        let cache = TemplateCache::new(
            catalog("12.0.0"),
            fetcher.clone(),
            Arc::new(MemoryTemplateStore::new()),
        );
        let entry = cache.get_template(None).await;
        assert_eq!(*entry, TemplateEntry::bundled());
        assert_eq!(fetcher.calls(), 1);
    }
}
