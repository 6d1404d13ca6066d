//! Template cache memoization and strategy selection.

use std::sync::Arc;
use std::time::Duration;

use fiddle_core::fakes::{CountingFetcher, MemoryTemplateStore};
use fiddle_core::{Branch, TemplateCache, TemplateEntry, Version, VersionCatalog};

fn catalog(versions: &[&str]) -> Arc<VersionCatalog> {
    Arc::new(VersionCatalog::from_versions(
        versions.iter().map(|v| Version::remote(v).unwrap()),
    ))
}

fn custom_entry() -> TemplateEntry {
    let mut files = TemplateEntry::bundled().files().clone();
    files.insert("main.js".to_string(), "// from network".to_string());
    TemplateEntry::new(files)
}

#[tokio::test]
async fn concurrent_requests_share_one_acquisition() {
    let fetcher = Arc::new(
        CountingFetcher::serving(custom_entry()).with_delay(Duration::from_millis(50)),
    );
    let cache = Arc::new(TemplateCache::new(
        catalog(&["10.0.0", "11.0.0", "12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    ));

    let requests = (0..8).map(|_| {
        let cache = Arc::clone(&cache);
        async move { cache.get_template(Some("12.0.1")).await }
    });
    let entries = futures::future::join_all(requests).await;

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.acquisition_count(), 1);
    for entry in &entries {
        assert!(Arc::ptr_eq(entry, &entries[0]));
        assert_eq!(entry.get("main.js"), Some("// from network"));
    }
}

#[tokio::test]
async fn concurrent_requests_from_spawned_tasks_share_one_acquisition() {
    let fetcher = Arc::new(
        CountingFetcher::serving(custom_entry()).with_delay(Duration::from_millis(50)),
    );
    let cache = Arc::new(TemplateCache::new(
        catalog(&["12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    ));

    let handles: Vec<_> = ["12.0.0", "12.1.0", "v12.2.0", "12"]
        .into_iter()
        .map(|v| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_template(Some(v)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.acquisition_count(), 1);
}

#[tokio::test]
async fn unreleased_major_never_touches_network() {
    let fetcher = Arc::new(CountingFetcher::serving(custom_entry()));
    let store = Arc::new(MemoryTemplateStore::new());
    let cache = TemplateCache::new(catalog(&["11.0.0", "12.0.0"]), fetcher.clone(), store.clone());

    let entry = cache.get_template(Some("99.0.0-nightly.20240101")).await;

    assert_eq!(*entry, TemplateEntry::bundled());
    assert_eq!(fetcher.calls(), 0);
    assert!(!store.contains(&Branch::from_major(99)));
}

#[tokio::test]
async fn unparseable_version_uses_master_fallback() {
    let fetcher = Arc::new(CountingFetcher::serving(custom_entry()));
    let cache = TemplateCache::new(
        catalog(&["12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    );

    let entry = cache.get_template(Some("not a version")).await;
    assert_eq!(*entry, TemplateEntry::bundled());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn repeated_requests_are_idempotent() {
    let fetcher = Arc::new(CountingFetcher::serving(custom_entry()));
    let cache = TemplateCache::new(
        catalog(&["12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    );

    let first = cache.get_template(Some("12.0.0")).await;
    let second = cache.get_template(Some("12.0.0")).await;
    let third = cache.get_template(Some("12.3.1")).await;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(cache.acquisition_count(), 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn absent_version_uses_master_branch() {
    let fetcher = Arc::new(CountingFetcher::serving(custom_entry()));
    let store = Arc::new(MemoryTemplateStore::new());
    let cache = TemplateCache::new(catalog(&["12.0.0"]), fetcher.clone(), store.clone());

    let entry = cache.get_template(None).await;
    assert_eq!(entry.get("main.js"), Some("// from network"));
    assert!(store.contains(&Branch::master()));
}

#[tokio::test]
async fn failed_acquisition_is_memoized_as_fallback() {
    let fetcher = Arc::new(CountingFetcher::failing());
    let cache = TemplateCache::new(
        catalog(&["12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    );

    let first = cache.get_template(Some("12.0.0")).await;
    let second = cache.get_template(Some("12.0.0")).await;

    assert_eq!(*first, TemplateEntry::bundled());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn distinct_branches_acquire_separately() {
    let fetcher = Arc::new(CountingFetcher::serving(custom_entry()));
    let cache = TemplateCache::new(
        catalog(&["11.0.0", "12.0.0"]),
        fetcher.clone(),
        Arc::new(MemoryTemplateStore::new()),
    );

    cache.get_template(Some("11.0.0")).await;
    cache.get_template(Some("12.0.0")).await;

    assert_eq!(cache.acquisition_count(), 2);
    assert_eq!(fetcher.calls(), 2);
}
