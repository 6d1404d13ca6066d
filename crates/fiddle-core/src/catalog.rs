//! Known runtime versions.
//!
//! The catalog merges the published release list with versions defined on
//! this machine and answers two questions: is a major version released, and
//! which versions lie between two bisect bounds.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::version::{ChannelFilter, Version, VersionSource};

/// Sorted, deduplicated set of known versions.
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    versions: Vec<Version>,
}

impl VersionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from any collection of versions.
    pub fn from_versions(versions: impl IntoIterator<Item = Version>) -> Self {
        let mut catalog = Self::new();
        catalog.extend(versions);
        catalog
    }

    /// Insert a version. A remote entry replaces an equal local one.
    pub fn insert(&mut self, version: Version) {
        match self.versions.binary_search(&version) {
            Ok(idx) => {
                if version.source() == VersionSource::Remote {
                    self.versions[idx] = version;
                }
            }
            Err(idx) => self.versions.insert(idx, version),
        }
    }

    pub fn extend(&mut self, versions: impl IntoIterator<Item = Version>) {
        for version in versions {
            self.insert(version);
        }
    }

    /// All known versions, ascending.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.versions.binary_search(version).is_ok()
    }

    /// Newest version taken from the remote release list.
    pub fn newest_remote(&self) -> Option<&Version> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.source() == VersionSource::Remote)
    }

    /// Whether `major` is not newer than the newest published release.
    ///
    /// Locally defined versions never make a major count as released.
    pub fn is_released_major(&self, major: u64) -> bool {
        self.newest_remote()
            .map(|newest| major <= newest.major())
            .unwrap_or(false)
    }

    /// Ordered versions from `low` to `high` inclusive.
    ///
    /// The bounds are always present even when the catalog does not know them;
    /// versions strictly inside the range are kept only if `filter` allows
    /// their channel.
    pub fn versions_between(
        &self,
        low: &Version,
        high: &Version,
        filter: &ChannelFilter,
    ) -> Vec<Version> {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let mut list = Vec::with_capacity(self.versions.len().min(64) + 2);
        list.push(low.clone());
        list.extend(
            self.versions
                .iter()
                .filter(|v| *v > low && *v < high)
                .filter(|v| filter.allows(v.channel()))
                .cloned(),
        );
        if high != low {
            list.push(high.clone());
        }
        list
    }

    /// Load the remote list from `source` and merge in `local` versions.
    ///
    /// A failing source leaves only the local versions; unparseable local
    /// entries are skipped with a warning.
    pub async fn load(source: &dyn ReleaseSource, local: &[String]) -> Self {
        let mut catalog = Self::new();
        match source.fetch_releases().await {
            Ok(remote) => catalog.extend(remote),
            Err(e) => warn!(error = %e, "release list unavailable, using local versions only"),
        }
        for raw in local {
            match Version::local(raw) {
                Ok(v) => catalog.insert(v),
                Err(e) => warn!(version = %raw, error = %e, "skipping local version"),
            }
        }
        info!(versions = catalog.len(), "version catalog loaded");
        catalog
    }
}

/// One entry of the published release list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Parse a `releases.json` body into remote versions.
pub fn parse_release_list(body: &[u8]) -> Result<Vec<Version>, CatalogError> {
    let records: Vec<ReleaseRecord> = serde_json::from_slice(body)?;
    let mut versions = Vec::with_capacity(records.len());
    for record in records {
        match Version::remote(&record.version) {
            Ok(v) => versions.push(v),
            Err(e) => debug!(version = %record.version, error = %e, "ignoring release entry"),
        }
    }
    Ok(versions)
}

/// Supplier of published releases.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self) -> Result<Vec<Version>, CatalogError>;
}

/// Release list over HTTP, mirrored to a file for offline use.
pub struct HttpReleaseSource {
    url: String,
    cache_path: PathBuf,
    offline: bool,
    http_client: reqwest::Client,
}

impl HttpReleaseSource {
    pub fn new(url: &str, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.to_string(),
            cache_path: cache_path.into(),
            offline: false,
            http_client: crate::http::client(),
        }
    }

    /// Skip the network and serve only the cached copy.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    async fn fetch_remote(&self) -> Result<Vec<Version>, CatalogError> {
        let response = self.http_client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::BadStatus(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        let versions = parse_release_list(&body)?;

        if let Some(parent) = self.cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.cache_path, &body).await?;
        debug!(path = ?self.cache_path, count = versions.len(), "release list cached");
        Ok(versions)
    }

    async fn read_cache(&self) -> Result<Vec<Version>, CatalogError> {
        let body = match tokio::fs::read(&self.cache_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NoCache(self.cache_path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        parse_release_list(&body)
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn fetch_releases(&self) -> Result<Vec<Version>, CatalogError> {
        if self.offline {
            return self.read_cache().await;
        }
        match self.fetch_remote().await {
            Ok(versions) => Ok(versions),
            Err(e) => {
                warn!(url = %self.url, error = %e, "release list fetch failed, trying cache");
                self.read_cache().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::remote(s).unwrap()
    }

    #[test]
    fn test_insert_sorts_and_dedups() {
        let catalog = VersionCatalog::from_versions(vec![v("12.0.0"), v("10.1.0"), v("12.0.0")]);
        let listed: Vec<String> = catalog.versions().iter().map(|v| v.to_string()).collect();
        assert_eq!(listed, vec!["10.1.0", "12.0.0"]);
    }

    #[test]
    fn test_remote_replaces_local() {
        let mut catalog = VersionCatalog::new();
        catalog.insert(Version::local("12.0.0").unwrap());
        catalog.insert(v("12.0.0"));
        assert_eq!(catalog.versions()[0].source(), VersionSource::Remote);
    }

    #[test]
    fn test_is_released_major_ignores_local() {
        let mut catalog = VersionCatalog::from_versions(vec![v("11.0.0"), v("12.0.3")]);
        catalog.insert(Version::local("15.0.0").unwrap());
        assert!(catalog.is_released_major(12));
        assert!(catalog.is_released_major(9));
        assert!(!catalog.is_released_major(13));
        assert!(!VersionCatalog::new().is_released_major(1));
    }

    #[test]
    fn test_versions_between_filters_inner_channels() {
        let catalog = VersionCatalog::from_versions(vec![
            v("10.0.0"),
            v("10.1.0"),
            v("11.0.0-beta.1"),
            v("11.0.0-nightly.20200901"),
            v("11.0.0"),
            v("12.0.0"),
        ]);
        let list = catalog.versions_between(&v("11.0.0"), &v("10.0.0"), &ChannelFilter::default());
        let listed: Vec<String> = list.iter().map(|v| v.to_string()).collect();
        assert_eq!(listed, vec!["10.0.0", "10.1.0", "11.0.0-beta.1", "11.0.0"]);
    }

    #[test]
    fn test_versions_between_keeps_unknown_bounds() {
        let catalog = VersionCatalog::from_versions(vec![v("10.1.0")]);
        let list = catalog.versions_between(&v("10.0.0"), &v("10.2.0"), &ChannelFilter::all());
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], v("10.0.0"));
        assert_eq!(list[2], v("10.2.0"));
    }

    #[test]
    fn test_parse_release_list_skips_bad_entries() {
        let body = br#"[{"version":"12.0.0","date":"2021-03-02"},{"version":"bogus"},{"version":"11.3.0"}]"#;
        let versions = parse_release_list(body).unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_source_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("releases.json");
        std::fs::write(&cache, br#"[{"version":"13.0.0"}]"#).unwrap();

        let source = HttpReleaseSource::new("http://127.0.0.1:9/releases.json", &cache).offline(true);
        let versions = source.fetch_releases().await.unwrap();
        assert_eq!(versions, vec![v("13.0.0")]);
    }

    #[tokio::test]
    async fn test_offline_source_without_cache_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            HttpReleaseSource::new("http://127.0.0.1:9/releases.json", dir.path().join("none.json"))
                .offline(true);
        assert!(matches!(
            source.fetch_releases().await,
            Err(CatalogError::NoCache(_))
        ));
    }
}
