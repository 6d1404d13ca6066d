use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::ArchiveFetcher;
use crate::error::TemplateError;
use crate::version::Branch;

/// Upstream repository serving `{base}/{branch}.zip` archives.
pub const DEFAULT_TEMPLATE_URL: &str = "https://github.com/electron/electron-quick-start/archive";

/// Fetches branch archives over HTTP.
pub struct HttpArchiveFetcher {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpArchiveFetcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: crate::http::client(),
        }
    }

    /// Archive URL for a branch.
    pub fn archive_url(&self, branch: &Branch) -> String {
        format!("{}/{}.zip", self.base_url, branch)
    }
}

impl Default for HttpArchiveFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_URL)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch_archive(&self, branch: &Branch) -> Result<Vec<u8>, TemplateError> {
        let url = self.archive_url(branch);
        info!(branch = %branch, url = %url, "downloading template archive");

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TemplateError::BadStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let bytes = response.bytes().await?.to_vec();
        debug!(
            branch = %branch,
            size = bytes.len(),
            sha256 = %hex::encode(Sha256::digest(&bytes)),
            "template archive downloaded"
        );
        Ok(bytes)
    }
}
