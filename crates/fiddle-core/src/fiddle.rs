//! Fiddles: the small multi-file programs that get run and bisected.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::FiddleError;
use crate::template::{TemplateEntry, FIDDLE_FILES};
use crate::version::Branch;

/// URL prefix of a gist page.
pub const GIST_URL_PREFIX: &str = "https://gist.github.com";

/// GitHub REST endpoint for gists.
pub const DEFAULT_GIST_API: &str = "https://api.github.com/gists";

const GIST_ID_PATTERN: &str = r"^[0-9A-Fa-f]{32}$";

/// Extensions loaded from a fiddle directory besides the known file names.
const SOURCE_EXTENSIONS: [&str; 6] = ["js", "cjs", "mjs", "html", "css", "json"];

fn gist_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(GIST_ID_PATTERN).expect("gist id pattern is valid"))
}

/// Extract a 32-character hex gist id from a bare id or a gist URL.
///
/// One trailing slash is stripped before matching. For URLs starting with
/// [`GIST_URL_PREFIX`] only the final path segment is considered.
pub fn extract_gist_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let candidate = if trimmed.starts_with(GIST_URL_PREFIX) {
        trimmed.rsplit('/').next()?
    } else {
        trimmed
    };
    gist_id_regex()
        .is_match(candidate)
        .then(|| candidate.to_string())
}

/// Where a fiddle's sources came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FiddleOrigin {
    LocalDir { path: PathBuf },
    Gist { id: String },
    Template { branch: Branch },
}

impl fmt::Display for FiddleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiddleOrigin::LocalDir { path } => write!(f, "{}", path.display()),
            FiddleOrigin::Gist { id } => write!(f, "gist:{id}"),
            FiddleOrigin::Template { branch } => write!(f, "template:{branch}"),
        }
    }
}

/// A fiddle: source files keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fiddle {
    files: BTreeMap<String, String>,
    origin: FiddleOrigin,
}

impl Fiddle {
    pub fn new(files: BTreeMap<String, String>, origin: FiddleOrigin) -> Self {
        Self { files, origin }
    }

    /// A fiddle consisting of a branch's boilerplate.
    pub fn from_template(entry: &TemplateEntry, branch: Branch) -> Self {
        Self::new(entry.files().clone(), FiddleOrigin::Template { branch })
    }

    /// Load the source files at the top level of `dir`.
    pub async fn load_dir(dir: &Path) -> Result<Self, FiddleError> {
        if !tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(FiddleError::NotFound(dir.to_path_buf()));
        }

        let mut files = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_source_file(&name) {
                debug!(file = %name, "skipping non-source file");
                continue;
            }
            files.insert(name, tokio::fs::read_to_string(entry.path()).await?);
        }

        if files.is_empty() {
            return Err(FiddleError::NoFiles(dir.display().to_string()));
        }
        info!(path = ?dir, files = files.len(), "fiddle loaded from directory");
        Ok(Self::new(
            files,
            FiddleOrigin::LocalDir {
                path: dir.to_path_buf(),
            },
        ))
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn origin(&self) -> &FiddleOrigin {
        &self.origin
    }

    /// SHA-256 over file names and contents, in name order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, body) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(body.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }

    /// Write every file into `dir`, which must exist.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        for (name, body) in &self.files {
            tokio::fs::write(dir.join(name), body).await?;
        }
        Ok(())
    }
}

fn is_source_file(name: &str) -> bool {
    FIDDLE_FILES.contains(&name)
        || Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false)
}

/// Loads fiddles published as gists.
#[async_trait]
pub trait GistSource: Send + Sync {
    async fn fetch_gist(&self, id: &str) -> Result<Fiddle, FiddleError>;
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
}

/// Gist loader backed by the GitHub REST API.
pub struct HttpGistSource {
    api_base: String,
    http_client: reqwest::Client,
}

impl HttpGistSource {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            http_client: crate::http::client(),
        }
    }
}

impl Default for HttpGistSource {
    fn default() -> Self {
        Self::new(DEFAULT_GIST_API)
    }
}

#[async_trait]
impl GistSource for HttpGistSource {
    async fn fetch_gist(&self, id: &str) -> Result<Fiddle, FiddleError> {
        let url = format!("{}/{}", self.api_base, id);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FiddleError::GistStatus {
                id: id.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().await?;
        let gist: GistResponse = serde_json::from_slice(&body)?;

        let files: BTreeMap<String, String> = gist
            .files
            .into_iter()
            .filter_map(|(name, file)| file.content.map(|content| (name, content)))
            .collect();
        if files.is_empty() {
            return Err(FiddleError::NoFiles(format!("gist {id}")));
        }
        info!(gist = %id, files = files.len(), "fiddle loaded from gist");
        Ok(Fiddle::new(files, FiddleOrigin::Gist { id: id.to_string() }))
    }
}
