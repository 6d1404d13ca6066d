//! Runtime configuration.
//!
//! Values come from environment variables with sensible defaults; the CLI
//! overrides individual fields from its flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fiddle::DEFAULT_GIST_API;
use crate::template::http::DEFAULT_TEMPLATE_URL;

/// Published Electron release list.
pub const DEFAULT_RELEASES_URL: &str = "https://releases.electronjs.org/releases.json";

/// Command used to run a fiddle. `{version}` and `{dir}` are substituted.
pub const DEFAULT_RUNNER: &str = "npx --yes electron@{version} {dir}";

/// Configuration shared by the library and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FiddleConfig {
    /// User-data root holding `templates/` and `releases.json`.
    pub data_dir: PathBuf,
    /// URL of the release list.
    pub releases_url: String,
    /// Base URL serving `{branch}.zip` template archives.
    pub template_url: String,
    /// Gist API base URL.
    pub gist_api: String,
    /// Runner command template, split on whitespace.
    pub runner_command: Vec<String>,
    /// Versions defined on this machine.
    pub local_versions: Vec<String>,
    /// Never touch the network for the release list.
    pub offline: bool,
}

impl Default for FiddleConfig {
    fn default() -> Self {
        FiddleConfig {
            data_dir: std::env::var_os("FIDDLE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            releases_url: std::env::var("FIDDLE_RELEASES_URL")
                .unwrap_or_else(|_| DEFAULT_RELEASES_URL.to_string()),
            template_url: std::env::var("FIDDLE_TEMPLATE_URL")
                .unwrap_or_else(|_| DEFAULT_TEMPLATE_URL.to_string()),
            gist_api: std::env::var("FIDDLE_GIST_API")
                .unwrap_or_else(|_| DEFAULT_GIST_API.to_string()),
            runner_command: split_command(
                &std::env::var("FIDDLE_RUNNER").unwrap_or_else(|_| DEFAULT_RUNNER.to_string()),
            ),
            local_versions: std::env::var("FIDDLE_LOCAL_VERSIONS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            offline: false,
        }
    }
}

impl FiddleConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.data_dir = data_dir.to_path_buf();
        self
    }

    pub fn with_runner(mut self, command: &str) -> Self {
        self.runner_command = split_command(command);
        self
    }

    pub fn with_local_versions(mut self, versions: &[String]) -> Self {
        self.local_versions = versions.to_vec();
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Directory holding one unpacked template per branch.
    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    /// Cached copy of the release list.
    pub fn releases_cache(&self) -> PathBuf {
        self.data_dir.join("releases.json")
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("fiddle-bisect");
    }
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("fiddle-bisect");
    }
    PathBuf::from(".fiddle-bisect")
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
