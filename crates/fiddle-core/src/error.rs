//! Error taxonomy for fiddle-core.

use std::path::PathBuf;

/// Errors produced while parsing or normalizing version strings.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("version string must not be empty")]
    Empty,

    #[error("unparseable version '{input}': {reason}")]
    Unparseable { input: String, reason: String },
}

/// Errors produced while acquiring a template.
///
/// These never escape [`crate::template::TemplateCache::get_template`]; they
/// are logged and replaced by the bundled fallback.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template download failed with status {status} for {url}")]
    BadStatus { status: u16, url: String },

    #[error("failed to unpack template archive: {0}")]
    Unpack(String),

    #[error("template directory {0} contains no fiddle files")]
    Empty(PathBuf),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TemplateError {
    fn from(err: reqwest::Error) -> Self {
        TemplateError::Http(err.to_string())
    }
}

impl From<zip::result::ZipError> for TemplateError {
    fn from(err: zip::result::ZipError) -> Self {
        TemplateError::Unpack(err.to_string())
    }
}

/// Errors produced while loading the release list.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("release list request failed with status {0}")]
    BadStatus(u16),

    #[error("no cached release list at {0}")]
    NoCache(PathBuf),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Http(err.to_string())
    }
}

/// Errors produced while loading a fiddle from disk or a gist.
#[derive(Debug, thiserror::Error)]
pub enum FiddleError {
    #[error("fiddle directory not found: {0}")]
    NotFound(PathBuf),

    #[error("fiddle at {0} contains no source files")]
    NoFiles(String),

    #[error("gist {id} request failed with status {status}")]
    GistStatus { id: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FiddleError {
    fn from(err: reqwest::Error) -> Self {
        FiddleError::Http(err.to_string())
    }
}

/// Errors produced by a runner bridge.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("runner unavailable: {0}")]
    Unavailable(String),

    #[error("runner command is empty")]
    EmptyCommand,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a bisect.
#[derive(Debug, thiserror::Error)]
pub enum BisectError {
    #[error("no terminal result for {version}: {source}")]
    Runner {
        version: String,
        #[source]
        source: RunnerError,
    },
}

/// Errors surfaced by the command dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid version: {0}")]
    Version(#[from] VersionError),

    #[error("'{0}' is neither an existing path nor a gist")]
    UnknownFiddle(String),

    #[error("workbench is not running")]
    WorkbenchClosed,

    #[error("workbench closed the reply channel before a terminal event")]
    NoTerminalEvent,

    #[error("unexpected {got} while waiting for {expected}")]
    UnexpectedEvent { expected: &'static str, got: String },

    #[error("command aborted: {0}")]
    Aborted(String),
}
