//! fiddle-core
//!
//! Template provisioning, version bisection and command dispatch for running
//! small Electron programs ("fiddles") against many runtime versions.

pub mod bisect;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fakes;
pub mod fiddle;
pub mod http;
pub mod message;
pub mod metrics;
pub mod obs;
pub mod runner;
pub mod telemetry;
pub mod template;
pub mod version;
pub mod workbench;

pub use bisect::{max_steps, BisectController, BisectResult};
pub use catalog::{HttpReleaseSource, ReleaseSource, VersionCatalog};
pub use config::FiddleConfig;
pub use dispatch::{Command, Console, Dispatcher, Outcome, StdoutConsole};
pub use error::{
    BisectError, CatalogError, DispatchError, FiddleError, RunnerError, TemplateError,
    VersionError,
};
pub use fiddle::{extract_gist_id, Fiddle, FiddleOrigin, GistSource, HttpGistSource};
pub use message::{Envelope, Event, Request};
pub use runner::{emit_output, OutputEntry, OutputSink, RunRequest, RunResult, RunnerBridge};
pub use template::{
    ArchiveFetcher, FsTemplateStore, HttpArchiveFetcher, TemplateCache, TemplateEntry,
    TemplateStore, FIDDLE_FILES,
};
pub use version::{normalize_version, Branch, ChannelFilter, ReleaseChannel, Version};
pub use workbench::{Workbench, WorkbenchHandle};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// fiddle-core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
