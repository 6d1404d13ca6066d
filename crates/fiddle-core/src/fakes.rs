//! In-memory fakes for the core's seams (testing only)
//!
//! Provides `CountingFetcher`, `MemoryTemplateStore`, `ScriptedRunner`,
//! `FakeGistSource` and `MemoryConsole`, which satisfy the trait contracts
//! without network, disk or child processes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::dispatch::Console;
use crate::error::{FiddleError, RunnerError, TemplateError};
use crate::fiddle::{Fiddle, FiddleOrigin, GistSource};
use crate::runner::{emit_output, OutputEntry, OutputSink, RunRequest, RunResult, RunnerBridge};
use crate::template::{ArchiveFetcher, TemplateEntry, TemplateStore};
use crate::version::{Branch, Version};

// ---------------------------------------------------------------------------
// CountingFetcher
// ---------------------------------------------------------------------------

/// Archive fetcher that counts calls. Archives are the JSON form of a
/// [`TemplateEntry`], which [`MemoryTemplateStore`] understands.
#[derive(Debug)]
pub struct CountingFetcher {
    entry: Option<TemplateEntry>,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingFetcher {
    /// Serve `entry` for every branch.
    pub fn serving(entry: TemplateEntry) -> Self {
        Self {
            entry: Some(entry),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every fetch with a 404.
    pub fn failing() -> Self {
        Self {
            entry: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveFetcher for CountingFetcher {
    async fn fetch_archive(&self, branch: &Branch) -> Result<Vec<u8>, TemplateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.entry {
            Some(entry) => serde_json::to_vec(entry).map_err(|e| TemplateError::Unpack(e.to_string())),
            None => Err(TemplateError::BadStatus {
                status: 404,
                url: format!("memory://{branch}.zip"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTemplateStore
// ---------------------------------------------------------------------------

/// Template store backed by a `HashMap<Branch, TemplateEntry>`.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    entries: Mutex<HashMap<Branch, TemplateEntry>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `entry` was unpacked for `branch` by an earlier process.
    pub fn seed(&self, branch: Branch, entry: TemplateEntry) {
        self.entries.lock().unwrap().insert(branch, entry);
    }

    pub fn contains(&self, branch: &Branch) -> bool {
        self.entries.lock().unwrap().contains_key(branch)
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn load_cached(&self, branch: &Branch) -> Result<Option<TemplateEntry>, TemplateError> {
        Ok(self.entries.lock().unwrap().get(branch).cloned())
    }

    async fn store_archive(
        &self,
        branch: &Branch,
        archive: Vec<u8>,
    ) -> Result<TemplateEntry, TemplateError> {
        let entry: TemplateEntry =
            serde_json::from_slice(&archive).map_err(|e| TemplateError::Unpack(e.to_string()))?;
        self.entries
            .lock()
            .unwrap()
            .insert(branch.clone(), entry.clone());
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

type Script = Box<dyn Fn(&Version) -> RunResult + Send + Sync>;

/// Runner whose result is a pure function of the version.
pub struct ScriptedRunner {
    script: Script,
    unavailable: bool,
    runs: Mutex<Vec<Version>>,
}

impl ScriptedRunner {
    /// Decide each run with `script`.
    pub fn new(script: impl Fn(&Version) -> RunResult + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            unavailable: false,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Fail on `first_bad` and every newer version, succeed before it.
    pub fn failing_from(first_bad: Version) -> Self {
        Self::new(move |v| {
            if *v >= first_bad {
                RunResult::Failure
            } else {
                RunResult::Success
            }
        })
    }

    /// Error out of every run, as if the runtime could not be launched.
    pub fn unavailable() -> Self {
        let mut runner = Self::new(|_| RunResult::Invalid);
        runner.unavailable = true;
        runner
    }

    /// Versions run so far, in order.
    pub fn versions_run(&self) -> Vec<Version> {
        self.runs.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl RunnerBridge for ScriptedRunner {
    async fn run(&self, request: RunRequest, output: OutputSink) -> Result<RunResult, RunnerError> {
        self.runs.lock().unwrap().push(request.version.clone());
        if self.unavailable {
            return Err(RunnerError::Unavailable("scripted runner is offline".to_string()));
        }
        let result = (self.script)(&request.version);
        emit_output(&output, format!("{} -> {result}", request.version));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// FakeGistSource
// ---------------------------------------------------------------------------

/// Gist source serving a fixed set of gists.
#[derive(Debug, Default)]
pub struct FakeGistSource {
    gists: Mutex<HashMap<String, BTreeMap<String, String>>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeGistSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gist(self, id: &str, files: BTreeMap<String, String>) -> Self {
        self.gists.lock().unwrap().insert(id.to_string(), files);
        self
    }

    /// Ids requested so far.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl GistSource for FakeGistSource {
    async fn fetch_gist(&self, id: &str) -> Result<Fiddle, FiddleError> {
        self.fetched.lock().unwrap().push(id.to_string());
        match self.gists.lock().unwrap().get(id) {
            Some(files) => Ok(Fiddle::new(
                files.clone(),
                FiddleOrigin::Gist { id: id.to_string() },
            )),
            None => Err(FiddleError::GistStatus {
                id: id.to_string(),
                status: 404,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryConsole
// ---------------------------------------------------------------------------

/// Console that records printed lines.
#[derive(Debug, Default, Clone)]
pub struct MemoryConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of every printed entry, without timestamps.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Console for MemoryConsole {
    fn print(&self, entry: &OutputEntry) {
        self.lines.lock().unwrap().push(entry.text.clone());
    }
}
