//! Headless workbench: the content layer the dispatcher talks to.
//!
//! The workbench owns the currently loaded fiddle, the selected version and
//! channel visibility. It processes requests one at a time from a queue, so a
//! run or bisect step is never started while another is in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::bisect::BisectController;
use crate::catalog::VersionCatalog;
use crate::error::FiddleError;
use crate::fiddle::{Fiddle, GistSource};
use crate::message::{Envelope, Event, EventSender, Request};
use crate::metrics::METRICS;
use crate::obs::{emit_run_finished, run_span};
use crate::runner::{OutputEntry, OutputSink, RunRequest, RunResult, RunnerBridge};
use crate::template::TemplateCache;
use crate::version::{Branch, ChannelFilter, Version};

/// Depth of the request queue.
const QUEUE_DEPTH: usize = 32;

/// Request handler and state holder.
pub struct Workbench {
    catalog: Arc<VersionCatalog>,
    templates: Arc<TemplateCache>,
    runner: Arc<dyn RunnerBridge>,
    gists: Arc<dyn GistSource>,
    fiddle: Option<Arc<Fiddle>>,
    version: Option<Version>,
    channels: ChannelFilter,
}

impl Workbench {
    pub fn new(
        catalog: Arc<VersionCatalog>,
        templates: Arc<TemplateCache>,
        runner: Arc<dyn RunnerBridge>,
        gists: Arc<dyn GistSource>,
    ) -> Self {
        Self {
            catalog,
            templates,
            runner,
            gists,
            fiddle: None,
            version: None,
            channels: ChannelFilter::default(),
        }
    }

    pub fn fiddle(&self) -> Option<&Arc<Fiddle>> {
        self.fiddle.as_ref()
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn channels(&self) -> ChannelFilter {
        self.channels
    }

    /// Move the workbench onto a task serving requests in arrival order.
    pub fn spawn(mut self) -> WorkbenchHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
        let task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                self.handle(envelope.request, envelope.reply).await;
            }
            debug!("workbench request queue closed");
        });
        WorkbenchHandle { requests: tx, task }
    }

    /// Process one request, sending its events to `reply`.
    pub async fn handle(&mut self, request: Request, reply: EventSender) {
        debug!(request = request.name(), "handling request");
        let terminal = match request {
            Request::OpenFiddle { paths } => self.open_paths(&paths, &reply).await,
            Request::OpenGist { id } => self.open_gist(&id, &reply).await,
            Request::SetVersion { version } => {
                if !self.catalog.contains(&version) {
                    warn!(version = %version, "version is not in the catalog");
                }
                self.version = Some(version);
                Event::CommandDone { success: true }
            }
            Request::ShowChannels { channels } => {
                self.channels.show(&channels);
                Event::CommandDone { success: true }
            }
            Request::HideChannels { channels } => {
                self.channels.hide(&channels);
                Event::CommandDone { success: true }
            }
            Request::RunFiddle => self.run(&reply).await,
            Request::BisectFiddle { good, bad } => self.bisect(good, bad, &reply).await,
        };
        let _ = reply.send(terminal);
    }

    async fn open_paths(&mut self, paths: &[PathBuf], reply: &EventSender) -> Event {
        match load_paths(paths).await {
            Ok(fiddle) => {
                say(
                    reply,
                    format!("Opened fiddle {} ({} files)", fiddle.origin(), fiddle.files().len()),
                );
                self.fiddle = Some(Arc::new(fiddle));
                Event::CommandDone { success: true }
            }
            Err(e) => {
                warn!(error = %e, "failed to open fiddle");
                say(reply, format!("Could not open fiddle: {e}"));
                Event::CommandDone { success: false }
            }
        }
    }

    async fn open_gist(&mut self, id: &str, reply: &EventSender) -> Event {
        match self.gists.fetch_gist(id).await {
            Ok(fiddle) => {
                say(
                    reply,
                    format!("Opened gist {id} ({} files)", fiddle.files().len()),
                );
                self.fiddle = Some(Arc::new(fiddle));
                Event::CommandDone { success: true }
            }
            Err(e) => {
                warn!(gist = %id, error = %e, "failed to open gist");
                say(reply, format!("Could not open gist {id}: {e}"));
                Event::CommandDone { success: false }
            }
        }
    }

    /// The loaded fiddle, or the template for `version` when none is loaded.
    async fn current_fiddle(&self, version: &Version) -> Arc<Fiddle> {
        if let Some(fiddle) = &self.fiddle {
            return Arc::clone(fiddle);
        }
        let raw = version.to_string();
        let entry = self.templates.get_template(Some(&raw)).await;
        Arc::new(Fiddle::from_template(&entry, Branch::for_version(Some(&raw))))
    }

    /// Selected version, or the newest catalog version visible under the
    /// current channels.
    fn current_version(&self) -> Option<Version> {
        self.version.clone().or_else(|| {
            self.catalog
                .versions()
                .iter()
                .rev()
                .find(|v| self.channels.allows(v.channel()))
                .cloned()
        })
    }

    async fn run(&self, reply: &EventSender) -> Event {
        let Some(version) = self.current_version() else {
            return Event::Aborted {
                reason: "no version selected and no versions known".to_string(),
            };
        };
        let fiddle = self.current_fiddle(&version).await;
        let request = RunRequest::new(version.clone(), fiddle);
        let span = run_span(&request.id.to_string(), &version.to_string());

        say(reply, format!("Running fiddle against Electron {version}"));
        let started = Instant::now();
        let (sink, forwarder) = forward_output(reply);
        let result = self.runner.run(request.clone(), sink).instrument(span).await;
        let _ = forwarder.await;

        match result {
            Ok(result) => {
                METRICS.inc_runs();
                emit_run_finished(
                    &request.id.to_string(),
                    &version.to_string(),
                    started.elapsed().as_millis() as u64,
                    &result.to_string(),
                );
                say(reply, describe(&version, result));
                Event::RunDone { result }
            }
            Err(e) => Event::Aborted {
                reason: format!("run against {version} failed: {e}"),
            },
        }
    }

    async fn bisect(&self, good: Version, bad: Version, reply: &EventSender) -> Event {
        let older = if good <= bad { &good } else { &bad };
        let fiddle = self.current_fiddle(older).await;
        let controller = BisectController::new(Arc::clone(&self.runner), Arc::clone(&self.catalog))
            .with_channels(self.channels);

        let (sink, forwarder) = forward_output(reply);
        let outcome = controller.bisect(good, bad, fiddle, &sink).await;
        drop(sink);
        let _ = forwarder.await;

        match outcome {
            Ok(result) => {
                info!(resolved = result.is_resolved(), steps = result.steps, "bisect done");
                Event::BisectDone { result }
            }
            Err(e) => Event::Aborted {
                reason: e.to_string(),
            },
        }
    }
}

/// Handle for sending requests to a spawned [`Workbench`].
pub struct WorkbenchHandle {
    requests: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl WorkbenchHandle {
    /// Queue an envelope.
    pub async fn send(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.requests.send(envelope).await.map_err(|e| e.0)
    }

    /// Stop accepting requests and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.requests);
        if let Err(e) = self.task.await {
            warn!(error = %e, "workbench task ended abnormally");
        }
    }
}

fn say(reply: &EventSender, text: impl Into<String>) {
    let _ = reply.send(Event::OutputEntry {
        entry: OutputEntry::now(text),
    });
}

fn describe(version: &Version, result: RunResult) -> String {
    match result {
        RunResult::Success => format!("Fiddle passed on Electron {version}"),
        RunResult::Failure => format!("Fiddle failed on Electron {version}"),
        RunResult::Invalid => format!("Run on Electron {version} was inconclusive"),
    }
}

/// Bridge runner output into the reply channel.
///
/// The returned task finishes once every clone of the sink is dropped, so
/// awaiting it guarantees all output precedes the terminal event.
fn forward_output(reply: &EventSender) -> (OutputSink, JoinHandle<()>) {
    let (sink, mut rx) = mpsc::unbounded_channel::<OutputEntry>();
    let reply = reply.clone();
    let task = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if reply.send(Event::OutputEntry { entry }).is_err() {
                break;
            }
        }
    });
    (sink, task)
}

/// Load fiddle sources from directories or files (a file contributes its
/// parent directory).
async fn load_paths(paths: &[PathBuf]) -> Result<Fiddle, FiddleError> {
    let mut merged: Option<Fiddle> = None;
    for path in paths {
        let dir = fiddle_dir(path).await;
        let loaded = Fiddle::load_dir(&dir).await?;
        merged = Some(match merged {
            None => loaded,
            Some(existing) => {
                let mut files = existing.files().clone();
                files.extend(loaded.files().clone());
                Fiddle::new(files, existing.origin().clone())
            }
        });
    }
    merged.ok_or_else(|| FiddleError::NoFiles("empty path list".to_string()))
}

async fn fiddle_dir(path: &Path) -> PathBuf {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    match path.parent() {
        Some(parent) if is_file => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}
