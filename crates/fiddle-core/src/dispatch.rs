//! Command dispatcher: turns one CLI command into a plan of workbench requests.
//!
//! Each request goes out in its own [`Envelope`]. Where a command is gated on
//! a request, the dispatcher prints streamed output as it arrives and waits
//! for the first terminal event on that envelope's channel, exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::DispatchError;
use crate::fiddle::extract_gist_id;
use crate::message::{Envelope, Event, EventReceiver, Request};
use crate::runner::{OutputEntry, RunResult};
use crate::version::{ReleaseChannel, Version};
use crate::workbench::WorkbenchHandle;

/// A parsed CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a local path or a gist.
    Open { target: String },
    /// Run the fiddle once and report pass or fail.
    Test {
        fiddle: Option<String>,
        version: Option<String>,
    },
    /// Find the first bad version between two bounds.
    Bisect {
        good: String,
        bad: String,
        fiddle: Option<String>,
        betas: Option<bool>,
        nightlies: Option<bool>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Open { .. } => "open",
            Command::Test { .. } => "test",
            Command::Bisect { .. } => "bisect",
        }
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Where streamed output lines end up.
pub trait Console: Send + Sync {
    fn print(&self, entry: &OutputEntry);
}

/// Prints output entries on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn print(&self, entry: &OutputEntry) {
        println!("{entry}");
    }
}

/// What a `--fiddle` argument refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FiddleTarget {
    Path(PathBuf),
    Gist(String),
}

fn classify(target: &str) -> Option<FiddleTarget> {
    let path = PathBuf::from(target);
    if path.exists() {
        return Some(FiddleTarget::Path(path));
    }
    extract_gist_id(target).map(FiddleTarget::Gist)
}

pub struct Dispatcher {
    workbench: WorkbenchHandle,
    console: Arc<dyn Console>,
}

impl Dispatcher {
    pub fn new(workbench: WorkbenchHandle, console: Arc<dyn Console>) -> Self {
        Self { workbench, console }
    }

    /// Execute `command` to completion.
    pub async fn execute(&self, command: Command) -> Result<Outcome, DispatchError> {
        info!(command = command.name(), "dispatching command");
        match command {
            Command::Open { target } => self.open(&target).await,
            Command::Test { fiddle, version } => self.test(fiddle.as_deref(), version.as_deref()).await,
            Command::Bisect {
                good,
                bad,
                fiddle,
                betas,
                nightlies,
            } => {
                self.bisect(&good, &bad, fiddle.as_deref(), betas, nightlies)
                    .await
            }
        }
    }

    /// Stop the workbench once every queued request has been handled.
    pub async fn shutdown(self) {
        self.workbench.shutdown().await;
    }

    async fn open(&self, target: &str) -> Result<Outcome, DispatchError> {
        match classify(target) {
            Some(FiddleTarget::Path(path)) => {
                let success = self
                    .gated(Request::OpenFiddle { paths: vec![path] })
                    .await?;
                Ok(Outcome { success })
            }
            Some(FiddleTarget::Gist(id)) => {
                // Not gated: the load finishes in the background.
                self.send(Request::OpenGist { id }).await?;
                Ok(Outcome { success: true })
            }
            None => {
                debug!(target = %target, "open target is neither a path nor a gist");
                Ok(Outcome { success: true })
            }
        }
    }

    async fn test(
        &self,
        fiddle: Option<&str>,
        version: Option<&str>,
    ) -> Result<Outcome, DispatchError> {
        let version = version.map(Version::remote).transpose()?;
        let fiddle = fiddle.map(resolve_fiddle).transpose()?;

        if let Some(target) = fiddle {
            if !self.load(target).await? {
                return Ok(Outcome { success: false });
            }
        }
        if let Some(version) = version {
            self.gated(Request::SetVersion { version }).await?;
        }

        let rx = self.send(Request::RunFiddle).await?;
        match self.await_terminal(rx).await? {
            Event::RunDone { result } => Ok(Outcome {
                success: result == RunResult::Success,
            }),
            other => Err(unexpected("run-done", other)),
        }
    }

    async fn bisect(
        &self,
        good: &str,
        bad: &str,
        fiddle: Option<&str>,
        betas: Option<bool>,
        nightlies: Option<bool>,
    ) -> Result<Outcome, DispatchError> {
        let good = Version::remote(good)?;
        let bad = Version::remote(bad)?;
        let fiddle = fiddle.map(resolve_fiddle).transpose()?;

        let mut show = Vec::new();
        let mut hide = Vec::new();
        for (flag, channel) in [(betas, ReleaseChannel::Beta), (nightlies, ReleaseChannel::Nightly)] {
            match flag {
                Some(true) => show.push(channel),
                Some(false) => hide.push(channel),
                None => {}
            }
        }
        if !show.is_empty() {
            self.gated(Request::ShowChannels { channels: show }).await?;
        }
        if !hide.is_empty() {
            self.gated(Request::HideChannels { channels: hide }).await?;
        }

        if let Some(target) = fiddle {
            if !self.load(target).await? {
                return Ok(Outcome { success: false });
            }
        }

        let rx = self.send(Request::BisectFiddle { good, bad }).await?;
        match self.await_terminal(rx).await? {
            Event::BisectDone { result } => Ok(Outcome {
                success: result.is_resolved(),
            }),
            other => Err(unexpected("bisect-done", other)),
        }
    }

    async fn load(&self, target: FiddleTarget) -> Result<bool, DispatchError> {
        let request = match target {
            FiddleTarget::Path(path) => Request::OpenFiddle { paths: vec![path] },
            FiddleTarget::Gist(id) => Request::OpenGist { id },
        };
        self.gated(request).await
    }

    /// Send `request` and wait for its `command-done`.
    async fn gated(&self, request: Request) -> Result<bool, DispatchError> {
        let rx = self.send(request).await?;
        match self.await_terminal(rx).await? {
            Event::CommandDone { success } => Ok(success),
            other => Err(unexpected("command-done", other)),
        }
    }

    async fn send(&self, request: Request) -> Result<EventReceiver, DispatchError> {
        debug!(request = request.name(), "sending request");
        let (envelope, rx) = Envelope::new(request);
        self.workbench
            .send(envelope)
            .await
            .map_err(|_| DispatchError::WorkbenchClosed)?;
        Ok(rx)
    }

    /// Print output until the first terminal event, then drop the receiver.
    async fn await_terminal(&self, mut rx: EventReceiver) -> Result<Event, DispatchError> {
        while let Some(event) = rx.recv().await {
            match event {
                Event::OutputEntry { entry } => self.console.print(&entry),
                Event::Aborted { reason } => return Err(DispatchError::Aborted(reason)),
                terminal => return Ok(terminal),
            }
        }
        Err(DispatchError::NoTerminalEvent)
    }
}

fn resolve_fiddle(target: &str) -> Result<FiddleTarget, DispatchError> {
    classify(target).ok_or_else(|| DispatchError::UnknownFiddle(target.to_string()))
}

fn unexpected(expected: &'static str, got: Event) -> DispatchError {
    DispatchError::UnexpectedEvent {
        expected,
        got: got.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome { success: true }.exit_code(), 0);
        assert_eq!(Outcome { success: false }.exit_code(), 1);
    }

    #[test]
    fn test_classify_gist_and_garbage() {
        assert_eq!(
            classify("af3e1a018f5dcce4a2ff40004ef5bab5"),
            Some(FiddleTarget::Gist("af3e1a018f5dcce4a2ff40004ef5bab5".to_string()))
        );
        assert_eq!(classify("not-a-gist-or-path"), None);
    }

    #[test]
    fn test_classify_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            classify(dir.path().to_str().unwrap()),
            Some(FiddleTarget::Path(dir.path().to_path_buf()))
        );
    }

    #[test]
    fn test_unknown_fiddle_is_an_error() {
        assert!(matches!(
            resolve_fiddle("nope-nope"),
            Err(DispatchError::UnknownFiddle(_))
        ));
    }
}
