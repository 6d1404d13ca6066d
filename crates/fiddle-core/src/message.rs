//! Typed messages between the command dispatcher and the workbench.
//!
//! Every [`Request`] travels in an [`Envelope`] that carries its own reply
//! channel. The workbench streams [`Event::OutputEntry`] events on it and finishes
//! with exactly one terminal event.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bisect::BisectResult;
use crate::runner::{OutputEntry, RunResult};
use crate::version::{ReleaseChannel, Version};

/// Work asked of the workbench.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    OpenFiddle { paths: Vec<PathBuf> },
    OpenGist { id: String },
    SetVersion { version: Version },
    ShowChannels { channels: Vec<ReleaseChannel> },
    HideChannels { channels: Vec<ReleaseChannel> },
    RunFiddle,
    BisectFiddle { good: Version, bad: Version },
}

impl Request {
    /// Logical channel name.
    pub fn name(&self) -> &'static str {
        match self {
            Request::OpenFiddle { .. } => "open-fiddle",
            Request::OpenGist { .. } => "open-gist",
            Request::SetVersion { .. } => "set-version",
            Request::ShowChannels { .. } => "show-channels",
            Request::HideChannels { .. } => "hide-channels",
            Request::RunFiddle => "run-fiddle",
            Request::BisectFiddle { .. } => "bisect-fiddle",
        }
    }
}

/// Something the workbench reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    OutputEntry { entry: OutputEntry },
    RunDone { result: RunResult },
    BisectDone { result: BisectResult },
    CommandDone { success: bool },
    /// No terminal result could be produced; the command cannot continue.
    Aborted { reason: String },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OutputEntry { .. } => "output-entry",
            Event::RunDone { .. } => "run-done",
            Event::BisectDone { .. } => "bisect-done",
            Event::CommandDone { .. } => "command-done",
            Event::Aborted { .. } => "aborted",
        }
    }

    /// Whether this event ends the exchange for its request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::OutputEntry { .. })
    }
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// A request plus the channel its events go to.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: EventSender,
}

impl Envelope {
    /// Wrap `request`, returning the receiving end of its reply channel.
    pub fn new(request: Request) -> (Self, EventReceiver) {
        let (reply, rx) = mpsc::unbounded_channel();
        (Self { request, reply }, rx)
    }
}
