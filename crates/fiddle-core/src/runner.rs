//! Contract with the facility that executes a fiddle against a version.
//!
//! The core never launches a runtime itself. It submits a [`RunRequest`] to a
//! [`RunnerBridge`], receives output lines through an [`OutputSink`] while the
//! run is in progress, and gets exactly one terminal [`RunResult`] back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RunnerError;
use crate::fiddle::Fiddle;
use crate::version::Version;

/// Terminal outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    /// The fiddle exited cleanly.
    Success,
    /// The fiddle exited with a failure status.
    Failure,
    /// The run ended in a way that says nothing about the fiddle.
    Invalid,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunResult::Success => "success",
            RunResult::Failure => "failure",
            RunResult::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// A timestamped output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl OutputEntry {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

impl fmt::Display for OutputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Push side of an output stream. Sending never blocks.
pub type OutputSink = mpsc::UnboundedSender<OutputEntry>;

/// Send a line to `sink`, ignoring a receiver that has gone away.
pub fn emit_output(sink: &OutputSink, text: impl Into<String>) {
    let _ = sink.send(OutputEntry::now(text));
}

/// One run of a fiddle against one version.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub id: Uuid,
    pub version: Version,
    pub fiddle: Arc<Fiddle>,
}

impl RunRequest {
    pub fn new(version: Version, fiddle: Arc<Fiddle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            version,
            fiddle,
        }
    }
}

/// Execution facility.
///
/// Implementations stream output through `output` while running and return
/// only once the run has reached a terminal state. An `Err` means no terminal
/// result could be obtained at all.
#[async_trait]
pub trait RunnerBridge: Send + Sync {
    async fn run(&self, request: RunRequest, output: OutputSink) -> Result<RunResult, RunnerError>;
}
