//! Fiddle execution in a child process.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fiddle_core::{emit_output, OutputSink, RunRequest, RunResult, RunnerBridge, RunnerError};

use crate::command::expand_command;

const PACKAGE_JSON: &str = "package.json";

/// Runs each fiddle by launching the configured command in a scratch
/// directory holding the fiddle files.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Kill runs that take longer than `timeout`; they count as invalid.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    async fn wait(
        &self,
        child: &mut tokio::process::Child,
        output: &OutputSink,
    ) -> Result<Option<ExitStatus>, RunnerError> {
        let Some(limit) = self.timeout else {
            return Ok(Some(child.wait().await?));
        };
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(Some(status?)),
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "run timed out, killing");
                emit_output(output, format!("Run timed out after {}s", limit.as_secs()));
                #[cfg(unix)]
                kill_process_group(child).await;
                child.kill().await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl RunnerBridge for ProcessRunner {
    async fn run(&self, request: RunRequest, output: OutputSink) -> Result<RunResult, RunnerError> {
        let start = Instant::now();
        let scratch = tempfile::Builder::new().prefix("fiddle-").tempdir()?;
        request.fiddle.write_to(scratch.path()).await?;
        write_package_json(scratch.path(), &request.version.to_string()).await?;

        let argv = expand_command(&self.command, &request.version, scratch.path())?;
        debug!(run_id = %request.id, argv = ?argv, "spawning runner");

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can also reach what the runner spawns.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::Unavailable(format!("{}: {e}", argv[0])))?;

        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|out| pump(out, output.clone())),
            child.stderr.take().map(|err| pump(err, output.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let status = self.wait(&mut child, &output).await?;
        for reader in readers {
            // After a timeout kill, leftover descendants may still hold the
            // pipes open; stop reading instead of waiting for EOF.
            if status.is_none() {
                reader.abort();
            }
            let _ = reader.await;
        }

        let result = status.map(classify).unwrap_or(RunResult::Invalid);
        debug!(
            run_id = %request.id,
            exit_code = ?status.and_then(|s| s.code()),
            duration_ms = start.elapsed().as_millis() as u64,
            result = %result,
            "runner exited"
        );
        Ok(result)
    }
}

/// Kill every process in the child's group.
#[cfg(unix)]
async fn kill_process_group(child: &tokio::process::Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let killed = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match killed {
        Ok(status) if status.success() => debug!(pgid = pid, "runner process group killed"),
        Ok(status) => debug!(pgid = pid, status = %status, "kill reported failure"),
        Err(e) => debug!(pgid = pid, error = %e, "could not signal runner process group"),
    }
}

/// Map an exit status onto a run result. Death by signal says nothing about
/// the fiddle.
fn classify(status: ExitStatus) -> RunResult {
    if status.success() {
        RunResult::Success
    } else if status.code().is_some() {
        RunResult::Failure
    } else {
        RunResult::Invalid
    }
}

/// Forward each line of `reader` to `sink` until EOF.
fn pump<R>(reader: R, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => emit_output(&sink, line),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "stopped reading runner output");
                    break;
                }
            }
        }
    })
}

/// Electron needs a package manifest naming the entry point.
async fn write_package_json(dir: &Path, version: &str) -> std::io::Result<()> {
    let path = dir.join(PACKAGE_JSON);
    if tokio::fs::try_exists(&path).await? {
        return Ok(());
    }
    let manifest = serde_json::json!({
        "name": "fiddle",
        "version": "0.0.0",
        "main": "main.js",
        "devDependencies": { "electron": version },
    });
    tokio::fs::write(&path, serde_json::to_vec_pretty(&manifest)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_package_json_written_once() {
        let dir = tempfile::tempdir().unwrap();
        write_package_json(dir.path(), "12.0.0").await.unwrap();
        let body = std::fs::read_to_string(dir.path().join(PACKAGE_JSON)).unwrap();
        assert!(body.contains("\"main\": \"main.js\""));

        std::fs::write(dir.path().join(PACKAGE_JSON), "{}").unwrap();
        write_package_json(dir.path(), "13.0.0").await.unwrap();
        let body = std::fs::read_to_string(dir.path().join(PACKAGE_JSON)).unwrap();
        assert_eq!(body, "{}");
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit_statuses() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(classify(ExitStatus::from_raw(0)), RunResult::Success);
        assert_eq!(classify(ExitStatus::from_raw(1 << 8)), RunResult::Failure);
        assert_eq!(classify(ExitStatus::from_raw(9)), RunResult::Invalid);
    }
}
