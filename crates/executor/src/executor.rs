use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zeroize::Zeroize;

use shellward_confirm::{is_elevation_request, SessionState};
use shellward_policy::CommandRequest;

use crate::output::{OutputAggregator, OutputEvent};
use crate::process_control::{platform_process_control, ProcessControl};
use crate::result::ExecutionResult;

/// Live-output notices are delivered at most once per this interval. This is
/// a rate limiter, not a correctness boundary; the final result always
/// carries the complete output.
pub const OUTPUT_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Grace between the graceful and the forceful group signal.
pub const KILL_GRACE: Duration = Duration::from_millis(200);

const READ_CHUNK_SIZE: usize = 8192;
const ELEVATION_FAILURE_PHRASES: &[&str] = &["sorry, try again", "incorrect password attempt"];

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("elevation secret missing or expired")]
    ElevationUnavailable,
    #[error("failed to spawn shell process: {0}")]
    Spawn(String),
    #[error("i/o failure while supervising shell process: {0}")]
    Io(#[from] std::io::Error),
}

/// Spawns the OS process for one command invocation, streams its output,
/// tracks the process group and any orphaned background processes, and
/// enforces cooperative cancellation. One `run` per invocation; concurrent
/// invocations share only the session state.
pub struct ProcessExecutor {
    control: Arc<dyn ProcessControl>,
    session: Arc<SessionState>,
    project_root: PathBuf,
}

impl ProcessExecutor {
    pub fn new(session: Arc<SessionState>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            control: platform_process_control(),
            session,
            project_root: project_root.into(),
        }
    }

    /// Runs the command to completion or cancellation. The future resolves
    /// in every case; cancellation marks the result `aborted` and reports
    /// whatever output was captured up to that point.
    pub async fn run<F>(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
        mut on_output: F,
    ) -> Result<ExecutionResult, ExecError>
    where
        F: FnMut(OutputEvent) + Send,
    {
        let command_line = request.command.trim();
        let cwd = match request.directory.as_deref() {
            Some(dir) => self.project_root.join(dir),
            None => self.project_root.clone(),
        };

        let secret = if is_elevation_request(command_line) {
            match self.session.credentials.get() {
                Some(secret) => Some(secret),
                None => return Err(ExecError::ElevationUnavailable),
            }
        } else {
            None
        };
        let effective = match &secret {
            // The secret travels over stdin, never on the command line where
            // a process listing would expose it.
            Some(_) => wrap_elevation(command_line),
            None => command_line.to_string(),
        };

        let scratch = cfg!(unix).then(ScratchFile::new);

        let mut command = self
            .control
            .build(&effective, scratch.as_ref().map(ScratchFile::path));
        command
            .current_dir(&cwd)
            .stdin(if secret.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(command = %command_line, cwd = %cwd.display(), "spawning shell command");
        let mut child = command
            .spawn()
            .map_err(|err| ExecError::Spawn(scrub_secret(err.to_string(), secret.as_deref())))?;

        let pid = child.id().map(|id| id as i32);
        let group_id = if self.control.supports_process_groups() {
            pid
        } else {
            None
        };

        if let Some(secret_value) = secret.as_deref() {
            if let Some(mut stdin) = child.stdin.take() {
                let mut line = format!("{secret_value}\n");
                if let Err(err) = stdin.write_all(line.as_bytes()).await {
                    tracing::warn!(error = %err, "could not hand the elevation secret to the child");
                }
                line.zeroize();
            }
        }

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Spawn("stdout pipe unavailable".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::Spawn("stderr pipe unavailable".to_string()))?;

        let mut aggregator = OutputAggregator::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_status: Option<ExitStatus> = None;
        let mut aborted = false;
        let mut dirty = false;
        let mut buf_stdout = [0u8; READ_CHUNK_SIZE];
        let mut buf_stderr = [0u8; READ_CHUNK_SIZE];

        let start = tokio::time::Instant::now() + OUTPUT_UPDATE_INTERVAL;
        let mut throttle = tokio::time::interval_at(start, OUTPUT_UPDATE_INTERVAL);
        throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The run is over when the process has exited and both pipes hit
        // EOF. A background process that inherited the pipes holds them
        // open, which keeps the run live until it finishes or cancellation
        // signals the whole group.
        while stdout_open || stderr_open || exit_status.is_none() {
            tokio::select! {
                status = child.wait(), if exit_status.is_none() => {
                    let status = status?;
                    tracing::debug!(?status, "shell process exited");
                    exit_status = Some(status);
                }
                read = stdout_pipe.read(&mut buf_stdout), if stdout_open => match read? {
                    0 => stdout_open = false,
                    n => {
                        let text = aggregator.push_stdout(&buf_stdout[..n]);
                        self.watch_for_elevation_failure(&text);
                        dirty = true;
                    }
                },
                read = stderr_pipe.read(&mut buf_stderr), if stderr_open => match read? {
                    0 => stderr_open = false,
                    n => {
                        let text = aggregator.push_stderr(&buf_stderr[..n]);
                        self.watch_for_elevation_failure(&text);
                        dirty = true;
                    }
                },
                _ = throttle.tick() => {
                    if dirty {
                        on_output(aggregator.live_event());
                        dirty = false;
                    }
                }
                _ = cancel.cancelled(), if !aborted => {
                    aborted = true;
                    if let Some(id) = group_id.or(pid) {
                        tracing::info!(id, "cancellation requested, stopping process group");
                        self.control.terminate(id);
                        let control = Arc::clone(&self.control);
                        tokio::spawn(async move {
                            tokio::time::sleep(KILL_GRACE).await;
                            control.kill(id);
                        });
                    }
                }
            }
        }

        let (exit_code, signal) = match &exit_status {
            Some(status) if !aborted => (status.code(), termination_signal(status)),
            _ => (None, None),
        };

        let background_pids = scratch
            .as_ref()
            .map(|scan| scan.background_pids(pid, aborted))
            .unwrap_or_default();

        let (stdout, stderr, raw_output) = aggregator.finish();

        Ok(ExecutionResult {
            command: command_line.to_string(),
            directory: request.directory.clone(),
            stdout,
            stderr,
            raw_output,
            error: None,
            exit_code,
            signal,
            background_pids,
            process_group_id: group_id,
            aborted,
        })
    }

    fn watch_for_elevation_failure(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let lowered = text.to_lowercase();
        if ELEVATION_FAILURE_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
        {
            tracing::warn!("elevation failure reported by the shell, dropping cached secret");
            self.session.credentials.clear();
        }
    }
}

fn wrap_elevation(command: &str) -> String {
    let rest = command.trim().strip_prefix("sudo").unwrap_or(command);
    format!("sudo -S -p ''{rest}")
}

fn scrub_secret(text: String, secret: Option<&str>) -> String {
    match secret {
        Some(value) if !value.is_empty() => text.replace(value, "[redacted]"),
        _ => text,
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Uniquely-named file the trailer writes surviving group PIDs into.
/// Removal happens in `Drop` so no exit path leaks it.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("shellward_pgrep_{}.tmp", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// PIDs recorded by the trailer, minus the foreground process itself.
    /// On a cancelled run the trailer usually never ran, so a missing file
    /// is expected and silent; otherwise it is a diagnostic, not an error.
    fn background_pids(&self, foreground: Option<i32>, aborted: bool) -> Vec<i32> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents
                .lines()
                .filter_map(|line| line.trim().parse::<i32>().ok())
                .filter(|pid| Some(*pid) != foreground)
                .collect(),
            Err(_) if aborted => Vec::new(),
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    path = %self.path.display(),
                    "background process scan produced no file"
                );
                Vec::new()
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_elevation_feeds_stdin_flag() {
        assert_eq!(wrap_elevation("sudo apt update"), "sudo -S -p '' apt update");
        assert_eq!(wrap_elevation("sudo"), "sudo -S -p ''");
    }

    #[test]
    fn test_scrub_secret_masks_value() {
        let scrubbed = scrub_secret("spawn failed: hunter2 rejected".into(), Some("hunter2"));
        assert_eq!(scrubbed, "spawn failed: [redacted] rejected");
        assert_eq!(scrub_secret("plain".into(), None), "plain");
    }

    #[test]
    fn test_scratch_file_reads_and_filters_pids() {
        let scratch = ScratchFile::new();
        std::fs::write(scratch.path(), "100\n200\n300\n").unwrap();
        assert_eq!(scratch.background_pids(Some(200), false), vec![100, 300]);
    }

    #[test]
    fn test_scratch_file_missing_is_empty() {
        let scratch = ScratchFile::new();
        assert!(scratch.background_pids(None, false).is_empty());
        assert!(scratch.background_pids(None, true).is_empty());
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let path = {
            let scratch = ScratchFile::new();
            std::fs::write(scratch.path(), "1\n").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
