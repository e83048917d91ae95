//! Subprocess execution with streamed, merged output.

use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit code reported when the child was killed because the caller cancelled.
pub const CANCELLED_EXIT_CODE: i32 = -1;

/// How long output is still drained after a cancelled child is killed.
pub const CANCEL_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Receives each line a child process prints.
pub trait OutputSink: Send + Sync {
    fn on_line(&self, line: &str);
}

/// Forwards child output to `tracing` at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn on_line(&self, line: &str) {
        info!(target: "trainpack::builder", "{}", line);
    }
}

/// Runs external commands for the orchestrator.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv`, feeding `stdin` if given, and return the exit code.
    ///
    /// stdout and stderr are merged line by line. Lines of one stream keep
    /// their order; how the two streams interleave depends on when each line
    /// arrives.
    ///
    /// A non-zero exit is not an error. When `cancel` fires the child is
    /// killed, remaining output is drained for up to [`CANCEL_DRAIN_GRACE`],
    /// and [`CANCELLED_EXIT_CODE`] is returned. Processes the child started
    /// are not killed.
    async fn execute(
        &self,
        argv: &[String],
        stdin: Option<&str>,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> BuildResult<i32>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        argv: &[String],
        stdin: Option<&str>,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> BuildResult<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BuildError::invalid_input("command", "argument vector is empty"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| BuildError::io(program, e))?;
        debug!(program = %program, pid = ?child.id(), "spawned child process");

        // Write from a separate task so a child that fills its output pipe
        // before reading all of stdin cannot deadlock us.
        let writer = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(payload)) => {
                let payload = payload.as_bytes().to_vec();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(&payload).await {
                        warn!(error = %e, "failed to write child stdin");
                    }
                    // dropping the pipe closes stdin
                }))
            }
            _ => None,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(BufReader::new(stdout), tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(BufReader::new(stderr), tx.clone())));
        }
        drop(tx);

        // Set once cancelled. A grandchild can keep the pipes open after the
        // child is killed, so draining stops at this deadline.
        let mut drain_deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                () = cancel.cancelled(), if drain_deadline.is_none() => {
                    drain_deadline = Some(Instant::now() + CANCEL_DRAIN_GRACE);
                    warn!(program = %program, "cancelling child process");
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "failed to kill child process");
                    }
                }
                () = time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                    warn!(program = %program, "child output still open after cancel, abandoning it");
                    break;
                }
                line = rx.recv() => match line {
                    Some(line) => sink.on_line(&line),
                    None => break,
                },
            }
        }
        let cancelled = drain_deadline.is_some();

        if cancelled {
            for reader in &readers {
                reader.abort();
            }
            if let Some(writer) = &writer {
                writer.abort();
            }
        } else {
            for reader in readers {
                if let Err(e) = reader.await {
                    warn!(error = %e, "output reader task failed");
                }
            }
            if let Some(writer) = writer {
                if let Err(e) = writer.await {
                    warn!(error = %e, "stdin writer task failed");
                }
            }
        }

        let status = child.wait().await.map_err(|e| BuildError::io(program, e))?;
        if cancelled {
            return Ok(CANCELLED_EXIT_CODE);
        }

        let code = exit_code(status);
        debug!(program = %program, code, "child process exited");
        Ok(code)
    }
}

async fn forward_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read child output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| 128 + signal)).unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
