//! Running the external analysis executable under a deadline.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::ExternalProcessError;

/// How long to keep draining output pipes after the process has gone away.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Combined output of a process that exited successfully.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Stdout and stderr lines in the order they arrived.
    pub combined: String,
    pub elapsed: Duration,
}

/// An invocation of the analysis executable.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub deadline: Duration,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            deadline,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the process to completion, the deadline, or shutdown.
    ///
    /// On deadline or shutdown the process is killed and whatever output it
    /// produced so far is attached to the error. A non-zero exit is an error.
    pub async fn run(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ProcessOutput, ExternalProcessError> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExternalProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let mut stdout_task = tokio::spawn(forward_lines(child.stdout.take(), line_tx.clone()));
        let mut stderr_task = tokio::spawn(forward_lines(child.stderr.take(), line_tx));

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(self.deadline) => Waited::TimedOut,
            _ = shutdown_requested(shutdown) => Waited::Cancelled,
        };
        let elapsed = started.elapsed();

        if !matches!(waited, Waited::Exited(_)) {
            if let Err(e) = child.kill().await {
                warn!(program = %self.program.display(), "Failed to kill analysis process: {}", e);
            }
        }

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await;
        if drained.is_err() {
            debug!("Output pipes still open after process exit, using partial output");
            stdout_task.abort();
            stderr_task.abort();
        }

        let mut lines = Vec::new();
        while let Ok(line) = line_rx.try_recv() {
            lines.push(line);
        }
        let combined = lines.join("\n");

        match waited {
            Waited::Exited(Ok(status)) if status.success() => {
                Ok(ProcessOutput { combined, elapsed })
            }
            Waited::Exited(Ok(status)) => Err(ExternalProcessError::Exit {
                code: status.code(),
                output: combined,
            }),
            Waited::Exited(Err(e)) => Err(ExternalProcessError::Wait(e)),
            Waited::TimedOut => Err(ExternalProcessError::TimedOut {
                after: self.deadline,
                output: combined,
            }),
            Waited::Cancelled => Err(ExternalProcessError::Cancelled { output: combined }),
        }
    }
}

/// Sends each line of `pipe` to `tx` until EOF. Invalid UTF-8 is replaced
/// rather than ending the read, so the child never sees a closed pipe.
async fn forward_lines<R>(pipe: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                // Keep reading after the receiver is gone so writes never fail.
                let _ = tx.send(line.to_string());
            }
            Err(e) => {
                warn!("Failed to read analysis output: {}", e);
                break;
            }
        }
    }
}

/// Resolves once shutdown has been signalled. Never resolves if the sender
/// is dropped without signalling.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
