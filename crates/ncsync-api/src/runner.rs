// External process execution.
//
// Every byte that reaches the management API goes through a `CommandRunner`.
// The system implementation shells out via `tokio::process`; tests swap in
// scripted runners so the classification logic never needs a real curl.

use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::process::Command;
use tracing::trace;

/// Captured result of one external process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Bytes,
    pub stderr: String,
}

impl ProcessOutput {
    /// Convenience constructor used by runners and tests.
    pub fn new(code: Option<i32>, stdout: impl Into<Bytes>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program to completion and captures its output.
///
/// `argv[0]` is the program. Implementations must enforce `timeout` as a
/// hard bound and kill the process when it expires.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> io::Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{program} did not exit within {}s", timeout.as_secs()),
                )
            })??;

        trace!(
            program,
            code = ?output.status.code(),
            bytes = output.stdout.len(),
            "process exited"
        );

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: Bytes::from(output.stdout),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}
