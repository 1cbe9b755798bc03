//! adb process execution
//!
//! [`ProcessRunner`] is the seam between the session logic and the real adb
//! executable. [`AdbProcessRunner`] runs the real thing; tests use
//! [`crate::test_utils::FixtureRunner`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use buddy_core::prelude::*;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::interactive::InteractiveCommand;
use crate::pty;
use crate::sanitize::sanitize;

/// Default bound on a blocking adb command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TERM for interactive sessions
pub const DEFAULT_TERMINAL_TYPE: &str = "xterm-256color";

/// Runs adb with a given argument vector.
///
/// `ProcessRunner` is the `Send` variant used by the session and transfer
/// layers; implement it directly.
#[trait_variant::make(ProcessRunner: Send)]
pub trait LocalProcessRunner {
    /// Run to completion and return the sanitized combined output.
    async fn run(&self, args: &[String]) -> Result<String>;

    /// Start a session attached to a pseudo-terminal.
    ///
    /// Chunks are raw decoded terminal output; sanitizing is left to the
    /// caller because progress lines need per-segment handling.
    fn run_interactive(&self, args: &[String]) -> Result<InteractiveCommand>;
}

/// Runs the real adb executable
#[derive(Debug, Clone)]
pub struct AdbProcessRunner {
    executable: PathBuf,
    timeout: Duration,
    terminal_type: String,
}

impl AdbProcessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_terminal_type(mut self, terminal_type: impl Into<String>) -> Self {
        self.terminal_type = terminal_type.into();
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run and return the decoded, unsanitized output.
    async fn run_raw(&self, args: &[String]) -> Result<String> {
        debug!("Running: adb {}", args.join(" "));

        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child).await;
            return Err(Error::process_spawn("adb output pipes unavailable"));
        };

        let bytes = match tokio::time::timeout(self.timeout, read_combined(stdout, stderr)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                terminate(&mut child).await;
                return Err(Error::Io(e));
            }
            Err(_) => {
                warn!("adb {} timed out after {:?}", args.join(" "), self.timeout);
                terminate(&mut child).await;
                return Err(Error::Timeout {
                    command: args.join(" "),
                    after: self.timeout,
                });
            }
        };

        // Output is closed; reap the child so it never lingers as a zombie
        match child.wait().await {
            Ok(status) => trace!("adb exited with status: {:?}", status),
            Err(e) => warn!("Error waiting for adb: {}", e),
        }

        String::from_utf8(bytes).map_err(|_| Error::NonDecodableOutput)
    }
}

impl ProcessRunner for AdbProcessRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        let raw = self.run_raw(args).await?;
        trace!("adb output: {:?}", raw);
        sanitize(&raw)
    }

    fn run_interactive(&self, args: &[String]) -> Result<InteractiveCommand> {
        pty::spawn_session(&self.executable, args, &self.terminal_type)
    }
}

/// Map a spawn failure, distinguishing a missing executable.
pub(crate) fn spawn_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::AdbNotFound
    } else {
        Error::process_spawn(e.to_string())
    }
}

/// Read stdout and stderr to the end, interleaved in arrival order.
async fn read_combined(mut stdout: ChildStdout, mut stderr: ChildStderr) -> std::io::Result<Vec<u8>> {
    let mut combined = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read? {
                0 => out_open = false,
                n => combined.extend_from_slice(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read? {
                0 => err_open = false,
                n => combined.extend_from_slice(&err_buf[..n]),
            },
        }
    }

    Ok(combined)
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Failed to kill adb (may have exited): {}", e);
    }
}
