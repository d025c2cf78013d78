//! Child process supervision.
//!
//! Two ways to run a resolved command:
//! - interactive: attached to a fresh pty as session leader with the pty as
//!   its controlling terminal
//! - batch: stdout and stderr share one pipe, stdin is the null device, and
//!   the combined output is returned once the process exits

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use nix::unistd::{pipe, setsid};
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe::Receiver;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use keysh_core::constants::SIGNAL_EXIT_OFFSET;
use keysh_core::error::{Error, Result};
use keysh_core::{ResolvedCommand, TermSize};

use crate::pty::{Pty, set_cloexec};

/// A process attached to a pseudo-terminal.
#[derive(Debug)]
pub struct PtyProcess {
    /// Master side of the terminal: input sink, output source, resize sink.
    pub pty: Arc<Pty>,
    /// Handle to await termination.
    pub handle: ProcessHandle,
}

/// Handle to a spawned child.
///
/// The child is killed if the handle is dropped before it has been reaped.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit and reap it.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        let code = exit_code(status);
        info!(exit_code = code, "Process exited");
        Ok(code)
    }

    /// Ask the child to terminate without waiting for it.
    pub fn kill(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    /// Interleaved stdout and stderr in write order.
    pub output: Vec<u8>,
    /// Exit code (signals mapped to 128 + N).
    pub status: i32,
}

impl BatchOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Start `command` attached to a new pty of `size`, with `TERM` set to `term`.
///
/// The child inherits the server's environment otherwise.
pub fn start_interactive(
    command: &ResolvedCommand,
    term: &str,
    size: TermSize,
) -> Result<PtyProcess> {
    let launch_err = |source: io::Error| Error::Launch {
        argv: command.argv().to_vec(),
        source,
    };

    let (pty, slave) = Pty::open(size).map_err(|e| launch_err(io::Error::other(e.to_string())))?;

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .env("TERM", term)
        .stdin(Stdio::from(slave.try_clone().map_err(launch_err)?))
        .stdout(Stdio::from(slave.try_clone().map_err(launch_err)?))
        .stderr(Stdio::from(slave))
        .kill_on_drop(true);

    // SAFETY: only async-signal-safe calls (setsid, ioctl) run between fork and exec
    unsafe {
        cmd.pre_exec(|| {
            setsid().map_err(io::Error::from)?;
            // TIOCSCTTY request type varies by platform (c_ulong on glibc/macOS, c_int on musl)
            if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(launch_err)?;
    // Release the parent's copies of the subordinate side so EOF reaches the master
    drop(cmd);

    debug!(command = %command, pid = ?child.id(), term, "Spawned interactive process");

    Ok(PtyProcess {
        pty: Arc::new(pty),
        handle: ProcessHandle { child },
    })
}

/// Run `command` to completion and capture its combined output.
pub async fn run_to_completion(command: &ResolvedCommand) -> Result<BatchOutput> {
    let launch_err = |source: io::Error| Error::Launch {
        argv: command.argv().to_vec(),
        source,
    };

    let (read_end, write_end) = pipe().map_err(|e| launch_err(e.into()))?;
    for fd in [&read_end, &write_end] {
        set_cloexec(fd.as_raw_fd())
            .map_err(|e| launch_err(io::Error::other(e.to_string())))?;
    }
    let mut reader = Receiver::from_owned_fd(read_end).map_err(launch_err)?;

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::from(write_end.try_clone().map_err(launch_err)?))
        .stderr(Stdio::from(write_end))
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(launch_err)?;
    // Only the child may hold the write end, otherwise the read never ends
    drop(cmd);

    debug!(command = %command, pid = ?child.id(), "Spawned batch process");

    let mut output = Vec::new();
    reader.read_to_end(&mut output).await.map_err(launch_err)?;
    let status = child.wait().await.map_err(launch_err)?;

    Ok(BatchOutput {
        output,
        status: exit_code(status),
    })
}

/// Map an exit status to a shell-style code.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => SIGNAL_EXIT_OFFSET + signal,
        (None, None) => SIGNAL_EXIT_OFFSET,
    }
}
