//! PTY management for server sessions.
//!
//! Handles:
//! - Allocating a master/subordinate pair with an initial geometry
//! - Async I/O on the master side
//! - Terminal resize and size queries
//!
//! Uses the `nix` crate for Unix PTY support (Linux, macOS).
//! Uses `AsyncFd` for proper async I/O integration with tokio's reactor.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::pty::{Winsize, openpty};
use tokio::io::unix::AsyncFd;
use tracing::debug;

use keysh_core::error::{Error, Result};
use keysh_core::{PtyControl, TermSize};

/// Master side of a pseudo-terminal.
///
/// Uses `AsyncFd` for proper integration with tokio's reactor, avoiding
/// polling loops that cause latency. Dropping the `Pty` closes the master.
#[derive(Debug)]
pub struct Pty {
    master: AsyncFd<File>,
}

impl Pty {
    /// Open a new pseudo-terminal pair sized to `size`.
    ///
    /// Returns the master wrapped for async I/O and the subordinate side,
    /// which the caller hands to the child process. Both descriptors are
    /// close-on-exec so concurrent spawns never inherit them.
    pub fn open(size: TermSize) -> Result<(Self, OwnedFd)> {
        let pair = openpty(&winsize(size), None).map_err(|e| Error::Pty {
            message: format!("failed to open pty: {}", e),
        })?;

        set_cloexec(pair.master.as_raw_fd())?;
        set_cloexec(pair.slave.as_raw_fd())?;
        set_nonblocking(pair.master.as_raw_fd())?;

        let master = AsyncFd::new(File::from(pair.master)).map_err(|e| Error::Pty {
            message: format!("failed to create AsyncFd: {}", e),
        })?;

        debug!(cols = size.cols, rows = size.rows, "PTY allocated");
        Ok((Self { master }, pair.slave))
    }

    /// Write data to the PTY (terminal input from client).
    ///
    /// Waits for write readiness before attempting to write.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let mut guard = self.master.writable().await.map_err(|e| Error::Pty {
                message: format!("failed to wait for pty write readiness: {}", e),
            })?;

            match guard.try_io(|inner| inner.get_ref().write(remaining)) {
                Ok(Ok(n)) => {
                    remaining = &remaining[n..];
                }
                Ok(Err(e)) => {
                    return Err(Error::Pty {
                        message: format!("failed to write to pty: {}", e),
                    });
                }
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Read data from the PTY (process output to client).
    ///
    /// Returns `None` once the subordinate side has been closed by every
    /// process holding it.
    pub async fn read(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        loop {
            let mut guard = self.master.readable().await.map_err(|e| Error::Pty {
                message: format!("failed to wait for pty read readiness: {}", e),
            })?;

            match guard.try_io(|inner| inner.get_ref().read(buf)) {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => return Ok(Some(n)),
                Ok(Err(e)) => {
                    // Linux reports a closed subordinate as EIO rather than EOF
                    if e.raw_os_error() == Some(libc::EIO) {
                        debug!("PTY read returned EIO (process likely exited)");
                        return Ok(None);
                    }
                    return Err(Error::Pty {
                        message: format!("failed to read from pty: {}", e),
                    });
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

impl PtyControl for Pty {
    /// Read the live geometry with `TIOCGWINSZ`.
    fn size(&self) -> Result<TermSize> {
        let mut ws = winsize(TermSize::new(0, 0));
        let result = unsafe { libc::ioctl(self.raw_fd(), libc::TIOCGWINSZ, &mut ws) };

        if result == -1 {
            let err = std::io::Error::last_os_error();
            return Err(Error::Pty {
                message: format!("failed to query pty size: {}", err),
            });
        }

        Ok(TermSize::new(ws.ws_col, ws.ws_row))
    }

    /// Apply new geometry with `TIOCSWINSZ`.
    fn resize(&self, size: TermSize) -> Result<()> {
        let ws = winsize(size);
        let result = unsafe { libc::ioctl(self.raw_fd(), libc::TIOCSWINSZ, &ws) };

        if result == -1 {
            let err = std::io::Error::last_os_error();
            return Err(Error::Pty {
                message: format!("failed to resize pty: {}", err),
            });
        }

        debug!(cols = size.cols, rows = size.rows, "PTY resized");
        Ok(())
    }
}

fn winsize(size: TermSize) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Set a file descriptor to non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| Error::Pty {
        message: format!("fcntl F_GETFL failed: {}", e),
    })?;

    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;

    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| Error::Pty {
        message: format!("fcntl F_SETFL failed: {}", e),
    })?;

    Ok(())
}

/// Mark a file descriptor close-on-exec.
pub(crate) fn set_cloexec(fd: RawFd) -> Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|e| Error::Pty {
        message: format!("fcntl F_SETFD failed: {}", e),
    })?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
