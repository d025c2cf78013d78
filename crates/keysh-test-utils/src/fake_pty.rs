//! Fake PTY for testing without a real terminal.
//!
//! Implements `PtyControl` in memory so resize forwarding can be driven and
//! inspected without allocating an OS pseudo-terminal.

use std::sync::Mutex;

use keysh_core::{Error, PtyControl, Result, TermSize};

/// A fake PTY for testing.
#[derive(Debug)]
pub struct FakePty {
    state: Mutex<FakePtyState>,
}

#[derive(Debug)]
struct FakePtyState {
    /// Current terminal size.
    size: TermSize,
    /// Every size passed to `resize`, in call order.
    history: Vec<TermSize>,
    /// Whether the PTY is closed.
    closed: bool,
}

impl FakePty {
    /// Create a new fake PTY with default dimensions (80x24).
    pub fn new() -> Self {
        Self::with_size(80, 24)
    }

    /// Create a new fake PTY with specified dimensions.
    pub fn with_size(cols: u16, rows: u16) -> Self {
        Self {
            state: Mutex::new(FakePtyState {
                size: TermSize::new(cols, rows),
                history: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Sizes applied so far, oldest first.
    pub fn resize_history(&self) -> Vec<TermSize> {
        self.state.lock().unwrap().history.clone()
    }

    /// Check if the PTY is closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Close the PTY; later resizes fail the way a closed descriptor would.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

impl Default for FakePty {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyControl for FakePty {
    fn size(&self) -> Result<TermSize> {
        Ok(self.state.lock().unwrap().size)
    }

    fn resize(&self, size: TermSize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Pty {
                message: "pty closed".into(),
            });
        }
        state.size = size;
        state.history.push(size);
        Ok(())
    }
}
