//! Terminal geometry and the resize capability.
//!
//! The bridge only needs to apply sizes to a terminal, not to know how the
//! terminal is backed, so it talks to `PtyControl`. The server implements it
//! on the OS pty; tests implement it in memory.

use crate::constants::{DEFAULT_TERMINAL_COLS, DEFAULT_TERMINAL_ROWS};
use crate::error::Result;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Build a size from the 32-bit values SSH carries, clamping to `u16`.
    ///
    /// A zero dimension falls back to the default 80x24 value for that axis.
    pub fn from_wire(cols: u32, rows: u32) -> Self {
        let clamp = |v: u32, default: u16| match v {
            0 => default,
            v => u16::try_from(v).unwrap_or(u16::MAX),
        };
        Self {
            cols: clamp(cols, DEFAULT_TERMINAL_COLS),
            rows: clamp(rows, DEFAULT_TERMINAL_ROWS),
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_TERMINAL_COLS,
            rows: DEFAULT_TERMINAL_ROWS,
        }
    }
}

/// Control operations on a terminal, separate from its byte streams.
pub trait PtyControl: Send + Sync {
    /// Current geometry.
    fn size(&self) -> Result<TermSize>;

    /// Apply new geometry. Applying the current size again is a no-op.
    fn resize(&self, size: TermSize) -> Result<()>;
}
