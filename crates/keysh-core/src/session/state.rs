//! Session lifecycle state machine.

use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle of one session.
///
/// ```text
/// Connected -> Authenticated -> CommandResolved -> InteractiveRunning -> Terminated
///                                               \-> BatchRunning ------/
/// ```
///
/// Any state may move to `Terminated`; every other transition not drawn
/// above is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, no credential accepted yet.
    Connected,
    /// An offered key was accepted.
    Authenticated,
    /// The command line was turned into an argument vector.
    CommandResolved,
    /// Process attached to a pty, forwarding loops running.
    InteractiveRunning,
    /// Process running to completion with captured output.
    BatchRunning,
    /// Session is over.
    Terminated,
}

impl SessionState {
    /// Check whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connected, Authenticated)
                | (Authenticated, CommandResolved)
                | (CommandResolved, InteractiveRunning)
                | (CommandResolved, BatchRunning)
                | (_, Terminated)
        ) && self != Terminated
    }

    /// Move to `next`, or fail with `Error::InvalidState`.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("a successor of {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Check if a process is running for this session.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionState::InteractiveRunning | SessionState::BatchRunning
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connected => "Connected",
            SessionState::Authenticated => "Authenticated",
            SessionState::CommandResolved => "CommandResolved",
            SessionState::InteractiveRunning => "InteractiveRunning",
            SessionState::BatchRunning => "BatchRunning",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}
