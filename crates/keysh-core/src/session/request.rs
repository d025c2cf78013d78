//! Per-channel session request.

use std::future::Future;
use std::net::SocketAddr;

use tokio::sync::{mpsc, watch};

use super::state::SessionState;
use crate::error::Result;
use crate::terminal::TermSize;

/// Terminal requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Value for `TERM` in the child environment.
    pub term: String,
    /// Geometry at session start.
    pub size: TermSize,
}

/// How the session's command is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Attached to a pseudo-terminal with live forwarding.
    Interactive,
    /// Run to completion, output returned in one piece.
    Batch,
}

/// One authenticated session, owned by the task that serves it.
#[derive(Debug)]
pub struct Session {
    /// Remote user name.
    pub user: String,
    /// Remote address, if known.
    pub peer: Option<SocketAddr>,
    /// Raw command line; empty means "use the default command".
    pub command_line: String,
    /// Terminal request, if the client asked for one.
    pub pty: Option<PtyRequest>,
    /// Resize events received after the session started.
    pub resizes: mpsc::UnboundedReceiver<TermSize>,
    cancel: watch::Receiver<bool>,
    state: SessionState,
}

/// Transport side of a session: pushes resize events and ends the session.
///
/// Dropping the handle cancels the session, so a transport that goes away
/// without saying so still stops the process it started.
#[derive(Debug)]
pub struct SessionHandle {
    resize_tx: mpsc::UnboundedSender<TermSize>,
    cancel_tx: watch::Sender<bool>,
}

impl SessionHandle {
    /// Queue a resize event. Returns false once the session stopped listening.
    pub fn resize(&self, size: TermSize) -> bool {
        self.resize_tx.send(size).is_ok()
    }

    /// Ask the session to stop and terminate its process.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }
}

impl Session {
    /// Create a session for a client that has already authenticated.
    pub fn new(
        user: impl Into<String>,
        peer: Option<SocketAddr>,
        command_line: impl Into<String>,
        pty: Option<PtyRequest>,
    ) -> (Self, SessionHandle) {
        let (resize_tx, resizes) = mpsc::unbounded_channel();
        let (cancel_tx, cancel) = watch::channel(false);

        let session = Self {
            user: user.into(),
            peer,
            command_line: command_line.into(),
            pty,
            resizes,
            cancel,
            state: SessionState::Authenticated,
        };
        (session, SessionHandle { resize_tx, cancel_tx })
    }

    pub fn mode(&self) -> SessionMode {
        if self.pty.is_some() {
            SessionMode::Interactive
        } else {
            SessionMode::Batch
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Take the resize receiver, leaving a closed one in its place.
    pub fn take_resizes(&mut self) -> mpsc::UnboundedReceiver<TermSize> {
        let (_, closed) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.resizes, closed)
    }

    /// Resolves once the transport cancels the session or drops its handle.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut signal = self.cancel.clone();
        async move {
            // Err means the handle is gone, which counts as cancellation
            let _ = signal.wait_for(|cancelled| *cancelled).await;
        }
    }

    /// Advance the lifecycle.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        self.state.transition(next)
    }
}
